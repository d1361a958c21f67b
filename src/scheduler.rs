use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::checker::StockSource;
use crate::models::{StockResult, StockStatus, WatchRecord, WatchState};
use crate::notifiers::{Change, Delivery, Notification, Notifier};
use crate::repository::WatchRepository;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub running: bool,
    pub interval_seconds: u64,
    pub cycles_completed: u64,
    pub checks_run: u64,
    pub failed_operations: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub last_cycle_started: Option<DateTime<Utc>>,
    pub last_cycle_finished: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
}

/// Result of processing one watch during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    FirstCheck,
    Unchanged,
    Notified(Delivery),
    NotifyFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub checked: usize,
    pub notified: usize,
    pub failed: usize,
}

/// Diff rule between the stored state of a watch and a fresh result.
///
/// A first check never notifies. A status change wins over a button change,
/// and a button disappearing is not reported.
pub fn detect_change(
    last_status: Option<StockStatus>,
    last_button: Option<&str>,
    result: &StockResult,
) -> Option<Change> {
    let previous = last_status?;

    if previous != result.status {
        return Some(Change::StatusChanged { previous });
    }

    match result.button_detected.as_deref() {
        Some(current) if last_button != Some(current) => Some(Change::ButtonChanged {
            previous: last_button.map(str::to_string),
        }),
        _ => None,
    }
}

/// Periodic driver: check every watch sequentially, persist, notify, sleep.
pub struct PollScheduler {
    checker: Arc<dyn StockSource>,
    repository: Arc<dyn WatchRepository>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    stats: Arc<RwLock<SchedulerStats>>,
    start_time: DateTime<Utc>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollScheduler {
    pub fn new(
        checker: Arc<dyn StockSource>,
        repository: Arc<dyn WatchRepository>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let stats = SchedulerStats {
            interval_seconds: interval.as_secs(),
            ..SchedulerStats::default()
        };

        Self {
            checker,
            repository,
            notifier,
            interval,
            stats: Arc::new(RwLock::new(stats)),
            start_time: Utc::now(),
            stop_tx,
            handle: Mutex::new(None),
        }
    }

    /// Spawns the poll loop. The first cycle runs immediately.
    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("Poll scheduler already running");
            return;
        }

        self.stop_tx.send_replace(false);
        self.stats.write().await.running = true;

        let scheduler = Arc::clone(self);
        let stop_rx = self.stop_tx.subscribe();
        *handle = Some(tokio::spawn(async move {
            scheduler.run_loop(stop_rx).await;
        }));

        info!("Poll scheduler started (every {} minutes)", self.interval.as_secs() / 60);
    }

    /// Requests a stop and waits for the in-flight check to finish.
    pub async fn shutdown(&self) {
        self.stop_tx.send_replace(true);

        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Poll loop ended abnormally: {}", e);
            }
        }

        self.stats.write().await.running = false;
        info!("Poll scheduler shutdown");
    }

    pub async fn get_stats(&self) -> SchedulerStats {
        let mut stats = self.stats.read().await.clone();
        stats.uptime_seconds = (Utc::now() - self.start_time).num_seconds().max(0) as u64;
        stats
    }

    fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    async fn run_loop(&self, mut stop_rx: watch::Receiver<bool>) {
        loop {
            if *stop_rx.borrow() {
                break;
            }

            self.run_cycle().await;

            if *stop_rx.borrow() {
                break;
            }

            // No catch-up: the next cycle starts one interval after this one ended
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.stats.write().await.running = false;
        debug!("Poll loop exited");
    }

    /// Checks every watch once. Per-watch failures are logged and counted,
    /// never propagated.
    pub async fn run_cycle(&self) -> CycleSummary {
        let mut summary = CycleSummary::default();
        self.stats.write().await.last_cycle_started = Some(Utc::now());

        let watches = match self.repository.list_all_watches().await {
            Ok(watches) => watches,
            Err(e) => {
                error!("Error loading watches: {}", e);
                self.record_failure().await;
                return summary;
            }
        };

        if !watches.is_empty() {
            info!("Checking {} watched sets", watches.len());
        }

        for watch in &watches {
            if self.stop_requested() {
                info!("Stop requested, ending cycle early");
                break;
            }

            summary.checked += 1;
            match self.process_watch(watch).await {
                PollOutcome::Notified(_) => summary.notified += 1,
                PollOutcome::NotifyFailed => summary.failed += 1,
                PollOutcome::FirstCheck | PollOutcome::Unchanged => {}
            }
        }

        {
            let mut stats = self.stats.write().await;
            stats.cycles_completed += 1;
            stats.last_cycle_finished = Some(Utc::now());
        }
        metrics::counter!("brickwatch_poll_cycles_total").increment(1);

        summary
    }

    async fn process_watch(&self, watch: &WatchRecord) -> PollOutcome {
        let result = self.checker.check_stock(&watch.target_code).await;
        self.stats.write().await.checks_run += 1;

        let change = detect_change(
            watch.last_status,
            watch.last_button_detected.as_deref(),
            &result,
        );

        let state = WatchState {
            status: result.status,
            button_detected: result.button_detected.clone(),
            checked_at: Utc::now(),
        };
        if let Err(e) = self.repository.update_watch_state(watch.id, &state).await {
            error!(watch_id = watch.id, "Failed to persist watch state: {}", e);
            self.record_failure().await;
        }

        let Some(change) = change else {
            if watch.last_status.is_none() {
                debug!(
                    target_code = watch.target_code.as_str(),
                    subscriber_id = watch.subscriber_id,
                    status = %result.status,
                    "First check"
                );
                return PollOutcome::FirstCheck;
            }
            debug!(
                target_code = watch.target_code.as_str(),
                subscriber_id = watch.subscriber_id,
                status = %result.status,
                "No change"
            );
            return PollOutcome::Unchanged;
        };

        match &change {
            Change::StatusChanged { previous } => info!(
                target_code = watch.target_code.as_str(),
                subscriber_id = watch.subscriber_id,
                "Status changed: {} -> {}",
                previous,
                result.status
            ),
            Change::ButtonChanged { previous } => info!(
                target_code = watch.target_code.as_str(),
                subscriber_id = watch.subscriber_id,
                "Button changed: {} -> {}",
                previous.as_deref().unwrap_or("None"),
                result.button_detected.as_deref().unwrap_or("None")
            ),
        }

        let override_channel = match watch.context_id {
            Some(context_id) => match self.repository.notification_channel(context_id).await {
                Ok(channel) => channel,
                Err(e) => {
                    warn!("Could not read notification channel for context {}: {}", context_id, e);
                    self.record_failure().await;
                    None
                }
            },
            None => None,
        };

        let kind = change.kind();
        let notification = Notification {
            subscriber_id: watch.subscriber_id,
            context_id: watch.context_id,
            target_code: watch.target_code.clone(),
            result,
            change,
        };

        match self.notifier.notify(&notification, override_channel).await {
            Ok(delivery) => {
                self.stats.write().await.notifications_sent += 1;
                metrics::counter!("brickwatch_notifications_total", "kind" => kind, "outcome" => "sent")
                    .increment(1);
                PollOutcome::Notified(delivery)
            }
            Err(e) => {
                error!(
                    target_code = watch.target_code.as_str(),
                    subscriber_id = watch.subscriber_id,
                    "Failed to deliver notification: {}",
                    e
                );
                self.stats.write().await.notifications_failed += 1;
                metrics::counter!("brickwatch_notifications_total", "kind" => kind, "outcome" => "failed")
                    .increment(1);
                PollOutcome::NotifyFailed
            }
        }
    }

    async fn record_failure(&self) {
        self.stats.write().await.failed_operations += 1;
    }
}
