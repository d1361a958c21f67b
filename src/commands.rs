use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::checker::StockSource;
use crate::models::{NewWatch, StockResult, StockStatus, WatchRecord};
use crate::repository::{AddWatchOutcome, WatchRepository};
use crate::Result;

const WATCH_LIST_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WatchOutcome {
    Added { result: StockResult },
    AlreadyWatching,
    NotFound { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnwatchOutcome {
    Removed,
    NotWatching,
}

/// Chat command contract, independent of any chat front-end.
pub struct CommandService {
    checker: Arc<dyn StockSource>,
    repository: Arc<dyn WatchRepository>,
}

impl CommandService {
    pub fn new(checker: Arc<dyn StockSource>, repository: Arc<dyn WatchRepository>) -> Self {
        Self { checker, repository }
    }

    pub async fn check_stock(&self, target_code: &str) -> StockResult {
        self.checker.check_stock(target_code).await
    }

    /// Verifies the set with a live check before storing the watch.
    pub async fn watch(
        &self,
        subscriber_id: i64,
        context_id: Option<i64>,
        target_code: &str,
    ) -> Result<WatchOutcome> {
        let new_watch = NewWatch::new(subscriber_id, context_id, target_code);
        let result = self.checker.check_stock(&new_watch.target_code).await;

        if result.is_error() {
            return Ok(WatchOutcome::NotFound {
                message: format!(
                    "Could not find set {}. Please verify the set code is correct.",
                    new_watch.target_code
                ),
            });
        }

        match self.repository.add_watch(&new_watch).await? {
            AddWatchOutcome::Added(record) => {
                info!(
                    subscriber_id,
                    target_code = record.target_code.as_str(),
                    "Added watch"
                );
                Ok(WatchOutcome::Added { result })
            }
            AddWatchOutcome::AlreadyExists => Ok(WatchOutcome::AlreadyWatching),
        }
    }

    pub async fn unwatch(
        &self,
        subscriber_id: i64,
        context_id: Option<i64>,
        target_code: &str,
    ) -> Result<UnwatchOutcome> {
        let removed = self
            .repository
            .remove_watch(subscriber_id, context_id, target_code.trim())
            .await?;

        if removed {
            info!(subscriber_id, target_code = target_code.trim(), "Removed watch");
            Ok(UnwatchOutcome::Removed)
        } else {
            Ok(UnwatchOutcome::NotWatching)
        }
    }

    pub async fn list_watches(
        &self,
        subscriber_id: i64,
        context_id: Option<i64>,
    ) -> Result<Vec<WatchRecord>> {
        self.repository.list_watches(subscriber_id, context_id).await
    }

    pub async fn set_notification_channel(&self, context_id: i64, channel_id: i64) -> Result<()> {
        self.repository
            .set_notification_channel(context_id, channel_id)
            .await?;
        info!("Notification channel for context {} set to {}", context_id, channel_id);
        Ok(())
    }

    /// Returns whether an override was configured.
    pub async fn clear_notification_channel(&self, context_id: i64) -> Result<bool> {
        let cleared = self.repository.clear_notification_channel(context_id).await?;
        if cleared {
            info!("Notification channel for context {} cleared", context_id);
        }
        Ok(cleared)
    }
}

fn status_emoji(result: &StockResult) -> &'static str {
    match result.status {
        StockStatus::InStock if result.available => "✅",
        StockStatus::OutOfStock => "❌",
        StockStatus::PreOrder => "⏰",
        StockStatus::Error => "⚠️",
        _ => "❓",
    }
}

/// Plain-text reply for an on-demand check.
pub fn render_check_reply(target_code: &str, result: &StockResult) -> String {
    let mut lines = vec![
        format!("{} {}", status_emoji(result), result.product_name),
        format!("Status: {}", result.message),
        format!("Set Code: {}", target_code.trim()),
    ];

    if let Some(price) = &result.price {
        lines.push(format!("Price: {}", price));
    }
    if let Some(button) = &result.button_detected {
        lines.push(format!("Button Detected: {}", button));
    }
    lines.push(result.source_url.clone());

    lines.join("\n")
}

pub fn render_watch_list(watches: &[WatchRecord]) -> String {
    if watches.is_empty() {
        return "You're not watching any sets. Use /watch <set_code> to add one!".to_string();
    }

    let plural = if watches.len() == 1 { "" } else { "s" };
    let mut lines = vec![format!("Your Watchlist ({} set{})", watches.len(), plural)];

    lines.extend(watches.iter().take(WATCH_LIST_LIMIT).map(|watch| {
        let status = watch
            .last_status
            .map(|s| s.label())
            .unwrap_or("Not Checked Yet");
        format!("{} - {}", watch.target_code, status)
    }));

    if watches.len() > WATCH_LIST_LIMIT {
        lines.push(format!("Showing {} of {} sets", WATCH_LIST_LIMIT, watches.len()));
    }

    lines.join("\n")
}
