// Integration tests for brickwatch
// These tests drive the command API, the scheduler and the fetch stack together

pub mod api_tests;
pub mod checker_tests;
pub mod scheduler_tests;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use brickwatch::{
    models::{StockResult, StockStatus},
    notifiers::{Delivery, DeliveryError, Notification, Notifier},
    web::{create_router, AppState},
    CommandService, PollScheduler, SqliteWatchRepository, StockSource,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// Stock source serving canned results. Unknown codes resolve to an error result.
#[derive(Default)]
pub struct FakeStockSource {
    results: Mutex<HashMap<String, StockResult>>,
}

impl FakeStockSource {
    pub fn set(&self, code: &str, status: StockStatus, button: Option<&str>) {
        let result = StockResult {
            available: status == StockStatus::InStock,
            status,
            message: status.label().to_string(),
            button_detected: button.map(str::to_string),
            product_name: format!("LEGO Set {}", code),
            price: Some("$99.99".to_string()),
            source_url: format!("https://www.lego.com/en-us/product/{}", code),
        };
        self.results.lock().unwrap().insert(code.to_string(), result);
    }
}

#[async_trait]
impl StockSource for FakeStockSource {
    async fn check_stock(&self, target_code: &str) -> StockResult {
        let code = target_code.trim();
        self.results
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .unwrap_or_else(|| {
                StockResult::error(
                    code,
                    format!("https://www.lego.com/en-us/product/{}", code),
                    "Error fetching product page: HTTP 404",
                )
            })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(Notification, Option<i64>)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(
        &self,
        notification: &Notification,
        override_channel: Option<i64>,
    ) -> Result<Delivery, DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((notification.clone(), override_channel));
        Ok(match override_channel {
            Some(channel) => Delivery::OverrideChannel(channel),
            None => Delivery::DirectMessage,
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub checker: Arc<FakeStockSource>,
    pub notifier: Arc<RecordingNotifier>,
    pub scheduler: Arc<PollScheduler>,
    _dir: TempDir,
}

/// Create a fully wired app on a throwaway SQLite file
pub async fn create_test_app() -> anyhow::Result<TestApp> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("brickwatch-test.db");
    let repository = Arc::new(
        SqliteWatchRepository::connect(path.to_str().unwrap_or_default(), 2).await?,
    );

    let checker = Arc::new(FakeStockSource::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let scheduler = Arc::new(PollScheduler::new(
        checker.clone(),
        repository.clone(),
        notifier.clone(),
        Duration::from_secs(300),
    ));

    let state = AppState {
        commands: Arc::new(CommandService::new(checker.clone(), repository)),
        scheduler: scheduler.clone(),
        metrics: None,
    };

    Ok(TestApp {
        router: create_router(state),
        checker,
        notifier,
        scheduler,
        _dir: dir,
    })
}

/// Helper to make HTTP requests to the test app
pub async fn make_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> anyhow::Result<axum::response::Response> {
    let mut request = Request::builder().method(method).uri(uri);

    if body.is_some() {
        request = request.header("content-type", "application/json");
    }

    let request = request.body(match body {
        Some(json) => Body::from(json.to_string()),
        None => Body::empty(),
    })?;

    Ok(app.clone().oneshot(request).await?)
}

pub async fn read_json(response: axum::response::Response) -> anyhow::Result<serde_json::Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}
