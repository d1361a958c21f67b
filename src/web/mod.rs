use axum::{
    extract::State,
    http::header,
    middleware as axum_middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::commands::CommandService;
use crate::config::ServerConfig;
use crate::scheduler::PollScheduler;

pub mod handlers;
pub mod middleware;
pub mod responses;

pub use handlers::{
    add_watch, check_stock, clear_notification_channel, get_scheduler_stats, list_watches,
    remove_watch, set_notification_channel,
};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<CommandService>,
    pub scheduler: Arc<PollScheduler>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/stock/:code", get(check_stock))
        .route("/watches", post(add_watch).delete(remove_watch))
        .route("/subscribers/:subscriber_id/watches", get(list_watches))
        .route(
            "/contexts/:context_id/notification-channel",
            put(set_notification_channel).delete(clear_notification_channel),
        )
        .route("/scheduler/stats", get(get_scheduler_stats))
        .layer(axum_middleware::from_fn(middleware::track_requests))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.scheduler.get_stats().await;

    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "service": "brickwatch",
        "scheduler_running": stats.running,
        "uptime_seconds": stats.uptime_seconds,
    }))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => HttpError::not_found("Metrics recorder not installed").into_response(),
    }
}

pub async fn serve(
    config: &ServerConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server starting on {}:{}", config.host, config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::MockStockSource;
    use crate::models::{StockResult, StockStatus};
    use crate::notifiers::MockNotifier;
    use crate::repository::SqliteWatchRepository;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn create_test_app_state() -> (AppState, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.db");
        let repo = Arc::new(
            SqliteWatchRepository::connect(path.to_str().unwrap(), 2)
                .await
                .unwrap(),
        );

        let mut checker = MockStockSource::new();
        checker.expect_check_stock().returning(|code| StockResult {
            available: true,
            status: StockStatus::InStock,
            message: "In Stock".to_string(),
            button_detected: None,
            product_name: format!("Set {}", code),
            price: None,
            source_url: format!("https://www.lego.com/en-us/product/{}", code),
        });
        let checker = Arc::new(checker);

        let scheduler = Arc::new(PollScheduler::new(
            checker.clone(),
            repo.clone(),
            Arc::new(MockNotifier::new()),
            Duration::from_secs(300),
        ));

        let state = AppState {
            commands: Arc::new(CommandService::new(checker, repo)),
            scheduler,
            metrics: None,
        };
        (state, dir)
    }

    #[tokio::test]
    async fn test_health_check() {
        let (state, _dir) = create_test_app_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let (state, _dir) = create_test_app_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_code_is_rejected() {
        let (state, _dir) = create_test_app_state().await;
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/stock/10312%20OR%201")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
