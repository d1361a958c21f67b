use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ApiResponse, AppState, HttpError};
use crate::checker::is_valid_target_code;
use crate::commands::{render_check_reply, UnwatchOutcome, WatchOutcome};
use crate::models::{StockResult, WatchRecord};
use crate::scheduler::SchedulerStats;

type HandlerResult<T> = Result<Json<ApiResponse<T>>, HttpError>;

#[derive(Debug, Deserialize, Validate)]
pub struct WatchRequest {
    pub subscriber_id: i64,
    pub context_id: Option<i64>,
    #[validate(length(min = 1, max = 32))]
    pub target_code: String,
}

impl WatchRequest {
    fn validated_code(&self) -> Result<&str, HttpError> {
        self.validate()?;
        let code = self.target_code.trim();
        if !is_valid_target_code(code) {
            return Err(HttpError::bad_request(
                "target_code must contain only letters, digits and '-'",
            ));
        }
        Ok(code)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChannelRequest {
    #[validate(range(min = 1))]
    pub channel_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    pub context_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub result: StockResult,
    pub reply: String,
}

pub async fn check_stock(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> HandlerResult<CheckResponse> {
    let code = code.trim();
    if !is_valid_target_code(code) {
        return Err(HttpError::bad_request(format!("Invalid set code: {}", code)));
    }

    tracing::info!(target_code = code, "On-demand stock check");
    let result = state.commands.check_stock(code).await;
    let reply = render_check_reply(code, &result);

    Ok(Json(ApiResponse::success(CheckResponse { result, reply })))
}

pub async fn add_watch(
    State(state): State<AppState>,
    Json(request): Json<WatchRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StockResult>>), HttpError> {
    let code = request.validated_code()?;

    match state
        .commands
        .watch(request.subscriber_id, request.context_id, code)
        .await?
    {
        WatchOutcome::Added { result } => Ok((StatusCode::CREATED, Json(ApiResponse::success(result)))),
        WatchOutcome::AlreadyWatching => Err(HttpError::conflict(format!(
            "Set {} is already in your watchlist",
            code
        ))),
        WatchOutcome::NotFound { message } => Err(HttpError::not_found(message)),
    }
}

pub async fn remove_watch(
    State(state): State<AppState>,
    Json(request): Json<WatchRequest>,
) -> HandlerResult<UnwatchOutcome> {
    let code = request.validated_code()?;

    match state
        .commands
        .unwatch(request.subscriber_id, request.context_id, code)
        .await?
    {
        UnwatchOutcome::Removed => Ok(Json(ApiResponse::success(UnwatchOutcome::Removed))),
        UnwatchOutcome::NotWatching => Err(HttpError::not_found(format!(
            "Set {} is not in your watchlist",
            code
        ))),
    }
}

pub async fn list_watches(
    State(state): State<AppState>,
    Path(subscriber_id): Path<i64>,
    Query(query): Query<ContextQuery>,
) -> HandlerResult<Vec<WatchRecord>> {
    let watches = state
        .commands
        .list_watches(subscriber_id, query.context_id)
        .await?;

    let meta = serde_json::json!({ "count": watches.len() });
    Ok(Json(ApiResponse::success_with_meta(watches, meta)))
}

pub async fn set_notification_channel(
    State(state): State<AppState>,
    Path(context_id): Path<i64>,
    Json(request): Json<ChannelRequest>,
) -> HandlerResult<serde_json::Value> {
    request.validate()?;

    state
        .commands
        .set_notification_channel(context_id, request.channel_id)
        .await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "context_id": context_id,
        "channel_id": request.channel_id,
    }))))
}

pub async fn clear_notification_channel(
    State(state): State<AppState>,
    Path(context_id): Path<i64>,
) -> HandlerResult<serde_json::Value> {
    let cleared = state.commands.clear_notification_channel(context_id).await?;

    Ok(Json(ApiResponse::success(serde_json::json!({
        "context_id": context_id,
        "cleared": cleared,
    }))))
}

pub async fn get_scheduler_stats(State(state): State<AppState>) -> HandlerResult<SchedulerStats> {
    Ok(Json(ApiResponse::success(state.scheduler.get_stats().await)))
}
