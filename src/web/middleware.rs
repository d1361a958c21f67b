use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Counts API requests by method and status, and surfaces failed ones in the log.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    metrics::counter!(
        "brickwatch_http_requests_total",
        "method" => method.to_string(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request failed"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request rejected"
        );
    }

    response
}
