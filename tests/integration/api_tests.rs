use super::*;
use axum::http::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn test_health_check() -> anyhow::Result<()> {
    let app = create_test_app().await?;

    let response = make_request(&app.router, Method::GET, "/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await?;
    assert_eq!(body["service"], "brickwatch");
    assert_eq!(body["scheduler_running"], false);
    Ok(())
}

#[tokio::test]
async fn test_check_stock_returns_result_and_reply() -> anyhow::Result<()> {
    let app = create_test_app().await?;
    app.checker.set("10312", StockStatus::InStock, Some("Add to Bag"));

    let response = make_request(&app.router, Method::GET, "/api/v1/stock/10312", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["result"]["status"], "in_stock");
    assert_eq!(body["data"]["result"]["button_detected"], "Add to Bag");
    let reply = body["data"]["reply"].as_str().unwrap_or_default();
    assert!(reply.contains("Set Code: 10312"));
    Ok(())
}

#[tokio::test]
async fn test_check_stock_error_is_still_a_result() -> anyhow::Result<()> {
    let app = create_test_app().await?;

    let response = make_request(&app.router, Method::GET, "/api/v1/stock/99999", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await?;
    assert_eq!(body["data"]["result"]["status"], "error");
    assert_eq!(body["data"]["result"]["available"], false);
    Ok(())
}

#[tokio::test]
async fn test_watch_lifecycle() -> anyhow::Result<()> {
    let app = create_test_app().await?;
    app.checker.set("10312", StockStatus::OutOfStock, None);
    let watch = json!({ "subscriber_id": 42, "context_id": 7, "target_code": "10312" });

    // 1. Add
    let response = make_request(&app.router, Method::POST, "/api/v1/watches", Some(watch.clone())).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await?;
    assert_eq!(body["data"]["status"], "out_of_stock");

    // 2. Duplicate
    let response = make_request(&app.router, Method::POST, "/api/v1/watches", Some(watch.clone())).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // 3. Same code without context is a separate watch
    let dm_watch = json!({ "subscriber_id": 42, "target_code": "10312" });
    let response = make_request(&app.router, Method::POST, "/api/v1/watches", Some(dm_watch)).await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    // 4. List within the context
    let response = make_request(
        &app.router,
        Method::GET,
        "/api/v1/subscribers/42/watches?context_id=7",
        None,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await?;
    assert_eq!(body["meta"]["count"], 1);
    assert_eq!(body["data"][0]["target_code"], "10312");
    assert_eq!(body["data"][0]["context_id"], 7);

    // 5. Remove, then remove again
    let response = make_request(&app.router, Method::DELETE, "/api/v1/watches", Some(watch.clone())).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = make_request(&app.router, Method::DELETE, "/api/v1/watches", Some(watch)).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_watch_unknown_set_is_refused() -> anyhow::Result<()> {
    let app = create_test_app().await?;

    let response = make_request(
        &app.router,
        Method::POST,
        "/api/v1/watches",
        Some(json!({ "subscriber_id": 1, "target_code": "99999" })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = read_json(response).await?;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap_or_default()
        .starts_with("Could not find set 99999"));
    Ok(())
}

#[tokio::test]
async fn test_watch_request_validation() -> anyhow::Result<()> {
    let app = create_test_app().await?;

    let too_long = "9".repeat(40);
    for code in ["", "10312/../x", too_long.as_str()] {
        let response = make_request(
            &app.router,
            Method::POST,
            "/api/v1/watches",
            Some(json!({ "subscriber_id": 1, "target_code": code })),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "code {:?}", code);
    }
    Ok(())
}

#[tokio::test]
async fn test_notification_channel_endpoints() -> anyhow::Result<()> {
    let app = create_test_app().await?;
    let uri = "/api/v1/contexts/7/notification-channel";

    let response = make_request(&app.router, Method::PUT, uri, Some(json!({ "channel_id": 555 }))).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = make_request(&app.router, Method::DELETE, uri, None).await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"]["cleared"], true);

    let response = make_request(&app.router, Method::DELETE, uri, None).await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"]["cleared"], false);

    let response = make_request(&app.router, Method::PUT, uri, Some(json!({ "channel_id": 0 }))).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_scheduler_stats_endpoint() -> anyhow::Result<()> {
    let app = create_test_app().await?;
    app.scheduler.run_cycle().await;

    let response = make_request(&app.router, Method::GET, "/api/v1/scheduler/stats", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await?;
    assert_eq!(body["data"]["cycles_completed"], 1);
    assert_eq!(body["data"]["interval_seconds"], 300);
    Ok(())
}
