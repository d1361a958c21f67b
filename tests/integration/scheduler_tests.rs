use super::*;
use axum::http::{Method, StatusCode};
use brickwatch::notifiers::Change;
use serde_json::json;

#[tokio::test]
async fn test_change_notifications_across_cycles() -> anyhow::Result<()> {
    let app = create_test_app().await?;
    app.checker.set("10312", StockStatus::OutOfStock, None);

    let response = make_request(
        &app.router,
        Method::POST,
        "/api/v1/watches",
        Some(json!({ "subscriber_id": 42, "context_id": 7, "target_code": "10312" })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = make_request(
        &app.router,
        Method::PUT,
        "/api/v1/contexts/7/notification-channel",
        Some(json!({ "channel_id": 555 })),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // First poll only records state
    app.scheduler.run_cycle().await;
    assert!(app.notifier.sent.lock().unwrap().is_empty());

    // Back in stock
    app.checker.set("10312", StockStatus::InStock, Some("Add to Bag"));
    let summary = app.scheduler.run_cycle().await;
    assert_eq!(summary.notified, 1);

    {
        let sent = app.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (notification, channel) = &sent[0];
        assert_eq!(notification.subscriber_id, 42);
        assert_eq!(notification.target_code, "10312");
        assert_eq!(
            notification.change,
            Change::StatusChanged { previous: StockStatus::OutOfStock }
        );
        assert_eq!(*channel, Some(555));
    }

    // Unchanged state stays quiet
    app.scheduler.run_cycle().await;
    assert_eq!(app.notifier.sent.lock().unwrap().len(), 1);

    let response = make_request(
        &app.router,
        Method::GET,
        "/api/v1/subscribers/42/watches?context_id=7",
        None,
    )
    .await?;
    let body = read_json(response).await?;
    assert_eq!(body["data"][0]["last_status"], "in_stock");
    assert_eq!(body["data"][0]["last_button_detected"], "Add to Bag");

    let stats = app.scheduler.get_stats().await;
    assert_eq!(stats.cycles_completed, 3);
    assert_eq!(stats.checks_run, 3);
    assert_eq!(stats.notifications_sent, 1);
    Ok(())
}

#[tokio::test]
async fn test_scheduler_start_and_shutdown() -> anyhow::Result<()> {
    let app = create_test_app().await?;

    app.scheduler.start().await;
    assert!(app.scheduler.get_stats().await.running);

    tokio::time::timeout(Duration::from_secs(2), app.scheduler.shutdown()).await?;
    assert!(!app.scheduler.get_stats().await.running);
    Ok(())
}
