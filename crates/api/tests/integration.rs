//! Integration tests for API routes.
//!
//! Uses `tower::ServiceExt` to test Axum routes without a real HTTP server.
//! Stores and the Telegram channel are replaced with in-memory doubles, so
//! no database or Redis is needed.
//!
//! ```bash
//! cargo test -p courier-api --test integration
//! ```

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

use courier_api::routes::create_router;
use courier_api::state::AppState;
use courier_common::config::{AppConfig, ReminderConfig};
use courier_common::types::{AddressField, DirectorRecord, MasterRecord, OrderRecord};
use courier_notifier::memory::{InMemoryHistory, InMemoryRecords, RecordingChannel};
use courier_notifier::orders::OrderNotifications;
use courier_notifier::{Dispatcher, LinkConfig};
use courier_scheduler::{LocalClaims, ReminderScheduler};

const TOKEN: &str = "test-webhook-token";

// ============================================================
// Helpers
// ============================================================

fn test_config() -> AppConfig {
    AppConfig {
        port: 0,
        database_url: "unused".to_string(),
        db_max_connections: 1,
        redis_url: None,
        webhook_token: TOKEN.to_string(),
        telegram_bot_token: None,
        telegram_api_url: "http://unused".to_string(),
        director_order_url: "https://new.lead-schem.ru".to_string(),
        master_order_url: "https://lead-schem.ru".to_string(),
        director_address_field: AddressField::TgId,
        master_address_field: AddressField::ChatId,
        reminders: ReminderConfig::default(),
        scheduler_enabled: false,
    }
}

struct TestApp {
    records: Arc<InMemoryRecords>,
    channel: Arc<RecordingChannel>,
    state: AppState,
}

impl TestApp {
    fn router(&self) -> Router {
        create_router(self.state.clone())
    }
}

fn build_test_app() -> TestApp {
    let config = test_config();
    let records = Arc::new(InMemoryRecords::new());
    let history = Arc::new(InMemoryHistory::new());
    let channel = Arc::new(RecordingChannel::new());

    let dispatcher = Arc::new(Dispatcher::new(
        records.clone(),
        history.clone(),
        channel.clone(),
        LinkConfig {
            director_order_url: config.director_order_url.clone(),
            master_order_url: config.master_order_url.clone(),
        },
        config.reminders.timezone,
    ));
    let notifications = Arc::new(OrderNotifications::new(dispatcher.clone(), records.clone()));
    let scheduler = Arc::new(ReminderScheduler::new(
        records.clone(),
        history,
        dispatcher.clone(),
        Arc::new(LocalClaims::new()),
        config.reminders.clone(),
    ));

    TestApp {
        records,
        channel,
        state: AppState::new(dispatcher, notifications, scheduler, config),
    }
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("x-webhook-token", token);
    }
    builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

// ============================================================
// Route Tests
// ============================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_app();

    let response = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "order-courier");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_missing_or_wrong_token_is_rejected() {
    let app = build_test_app();
    let body = json!({ "type": "new_order", "orderId": 1, "city": "Москва" });

    let missing = app
        .router()
        .oneshot(post_json("/api/v1/notifications/send", None, body.clone()))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(missing).await;
    assert_eq!(json["success"], false);

    let wrong = app
        .router()
        .oneshot(post_json("/api/v1/notifications/send", Some("nope"), body))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let reminders = app
        .router()
        .oneshot(post_json("/api/v1/reminders/test", None, json!({})))
        .await
        .unwrap();
    assert_eq!(reminders.status(), StatusCode::UNAUTHORIZED);
    assert!(app.channel.sent().is_empty());
}

#[tokio::test]
async fn test_send_new_order_to_city_directors() {
    let app = build_test_app();
    app.records.add_director(DirectorRecord {
        id: 1,
        name: "Иван".into(),
        cities: vec!["Москва".into()],
        channel_address: Some("111".into()),
    });
    app.records.add_director(DirectorRecord {
        id: 2,
        name: "Олег".into(),
        cities: vec!["Москва".into()],
        channel_address: None,
    });

    let response = app
        .router()
        .oneshot(post_json(
            "/api/v1/notifications/send",
            Some(TOKEN),
            json!({
                "type": "new_order",
                "orderId": 1001,
                "city": "Москва",
                "data": { "clientName": "Анна", "phone": 79990001122u64, "rk": "Авито" }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["status"], "delivered");
    assert_eq!(json["orderId"], 1001);

    let outcomes = json["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0]["recipientId"], 1);
    assert_eq!(outcomes[0]["success"], true);
    assert_eq!(outcomes[1]["recipientId"], 2);
    assert_eq!(outcomes[1]["skipped"], true);
    assert_eq!(outcomes[1]["attempts"], 0);

    let sent = app.channel.sent_to("111");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("79990001122"));
}

#[tokio::test]
async fn test_send_unknown_type_reports_unknown_template() {
    let app = build_test_app();

    let response = app
        .router()
        .oneshot(post_json(
            "/api/v1/notifications/send",
            Some(TOKEN),
            json!({ "type": "order_exploded", "orderId": 5 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["status"], "unknown_template");
    assert_eq!(json["type"], "order_exploded");
    assert!(app.channel.sent().is_empty());
}

#[tokio::test]
async fn test_master_reassigned_notifies_previous_master() {
    let app = build_test_app();
    app.records.add_master(MasterRecord {
        id: 7,
        name: "Пётр".into(),
        channel_address: Some("777".into()),
    });
    app.records.add_master(MasterRecord {
        id: 8,
        name: "Семён".into(),
        channel_address: Some("888".into()),
    });

    let response = app
        .router()
        .oneshot(post_json(
            "/api/v1/notifications/master-reassigned",
            Some(TOKEN),
            json!({ "orderId": 42, "oldMasterId": 7 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["outcomes"][0]["recipientType"], "master");
    assert_eq!(app.channel.sent_to("777").len(), 1);
    assert!(app.channel.sent_to("888").is_empty());
}

#[tokio::test]
async fn test_reminder_trigger_runs_both_passes() {
    let app = build_test_app();
    app.records.add_master(MasterRecord {
        id: 7,
        name: "Пётр".into(),
        channel_address: Some("777".into()),
    });
    let meeting = Utc::now() - Duration::hours(5);
    app.records.upsert_order(OrderRecord {
        id: 10,
        status: "В работе".into(),
        client_name: Some("Анна".into()),
        city: Some("Москва".into()),
        master_id: Some(7),
        date_meeting: Some(meeting),
        expected_closing_date: None,
        updated_at: meeting,
        rk: None,
        avito_name: None,
        type_equipment: None,
    });

    let response = app
        .router()
        .oneshot(post_json("/api/v1/reminders/test", Some(TOKEN), json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["closeOrders"]["scanned"], 1);
    assert_eq!(json["closeOrders"]["sent"], 1);
    assert_eq!(json["modernOrders"]["scanned"], 0);

    let sent = app.channel.sent_to("777");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("Закройте заказ №10"));

    // Watermark now holds the key, so an immediate rerun sends nothing.
    let rerun = app
        .router()
        .oneshot(post_json("/api/v1/reminders/close-orders", Some(TOKEN), json!({})))
        .await
        .unwrap();
    let json = body_json(rerun).await;
    assert_eq!(json["closeOrders"]["notDue"], 1);
    assert_eq!(app.channel.sent_to("777").len(), 1);
}
