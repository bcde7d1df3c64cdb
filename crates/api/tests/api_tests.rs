use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use geofence_api::{create_routes, AppState};
use geofence_core::config::{AppConfig, DatabaseConfig, WorkerConfig};
use geofence_dispatcher::DispatchService;
use geofence_domain::{EventHandler, HandlerFailure, TransitionEvent};
use serde_json::{json, Value};
use tower::ServiceExt;

struct RejectingHandler;

#[async_trait]
impl EventHandler for RejectingHandler {
    async fn handle(&self, _event: &TransitionEvent) -> Result<(), HandlerFailure> {
        Err(HandlerFailure::permanent("schema mismatch"))
    }
}

async fn setup() -> (Arc<DispatchService>, Router) {
    let mut config = AppConfig::default();
    config.database = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        ..DatabaseConfig::default()
    };
    config.worker = WorkerConfig {
        poll_interval_ms: 20,
        ..WorkerConfig::default()
    };

    let service = Arc::new(
        DispatchService::builder(config)
            .handler("H-reject", Arc::new(RejectingHandler))
            .build()
            .await
            .unwrap(),
    );
    service.initialize().await.unwrap();
    let app = create_routes(AppState::new(service.clone()), false);
    (service, app)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn region_body(handler_id: &str, transitions: &[&str]) -> Value {
    json!({
        "latitude": 40.7128,
        "longitude": -74.006,
        "radius_meters": 250.0,
        "transitions": transitions,
        "handler_id": handler_id
    })
}

#[tokio::test]
async fn test_health_check() {
    let (_service, app) = setup().await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], true);
    assert_eq!(body["dispatcher_running"], false);
}

#[tokio::test]
async fn test_register_and_list_regions() {
    let (_service, app) = setup().await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/regions/office",
        Some(region_body("H1", &["ENTER", "EXIT"])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["handler_id"], "H1");
    assert_eq!(body["data"]["region"]["id"], "office");

    // 覆盖已有绑定
    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/regions/office",
        Some(region_body("H2", &["ENTER"])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/api/regions", None).await;
    assert_eq!(status, StatusCode::OK);
    let regions = body["data"].as_array().unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0]["handler_id"], "H2");
}

#[tokio::test]
async fn test_register_rejects_invalid_region() {
    let (_service, app) = setup().await;

    let mut invalid_radius = region_body("H1", &["ENTER"]);
    invalid_radius["radius_meters"] = json!(-5.0);
    let (status, body) = send(&app, Method::PUT, "/api/regions/bad", Some(invalid_radius)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["type"], "INVALID_REGION");

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/regions/bad",
        Some(region_body("", &["ENTER"])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "INVALID_REGISTRATION");
}

#[tokio::test]
async fn test_unregister_region() {
    let (_service, app) = setup().await;
    send(
        &app,
        Method::PUT,
        "/api/regions/office",
        Some(region_body("H1", &["ENTER"])),
    )
    .await;

    let (status, body) = send(&app, Method::DELETE, "/api/regions/office", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], true);

    let (status, body) = send(&app, Method::DELETE, "/api/regions/office", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "NOT_FOUND");
}

#[tokio::test]
async fn test_submit_event() {
    let (_service, app) = setup().await;
    send(
        &app,
        Method::PUT,
        "/api/regions/office",
        Some(region_body("H1", &["ENTER"])),
    )
    .await;

    let event = json!({ "region_id": "office", "transition": "ENTER", "timestamp": 120_000 });
    let (status, body) = send(&app, Method::POST, "/api/events", Some(event.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["status"], "PENDING");
    assert_eq!(body["data"]["handler_id"], "H1");
    let first_id = body["data"]["id"].clone();

    // 同一去重窗口内的重复事件返回已有条目
    let (_, body) = send(&app, Method::POST, "/api/events", Some(event)).await;
    assert_eq!(body["data"]["id"], first_id);

    let unknown = json!({ "region_id": "nowhere", "transition": "exit", "timestamp": 1 });
    let (status, body) = send(&app, Method::POST, "/api/events", Some(unknown)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body["data"].is_null());

    let (status, body) = send(&app, Method::GET, "/api/queue/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["queue"]["pending"], 1);
    assert_eq!(body["data"]["worker_running"], false);
}

#[tokio::test]
async fn test_submit_event_rejects_unknown_transition() {
    let (_service, app) = setup().await;
    let event = json!({ "region_id": "office", "transition": "HOVER", "timestamp": 1 });
    let (status, _) = send(&app, Method::POST, "/api/events", Some(event)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_dead_letter_listing_and_requeue() {
    let (service, app) = setup().await;
    send(
        &app,
        Method::PUT,
        "/api/regions/dock",
        Some(region_body("H-reject", &["DWELL"])),
    )
    .await;
    service.start().await.unwrap();

    let event = json!({ "region_id": "dock", "transition": "DWELL", "timestamp": 5_000 });
    send(&app, Method::POST, "/api/events", Some(event)).await;

    let mut dead = Value::Null;
    for _ in 0..200 {
        let (_, body) = send(&app, Method::GET, "/api/queue/dead-letters?limit=10", None).await;
        if body["data"].as_array().is_some_and(|entries| !entries.is_empty()) {
            dead = body["data"][0].clone();
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    service.stop().await.unwrap();

    assert_eq!(dead["status"], "DEAD");
    assert!(dead["last_error"].as_str().unwrap().contains("schema mismatch"));

    let uri = format!("/api/queue/dead-letters/{}/requeue", dead["id"]);
    let (status, body) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "PENDING");
    assert_eq!(body["data"]["attempts"], 0);

    // 条目已不在死信状态
    let (status, body) = send(&app, Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["type"], "INVALID_ENTRY_STATE");

    let (status, _) = send(&app, Method::POST, "/api/queue/dead-letters/9999/requeue", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, "/api/queue/dead-letters?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
