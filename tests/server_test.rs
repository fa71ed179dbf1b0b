// Intake endpoint tests

#![cfg(feature = "server")]

mod common;

use apk_harden::notify::{EventBus, JOB_ACCEPTED, JOB_COMPLETED};
use apk_harden::pipeline::{ErrorKind, JobStatus};
use apk_harden::server::{create_router, ServerState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{Fault, FakeToolchain, Harness};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(h: &Harness, events: &EventBus, api_key: Option<&str>) -> Router {
    let state = ServerState {
        orchestrator: h.orchestrator.clone(),
        events: events.clone(),
        api_key: api_key.map(str::to_string),
    };
    create_router(state, &["*".to_string()])
}

fn job_body() -> Value {
    json!({
        "apk_url": "https://files.example.com/shop.apk",
        "callback_url": "https://hooks.example.com/hardened",
        "id": 42,
        "service_domain": "shop.example.com",
        "file_name": "shop",
        "package_name_method": "no_change",
    })
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_harden_accepts_and_runs_job() {
    let h = Harness::new(FakeToolchain::new());
    let events = EventBus::new(16);
    let mut rx = events.subscribe();

    let response = app(&h, &events, None).oneshot(post("/harden", &job_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = read_json(response).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["id"], "42");
    assert!(body["message"].as_str().unwrap().contains("callback"));

    let event = rx.recv().await.unwrap();
    assert_eq!(event.event, JOB_ACCEPTED);
    assert_eq!(event.data["job_id"], body["job_id"]);

    let payloads = h.sink.wait_for(1).await;
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].status, JobStatus::Success);
    assert_eq!(payloads[0].job_id.to_string(), body["job_id"].as_str().unwrap());
}

#[tokio::test]
async fn test_harden_failure_still_notifies() {
    let h = Harness::new(FakeToolchain::failing(Fault::Fetch404));
    let events = EventBus::new(16);

    let response = app(&h, &events, None).oneshot(post("/harden", &job_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let payloads = h.sink.wait_for(1).await;
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].error_kind, Some(ErrorKind::FetchError));
}

#[tokio::test]
async fn test_missing_field_is_bad_request() {
    let h = Harness::new(FakeToolchain::new());
    let mut body = job_body();
    body.as_object_mut().unwrap().remove("apk_url");

    let response = app(&h, &EventBus::new(4), None).oneshot(post("/harden", &body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body, json!({ "status": "failed", "error": "apk_url is required" }));
    assert!(h.sink.payloads().is_empty());
}

#[tokio::test]
async fn test_api_key_checked_from_body_or_header() {
    let h = Harness::new(FakeToolchain::new());
    let events = EventBus::new(4);

    let response = app(&h, &events, Some("k")).oneshot(post("/harden", &job_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        read_json(response).await,
        json!({ "status": "failed", "error": "Unauthorized" })
    );

    let mut with_key = job_body();
    with_key["api_key"] = json!("k");
    let response = app(&h, &events, Some("k")).oneshot(post("/harden", &with_key)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let mut request = post("/harden", &job_body());
    request.headers_mut().insert("X-API-Key", "k".parse().unwrap());
    let response = app(&h, &events, Some("k")).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    h.sink.wait_for(2).await;
}

#[tokio::test]
async fn test_job_completed_is_relayed() {
    let h = Harness::new(FakeToolchain::new());
    let events = EventBus::new(4);
    let mut rx = events.subscribe();
    let notice = json!({ "id": "42", "installed": true });

    let response = app(&h, &events, None)
        .oneshot(post("/job-completed", &notice))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({ "status": "ok" }));
    let event = rx.recv().await.unwrap();
    assert_eq!(event.event, JOB_COMPLETED);
    assert_eq!(event.data, notice);
}

#[tokio::test]
async fn test_root_is_version_banner() {
    let h = Harness::new(FakeToolchain::new());
    let response = app(&h, &EventBus::new(4), None)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(
        String::from_utf8(bytes.to_vec()).unwrap(),
        format!("404 not found - {}", env!("CARGO_PKG_VERSION"))
    );
}
