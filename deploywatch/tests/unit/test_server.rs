//! HTTP surface

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use deploywatch::eventlog::{EventLog, MemoryEventLog};
use deploywatch::models::event::{EventType, ProgressEvent};
use deploywatch::models::resource::{ResourceHealth, ResourceRecord};
use deploywatch::reconcile::{ReconcileOptions, Reconciler};
use deploywatch::registry::{MemoryRegistry, ResourceRegistry};
use deploywatch::runtime::frames::{encode_frame, StreamKind};
use deploywatch::server::serve::router;
use deploywatch::server::state::ServerState;
use deploywatch::stream::TailerOptions;

use crate::fakes::{container, FakeRuntime};

struct Harness {
    app: Router,
    log: Arc<MemoryEventLog>,
    registry: Arc<MemoryRegistry>,
}

fn harness(runtime: FakeRuntime) -> Harness {
    let log = Arc::new(MemoryEventLog::default());
    let registry = Arc::new(MemoryRegistry::new());
    let runtime = Arc::new(runtime);
    let reconciler = Arc::new(Reconciler::new(
        registry.clone(),
        runtime.clone(),
        ReconcileOptions::default(),
    ));
    let state = ServerState::new(
        log.clone(),
        registry.clone(),
        runtime,
        reconciler,
        TailerOptions::default(),
    );
    Harness {
        app: router(Arc::new(state)),
        log,
        registry,
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    send(app, Method::GET, uri, None).await
}

#[tokio::test]
async fn test_health() {
    let harness = harness(FakeRuntime::default());
    let (status, body) = get(&harness.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "deploywatch");
}

#[tokio::test]
async fn test_progress_requires_resource_id() {
    let harness = harness(FakeRuntime::default());
    for uri in ["/progress", "/progress?resourceId=", "/progress?resourceId=%20"] {
        let (status, body) = get(&harness.app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body.contains("resourceId"));
    }
}

#[tokio::test]
async fn test_progress_unknown_resource() {
    let harness = harness(FakeRuntime::default());
    let (status, _) = get(&harness.app, "/progress?resourceId=nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ingest_then_stream() {
    let harness = harness(FakeRuntime::default());

    for (i, event_type) in ["building", "container_started", "complete"].iter().enumerate() {
        let (status, body) = send(
            &harness.app,
            Method::POST,
            "/progress/res-1/events",
            Some(json!({
                "type": event_type,
                "resourceId": "ignored",
                "timestamp": 1_700_000_000_000i64 + i as i64,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["cursor"], i as u64);
    }
    // the path wins over the body
    assert_eq!(harness.log.read("res-1", 0).await.unwrap()[0].resource_id, "res-1");

    let (status, body) = get(&harness.app, "/progress?resourceId=res-1").await;
    assert_eq!(status, StatusCode::OK);

    let payloads: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    assert_eq!(payloads.len(), 4);
    let first: ProgressEvent = serde_json::from_str(payloads[0]).unwrap();
    assert_eq!(first.event_type, EventType::Building);
    let last_event: ProgressEvent = serde_json::from_str(payloads[2]).unwrap();
    assert_eq!(last_event.event_type, EventType::Complete);
    assert_eq!(payloads[3], "[DONE]");
}

#[tokio::test]
async fn test_progress_for_registered_resource_without_events() {
    let harness = harness(FakeRuntime::default());
    harness
        .registry
        .upsert(ResourceRecord::new("res-1", None))
        .await
        .unwrap();
    let log = harness.log.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        log.append("res-1", ProgressEvent::new(EventType::Error, "res-1"))
            .await
            .unwrap();
    });

    let (status, body) = get(&harness.app, "/progress?resourceId=res-1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"type\":\"error\""));
    assert!(body.contains("data: [DONE]"));
}

#[tokio::test]
async fn test_logs_errors_before_stream() {
    let harness = harness(FakeRuntime::default());
    let (status, _) = get(&harness.app, "/logs").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&harness.app, "/logs?resourceId=nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    harness
        .registry
        .upsert(ResourceRecord::new("pending", None))
        .await
        .unwrap();
    let (status, _) = get(&harness.app, "/logs?resourceId=pending").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_logs_stream() {
    let mut bytes = encode_frame(StreamKind::Stdout, b"listening on :8080\n");
    bytes.extend(encode_frame(StreamKind::Stderr, b"warn: slow start\n"));
    let harness = harness(FakeRuntime::with_logs(vec![Ok(bytes)]));
    harness
        .registry
        .upsert(ResourceRecord::new("res-1", Some("c1".to_string())))
        .await
        .unwrap();

    let (status, body) = get(&harness.app, "/logs?resourceId=res-1&tail=10&timestamps=false").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("data: listening on :8080\n"));
    assert!(body.contains("data: warn: slow start\n"));
    assert!(body.contains("event: end"));
}

#[tokio::test]
async fn test_reconcile_endpoint() {
    let harness = harness(FakeRuntime::with_containers(vec![container("c1", "deploy-res-1", true)]));
    harness
        .registry
        .upsert(ResourceRecord::new("res-1", Some("c1".to_string())).with_health(ResourceHealth::Lost))
        .await
        .unwrap();

    let (status, body) = send(&harness.app, Method::POST, "/reconcile", None).await;
    assert_eq!(status, StatusCode::OK);
    let report: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        report,
        json!({ "total": 1, "healthy": 0, "recovered": 1, "lost": 0, "cleaned": 0 })
    );
}

#[tokio::test]
async fn test_reconcile_reports_unreachable_runtime() {
    let runtime = FakeRuntime::default();
    runtime
        .fail_list
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let harness = harness(runtime);

    let (status, body) = send(&harness.app, Method::POST, "/reconcile", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.contains("connection refused"));
}

#[tokio::test]
async fn test_resource_lifecycle() {
    let harness = harness(FakeRuntime::default());

    let (status, body) = send(
        &harness.app,
        Method::PUT,
        "/resources/res-1",
        Some(json!({ "name": "web", "container_id": "c1", "health": "running" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let record: ResourceRecord = serde_json::from_str(&body).unwrap();
    assert_eq!(record.name.as_deref(), Some("web"));
    assert_eq!(record.health, ResourceHealth::Running);

    let (status, _) = send(
        &harness.app,
        Method::PUT,
        "/resources/res-1",
        Some(json!({ "health": "lost" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(&harness.app, "/resources").await;
    let listing: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["resources"][0]["container_id"], "c1");
    assert_eq!(listing["resources"][0]["health"], "lost");

    let (status, body) = send(&harness.app, Method::DELETE, "/resources/res-1", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.contains("\"deleted\""));

    let (status, _) = send(&harness.app, Method::DELETE, "/resources/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
