//! Event log ordering, cursors and retention

use std::time::Duration;

use deploywatch::eventlog::{EventLog, JsonlEventLog, MemoryEventLog};
use deploywatch::models::event::{EventType, ProgressEvent};

fn lifecycle(resource_id: &str) -> Vec<ProgressEvent> {
    [
        EventType::Building,
        EventType::ContainerStarted,
        EventType::Testing,
        EventType::TestResult,
        EventType::Complete,
    ]
    .into_iter()
    .map(|event_type| ProgressEvent::new(event_type, resource_id))
    .collect()
}

fn types(events: &[ProgressEvent]) -> Vec<EventType> {
    events.iter().map(|e| e.event_type).collect()
}

async fn check_append_order_and_cursor(log: &dyn EventLog) {
    let events = lifecycle("res-1");
    for (i, event) in events.iter().enumerate() {
        assert_eq!(log.append("res-1", event.clone()).await.unwrap(), i as u64);
    }
    log.append("res-2", ProgressEvent::new(EventType::Building, "res-2"))
        .await
        .unwrap();

    let all = log.read("res-1", 0).await.unwrap();
    assert_eq!(types(&all), types(&events));

    // re-reading the same cursor is idempotent
    assert_eq!(log.read("res-1", 0).await.unwrap(), all);

    let tail = log.read("res-1", 3).await.unwrap();
    assert_eq!(types(&tail), vec![EventType::TestResult, EventType::Complete]);
    assert!(log.read("res-1", 5).await.unwrap().is_empty());
    assert!(log.read("res-1", 50).await.unwrap().is_empty());

    assert_eq!(log.read("res-2", 0).await.unwrap().len(), 1);
    assert!(log.read("unknown", 0).await.unwrap().is_empty());
    assert!(log.contains("res-2").await.unwrap());
    assert!(!log.contains("unknown").await.unwrap());
}

#[tokio::test]
async fn test_memory_log_order_and_cursor() {
    let log = MemoryEventLog::default();
    check_append_order_and_cursor(&log).await;
}

#[tokio::test]
async fn test_jsonl_log_order_and_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let log = JsonlEventLog::new(dir.path(), Duration::from_secs(600));
    check_append_order_and_cursor(&log).await;
}

#[tokio::test(start_paused = true)]
async fn test_memory_log_retention() {
    let log = MemoryEventLog::new(Duration::from_secs(600));
    log.append("old", ProgressEvent::new(EventType::Complete, "old"))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(300)).await;
    log.append("fresh", ProgressEvent::new(EventType::Building, "fresh"))
        .await
        .unwrap();
    assert_eq!(log.read("old", 0).await.unwrap().len(), 1);

    tokio::time::advance(Duration::from_secs(301)).await;
    assert!(log.read("old", 0).await.unwrap().is_empty());
    assert_eq!(log.read("fresh", 0).await.unwrap().len(), 1);

    assert_eq!(log.prune(), 1);
    assert_eq!(log.len(), 1);

    // a new deployment of an expired resource starts from position 0
    let position = log
        .append("old", ProgressEvent::new(EventType::Building, "old"))
        .await
        .unwrap();
    assert_eq!(position, 0);
}

#[tokio::test]
async fn test_jsonl_logs_share_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let writer = JsonlEventLog::new(dir.path(), Duration::from_secs(600));
    let reader = JsonlEventLog::new(dir.path(), Duration::from_secs(600));

    writer
        .append("res-1", ProgressEvent::new(EventType::Building, "res-1"))
        .await
        .unwrap();
    writer
        .append("res-1", ProgressEvent::new(EventType::Error, "res-1").with_error("build failed"))
        .await
        .unwrap();

    let events = reader.read("res-1", 0).await.unwrap();
    assert_eq!(types(&events), vec![EventType::Building, EventType::Error]);
    assert_eq!(events[1].error.as_deref(), Some("build failed"));
}

#[tokio::test]
async fn test_jsonl_torn_write_does_not_swallow_next_event() {
    let dir = tempfile::tempdir().unwrap();
    let log = JsonlEventLog::new(dir.path(), Duration::from_secs(600));
    log.append("res-1", ProgressEvent::new(EventType::Building, "res-1"))
        .await
        .unwrap();

    let path = dir.path().join("res-1.jsonl");
    let mut contents = std::fs::read_to_string(&path).unwrap();
    contents.push_str(r#"{"type":"testi"#);
    std::fs::write(&path, contents).unwrap();
    assert_eq!(log.read("res-1", 0).await.unwrap().len(), 1);

    let position = log
        .append("res-1", ProgressEvent::new(EventType::Complete, "res-1"))
        .await
        .unwrap();
    assert_eq!(position, 1);
    let events = log.read("res-1", 0).await.unwrap();
    assert_eq!(types(&events), vec![EventType::Building, EventType::Complete]);
}

#[tokio::test]
async fn test_jsonl_zero_retention_keeps_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let log = JsonlEventLog::new(dir.path(), Duration::ZERO);
    log.append("res-1", ProgressEvent::new(EventType::Building, "res-1"))
        .await
        .unwrap();
    assert!(log.read("res-1", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_jsonl_similar_ids_do_not_share_events() {
    let dir = tempfile::tempdir().unwrap();
    let log = JsonlEventLog::new(dir.path(), Duration::from_secs(600));
    log.append("web.app", ProgressEvent::new(EventType::Building, "web.app"))
        .await
        .unwrap();
    log.append("web.app", ProgressEvent::new(EventType::Complete, "web.app"))
        .await
        .unwrap();

    for other in ["web_app", "web/app", "web_2eapp"] {
        assert!(log.read(other, 0).await.unwrap().is_empty(), "{}", other);
        assert!(!log.contains(other).await.unwrap(), "{}", other);
    }

    let position = log
        .append("web_app", ProgressEvent::new(EventType::Building, "web_app"))
        .await
        .unwrap();
    assert_eq!(position, 0);
    assert_eq!(log.read("web.app", 0).await.unwrap().len(), 2);
}
