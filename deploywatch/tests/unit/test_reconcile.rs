//! Registry/runtime reconciliation and its worker

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use deploywatch::filesys::file::File;
use deploywatch::models::resource::{ResourceHealth, ResourceRecord};
use deploywatch::reconcile::{ReconcileOptions, ReconcileReport, Reconciler};
use deploywatch::registry::{modify_record, FileRegistry, MemoryRegistry, ResourceRegistry};
use deploywatch::workers::reconciler as worker;

use crate::fakes::{container, FakeRuntime, RacingRegistry};

fn record(resource_id: &str, container_id: &str, health: ResourceHealth) -> ResourceRecord {
    ResourceRecord::new(resource_id, Some(container_id.to_string())).with_health(health)
}

fn reconciler(
    registry: &Arc<MemoryRegistry>,
    runtime: &Arc<FakeRuntime>,
    options: ReconcileOptions,
) -> Reconciler {
    Reconciler::new(registry.clone(), runtime.clone(), options)
}

async fn health(registry: &MemoryRegistry, resource_id: &str) -> Option<ResourceHealth> {
    registry
        .get(resource_id)
        .await
        .unwrap()
        .map(|record| record.health)
}

#[tokio::test]
async fn test_empty_registry_and_runtime() {
    let registry = Arc::new(MemoryRegistry::new());
    let runtime = Arc::new(FakeRuntime::default());

    let report = reconciler(&registry, &runtime, ReconcileOptions::default())
        .reconcile()
        .await
        .unwrap();
    assert_eq!(report, ReconcileReport::default());
}

#[tokio::test]
async fn test_lost_then_recovered() {
    let registry = Arc::new(MemoryRegistry::with_records([record(
        "res-1",
        "c1",
        ResourceHealth::Running,
    )]));
    let runtime = Arc::new(FakeRuntime::default());
    let reconciler = reconciler(&registry, &runtime, ReconcileOptions::default());

    let report = reconciler.reconcile().await.unwrap();
    assert_eq!(report.lost, 1);
    assert_eq!(report.total, 1);
    // lost records are kept for visibility
    assert_eq!(health(&registry, "res-1").await, Some(ResourceHealth::Lost));

    runtime.set_containers(vec![container("c1", "deploy-res-1", true)]);
    let report = reconciler.reconcile().await.unwrap();
    assert_eq!(report.recovered, 1);
    assert_eq!(report.lost, 0);
    assert_eq!(health(&registry, "res-1").await, Some(ResourceHealth::Running));

    let report = reconciler.reconcile().await.unwrap();
    assert_eq!(report.healthy, 1);
    assert_eq!(report.recovered, 0);
}

#[tokio::test]
async fn test_stopped_container_is_lost() {
    let registry = Arc::new(MemoryRegistry::with_records([record(
        "res-1",
        "c1",
        ResourceHealth::Running,
    )]));
    let runtime = Arc::new(FakeRuntime::with_containers(vec![container(
        "c1",
        "deploy-res-1",
        false,
    )]));

    let report = reconciler(&registry, &runtime, ReconcileOptions::default())
        .reconcile()
        .await
        .unwrap();
    assert_eq!(report.lost, 1);
    assert!(runtime.removed().is_empty());
}

#[tokio::test]
async fn test_deleted_resource_cleaned_with_container() {
    let registry = Arc::new(MemoryRegistry::with_records([
        record("gone", "c1", ResourceHealth::Deleted),
        record("kept", "c2", ResourceHealth::Running),
    ]));
    let runtime = Arc::new(FakeRuntime::with_containers(vec![
        container("c1", "deploy-gone", true),
        container("c2", "deploy-kept", true),
    ]));

    let report = reconciler(&registry, &runtime, ReconcileOptions::default())
        .reconcile()
        .await
        .unwrap();
    assert_eq!(report.cleaned, 1);
    assert_eq!(report.healthy, 1);
    assert_eq!(report.total, 2);
    assert_eq!(runtime.removed(), vec!["c1".to_string()]);
    assert_eq!(health(&registry, "gone").await, None);
}

#[tokio::test]
async fn test_orphans_cleaned_only_with_prefix() {
    let containers = vec![
        container("c1", "deploy-res-1", true),
        container("c2", "deploy-orphan", true),
        container("c3", "postgres", true),
    ];
    let registry = Arc::new(MemoryRegistry::with_records([record(
        "res-1",
        "c1",
        ResourceHealth::Running,
    )]));

    let runtime = Arc::new(FakeRuntime::with_containers(containers.clone()));
    let report = reconciler(&registry, &runtime, ReconcileOptions::default())
        .reconcile()
        .await
        .unwrap();
    assert_eq!(report.cleaned, 0);
    assert!(runtime.removed().is_empty());

    let runtime = Arc::new(FakeRuntime::with_containers(containers));
    let options = ReconcileOptions {
        container_prefix: Some("deploy-".to_string()),
    };
    let report = reconciler(&registry, &runtime, options)
        .reconcile()
        .await
        .unwrap();
    assert_eq!(report.healthy, 1);
    assert_eq!(report.cleaned, 1);
    assert_eq!(report.total, 2);
    assert_eq!(runtime.removed(), vec!["c2".to_string()]);
}

#[tokio::test]
async fn test_counts_cover_every_record() {
    let registry = Arc::new(MemoryRegistry::with_records([
        record("healthy", "c-healthy", ResourceHealth::Running),
        record("recovered", "c-recovered", ResourceHealth::Lost),
        record("unknown", "c-unknown", ResourceHealth::Unknown),
        record("lost", "c-lost", ResourceHealth::Running),
        record("still-lost", "c-still-lost", ResourceHealth::Lost),
        ResourceRecord::new("never-scheduled", None),
        record("deleted", "c-deleted", ResourceHealth::Deleted),
    ]));
    let runtime = Arc::new(FakeRuntime::with_containers(vec![
        container("c-healthy", "deploy-healthy", true),
        container("c-recovered", "deploy-recovered", true),
        container("c-unknown", "deploy-unknown", true),
        container("c-still-lost", "deploy-still-lost", false),
    ]));

    let report = reconciler(&registry, &runtime, ReconcileOptions::default())
        .reconcile()
        .await
        .unwrap();

    assert_eq!(report.healthy, 1);
    assert_eq!(report.recovered, 2);
    assert_eq!(report.lost, 3);
    assert_eq!(report.cleaned, 1);
    assert_eq!(report.healthy + report.recovered + report.lost, 6);
    assert_eq!(
        report.total,
        report.healthy + report.recovered + report.lost + report.cleaned
    );
    assert_eq!(registry.list().await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_runtime_failure_leaves_registry_alone() {
    let registry = Arc::new(MemoryRegistry::with_records([record(
        "res-1",
        "c1",
        ResourceHealth::Running,
    )]));
    let runtime = Arc::new(FakeRuntime::default());
    runtime.fail_list.store(true, Ordering::SeqCst);

    let result = reconciler(&registry, &runtime, ReconcileOptions::default())
        .reconcile()
        .await;
    assert!(result.is_err());
    assert_eq!(health(&registry, "res-1").await, Some(ResourceHealth::Running));
}

#[tokio::test(start_paused = true)]
async fn test_worker_survives_failed_passes() {
    let registry = Arc::new(MemoryRegistry::new());
    let runtime = Arc::new(FakeRuntime::default());
    runtime.fail_list.store(true, Ordering::SeqCst);
    let engine = reconciler(&registry, &runtime, ReconcileOptions::default());

    let options = worker::Options {
        interval: Duration::from_secs(60),
        initial_delay: Duration::from_secs(10),
    };
    // grace delay, then passes at 10s, 70s and 130s
    let shutdown = Box::pin(tokio::time::sleep(Duration::from_secs(150)));
    worker::run(&options, &engine, tokio::time::sleep, shutdown).await;

    assert_eq!(runtime.list_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_file_registry_persists_corrections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    let registry = Arc::new(FileRegistry::new(File::new(&path)));
    registry
        .upsert(record("res-1", "c1", ResourceHealth::Running))
        .await
        .unwrap();
    registry
        .upsert(record("gone", "c2", ResourceHealth::Deleted))
        .await
        .unwrap();

    let runtime = Arc::new(FakeRuntime::default());
    let report = Reconciler::new(registry.clone(), runtime.clone(), ReconcileOptions::default())
        .reconcile()
        .await
        .unwrap();
    assert_eq!(report.lost, 1);
    assert_eq!(report.cleaned, 1);

    // a fresh handle sees what the pass wrote
    let reopened = FileRegistry::new(File::new(&path));
    let records = reopened.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].resource_id, "res-1");
    assert_eq!(records[0].health, ResourceHealth::Lost);
    assert!(!reopened.remove("gone").await.unwrap());
}

#[tokio::test]
async fn test_delete_during_pass_is_not_overwritten() {
    let registry = Arc::new(RacingRegistry::with_records([record(
        "r1",
        "c1",
        ResourceHealth::Running,
    )]));
    let runtime = Arc::new(FakeRuntime::default());
    let reconciler = Reconciler::new(registry.clone(), runtime.clone(), ReconcileOptions::default());

    // a DELETE lands between the pass listing r1 and marking it lost
    registry.race("r1", ResourceHealth::Deleted);
    let report = reconciler.reconcile().await.unwrap();
    assert_eq!(registry.health("r1").await, Some(ResourceHealth::Deleted));
    assert_eq!(report.lost, 0);
    assert_eq!(report.total, 0);

    let report = reconciler.reconcile().await.unwrap();
    assert_eq!(report.cleaned, 1);
    assert_eq!(registry.health("r1").await, None);
}

#[tokio::test]
async fn test_resurrected_record_is_not_cleaned() {
    let registry = Arc::new(RacingRegistry::with_records([record(
        "r1",
        "c1",
        ResourceHealth::Deleted,
    )]));
    let runtime = Arc::new(FakeRuntime::with_containers(vec![container(
        "c1", "web", true,
    )]));
    let reconciler = Reconciler::new(registry.clone(), runtime.clone(), ReconcileOptions::default());

    registry.race("r1", ResourceHealth::Running);
    let report = reconciler.reconcile().await.unwrap();
    assert_eq!(report.cleaned, 0);
    assert_eq!(registry.health("r1").await, Some(ResourceHealth::Running));
    assert!(runtime.removed().is_empty());
}

#[tokio::test]
async fn test_failed_record_removal_is_not_counted() {
    let registry = Arc::new(RacingRegistry::with_records([record(
        "r1",
        "c1",
        ResourceHealth::Deleted,
    )]));
    registry.fail_remove.store(true, Ordering::SeqCst);
    let runtime = Arc::new(FakeRuntime::with_containers(vec![container(
        "c1", "web", true,
    )]));
    let reconciler = Reconciler::new(registry.clone(), runtime.clone(), ReconcileOptions::default());

    let report = reconciler.reconcile().await.unwrap();
    assert_eq!(report.cleaned, 0);
    assert_eq!(report.total, 0);
    assert_eq!(registry.health("r1").await, Some(ResourceHealth::Deleted));
    assert!(runtime.removed().is_empty());

    registry.fail_remove.store(false, Ordering::SeqCst);
    let report = reconciler.reconcile().await.unwrap();
    assert_eq!(report.cleaned, 1);
    assert_eq!(runtime.removed(), vec!["c1".to_string()]);
}

#[tokio::test]
async fn test_modify_record_retries_after_concurrent_write() {
    let registry = RacingRegistry::with_records([record("r1", "c1", ResourceHealth::Running)]);
    registry.race("r1", ResourceHealth::Lost);

    let modified = modify_record(&registry, "r1", |current| {
        current.map(|record| record.with_name("web"))
    })
    .await
    .unwrap()
    .unwrap();
    assert!(!modified.created);
    // the retry saw the concurrent health change and kept it
    assert_eq!(modified.record.health, ResourceHealth::Lost);
    assert_eq!(modified.record.name.as_deref(), Some("web"));
    assert_eq!(registry.health("r1").await, Some(ResourceHealth::Lost));
}

#[tokio::test]
async fn test_stale_conditional_write_is_rejected() {
    let registry = MemoryRegistry::with_records([record("r1", "c1", ResourceHealth::Running)]);
    let stale = registry.get("r1").await.unwrap().unwrap();

    let mut fresh = stale.clone().with_health(ResourceHealth::Deleted);
    fresh.touch();
    assert!(registry
        .replace_if_unchanged(fresh.clone(), Some(stale.updated_at))
        .await
        .unwrap());

    let mut lost = stale.clone().with_health(ResourceHealth::Lost);
    lost.touch();
    assert!(!registry
        .replace_if_unchanged(lost, Some(stale.updated_at))
        .await
        .unwrap());
    assert!(!registry
        .remove_if_unchanged("r1", stale.updated_at)
        .await
        .unwrap());
    assert!(!registry
        .replace_if_unchanged(record("r1", "c1", ResourceHealth::Running), None)
        .await
        .unwrap());
    assert_eq!(health(&registry, "r1").await, Some(ResourceHealth::Deleted));
}
