// Task store + lifecycle + CIDR target matching, and scanner registry +
// circuit breaker interplay, without requiring a live Redis connection
// (the queue and idempotency index are the only Redis-backed pieces and
// aren't exercised here).

use nessus_mcp::circuit_breaker::{CircuitBreakerRegistry, CircuitState};
use nessus_mcp::registry::config::{InstanceConfig, RegistryConfig};
use nessus_mcp::registry::ScannerRegistry;
use nessus_mcp::task::store::{TaskFilter, TaskStore, TaskUpdateFields};
use nessus_mcp::task::{ScanPayload, ScanType, Task, TaskStatus};

fn payload(targets: &str) -> ScanPayload {
    ScanPayload {
        targets: targets.to_string(),
        name: "integration".to_string(),
        description: String::new(),
        credentials: None,
        schema_profile: "brief".to_string(),
    }
}

fn mock_pool_config(pool: &str, ids: &[&str]) -> RegistryConfig {
    RegistryConfig {
        default_pool: pool.to_string(),
        instances: ids
            .iter()
            .map(|id| InstanceConfig {
                id: id.to_string(),
                pool: pool.to_string(),
                scanner_type: "mock".to_string(),
                enabled: true,
                nessus: None,
            })
            .collect(),
    }
}

#[tokio::test]
async fn cidr_target_survives_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path());

    let task = Task::new(
        "t1".to_string(),
        "trace-1".to_string(),
        ScanType::Untrusted,
        "default".to_string(),
        "mock".to_string(),
        None,
        payload("10.20.0.0/24"),
    );
    store.create(task).await.unwrap();

    store
        .update_status("t1", TaskStatus::Running, TaskUpdateFields::default())
        .await
        .unwrap();

    let mut fields = TaskUpdateFields::default();
    fields.upstream_scan_id = Some(42);
    let completed = store.update_status("t1", TaskStatus::Completed, fields).await.unwrap();
    assert_eq!(completed.upstream_scan_id, Some(42));

    // a host inside the /24 matches the stored CIDR target
    let found = store
        .list(
            TaskFilter {
                target: Some("10.20.0.55".to_string()),
                ..Default::default()
            },
            10,
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].status, TaskStatus::Completed);

    // a host outside the /24 does not
    let missing = store
        .list(
            TaskFilter {
                target: Some("10.20.1.55".to_string()),
                ..Default::default()
            },
            10,
        )
        .await
        .unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn cancel_is_legal_from_queued_but_not_from_terminal_states() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path());
    let task = Task::new(
        "t2".to_string(),
        "trace-2".to_string(),
        ScanType::Untrusted,
        "default".to_string(),
        "mock".to_string(),
        None,
        payload("192.0.2.1"),
    );
    store.create(task).await.unwrap();

    let cancelled = store
        .update_status("t2", TaskStatus::Cancelled, TaskUpdateFields::default())
        .await
        .unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);

    let err = store
        .update_status("t2", TaskStatus::Running, TaskUpdateFields::default())
        .await
        .unwrap_err();
    assert!(matches!(err, nessus_mcp::errors::TaskStoreError::Lifecycle(_)));
}

#[test]
fn registry_acquire_honors_least_loaded_and_circuit_breaker_is_per_instance() {
    let config = mock_pool_config("default", &["a", "b"]);
    let registry = ScannerRegistry::from_config(&config).unwrap();
    let breakers = CircuitBreakerRegistry::new();

    let (first_id, _) = registry.acquire_scanner("default", None).unwrap();
    let (second_id, _) = registry.acquire_scanner("default", None).unwrap();
    assert_ne!(first_id, second_id, "two concurrent acquires should spread across instances");

    registry.release_scanner("default", &first_id).unwrap();

    let breaker_a = breakers.get(&first_id);
    for _ in 0..5 {
        breaker_a.record_failure();
    }
    assert_eq!(breaker_a.state(), CircuitState::Open);

    // the other instance's breaker is unaffected
    let breaker_b = breakers.get(&second_id);
    assert_eq!(breaker_b.state(), CircuitState::Closed);
}

#[test]
fn reload_preserves_inflight_accounting_for_surviving_instances() {
    let config = mock_pool_config("default", &["a"]);
    let registry = ScannerRegistry::from_config(&config).unwrap();
    let (id, _) = registry.acquire_scanner("default", None).unwrap();

    let status_before = registry.get_pool_status("default").unwrap();
    assert_eq!(status_before.total_active_scans, 1);

    registry.reload(&config).unwrap();

    let status_after = registry.get_pool_status("default").unwrap();
    assert_eq!(status_after.total_active_scans, 1, "reload must not drop in-flight accounting");

    registry.release_scanner("default", &id).unwrap();
    let status_final = registry.get_pool_status("default").unwrap();
    assert_eq!(status_final.total_active_scans, 0);
}
