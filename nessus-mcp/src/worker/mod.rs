// Scan worker.
//
// A bounded-concurrency pool of task processors pulling from the
// pool-partitioned queue: `queued -> running -> acquire scanner -> create ->
// launch -> poll until done or timeout -> export -> validate ->
// completed/failed -> release scanner`. Any uncaught error during processing
// dead-letters the task rather than losing it silently.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::{error, info, warn};
use tokio::sync::Semaphore;

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::metrics::METRICS;
use crate::parser::report;
use crate::queue::{QueueEntry, ScanQueue};
use crate::registry::ScannerRegistry;
use crate::scanner::ScanStatus;
use crate::task::lifecycle::TaskStatus;
use crate::task::store::{TaskStore, TaskUpdateFields};
use crate::task::ScanType;
use crate::validator;

pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub scan_timeout: Duration,
    pub shutdown_grace: Duration,
}

pub struct Worker {
    store: TaskStore,
    queue: ScanQueue,
    registry: Arc<ScannerRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        store: TaskStore,
        queue: ScanQueue,
        registry: Arc<ScannerRegistry>,
        breakers: Arc<CircuitBreakerRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self { store, queue, registry, breakers, config }
    }

    /// Run until `shutdown` fires. Dequeue loop stops accepting new work
    /// immediately; in-flight processors get up to `shutdown_grace` to
    /// finish before the loop returns regardless.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = tokio::task::JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = chrono::Utc::now().to_rfc3339();
            let next = tokio::select! {
                result = self.queue.dequeue_any(self.config.poll_interval, &now) => result,
                _ = shutdown.changed() => continue,
            };

            let next = match next {
                Ok(next) => next,
                Err(e) => {
                    error!("dequeue error: {e}");
                    tokio::time::sleep(self.config.poll_interval).await;
                    continue;
                }
            };

            // BRPOP's own timeout is the polling cadence; `None` just means
            // nothing arrived before the deadline.
            let Some((pool, entry)) = next else {
                continue;
            };

            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
            let worker = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                worker.process_task(&pool, entry).await;
            });
        }

        info!("worker shutting down, waiting up to {:?} for in-flight tasks", self.config.shutdown_grace);
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        let _ = tokio::time::timeout(self.config.shutdown_grace, drain).await;
    }

    async fn process_task(&self, pool: &str, entry: QueueEntry) {
        let task_id = entry.task_id.clone();
        if let Err(e) = self.process_task_inner(pool, &entry).await {
            error!("task {task_id} failed with uncaught error: {e}");
            let now = chrono::Utc::now().to_rfc3339();
            if let Err(queue_err) = self.queue.move_to_dlq(pool, &entry, &e, &now).await {
                error!("failed to dead-letter task {task_id}: {queue_err}");
            }
            METRICS.dead_lettered.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

            let mut fields = TaskUpdateFields::default();
            fields.error_message = Some(e);
            let _ = self.store.update_status(&task_id, TaskStatus::Failed, fields).await;
        }
    }

    async fn process_task_inner(&self, pool: &str, entry: &QueueEntry) -> Result<(), String> {
        let task_id = entry.task_id.as_str();
        let scan_type: ScanType = entry.scan_type.parse()?;

        self.store
            .update_status(task_id, TaskStatus::Running, TaskUpdateFields::default())
            .await
            .map_err(|e| e.to_string())?;

        let (instance_id, scanner) = self
            .registry
            .acquire_scanner(pool, entry.scanner_instance_id.as_deref())
            .map_err(|e| e.to_string())?;
        let breaker = self.breakers.get(&instance_id);

        let result = self.run_scan(task_id, &entry.payload, scan_type, &*scanner, &breaker).await;

        if let Err(e) = self.registry.release_scanner(pool, &instance_id) {
            warn!("releasing scanner {instance_id}: {e}");
        }

        result
    }

    async fn run_scan(
        &self,
        task_id: &str,
        payload: &crate::task::ScanPayload,
        scan_type: ScanType,
        scanner: &dyn crate::scanner::Scanner,
        breaker: &crate::circuit_breaker::CircuitBreaker,
    ) -> Result<(), String> {
        if !breaker.allow_request() {
            return Err("scanner circuit breaker is open".to_string());
        }

        let scan_id = match scanner.create_scan(payload).await {
            Ok(id) => {
                breaker.record_success();
                id
            }
            Err(e) => {
                breaker.record_failure();
                return Err(format!("create_scan: {e}"));
            }
        };

        let mut fields = TaskUpdateFields::default();
        fields.upstream_scan_id = Some(scan_id);
        self.store
            .update_status(task_id, TaskStatus::Running, fields)
            .await
            .map_err(|e| e.to_string())?;

        if !breaker.allow_request() {
            return Err("scanner circuit breaker is open".to_string());
        }
        if let Err(e) = scanner.launch_scan(scan_id).await {
            breaker.record_failure();
            return Err(format!("launch_scan: {e}"));
        }
        breaker.record_success();

        let deadline = SystemTime::now() + self.config.scan_timeout;
        loop {
            if SystemTime::now() >= deadline {
                let _ = scanner.stop_scan(scan_id).await;
                let mut fields = TaskUpdateFields::default();
                fields.error_message = Some("scan exceeded timeout".to_string());
                self.store
                    .update_status(task_id, TaskStatus::Timeout, fields)
                    .await
                    .map_err(|e| e.to_string())?;
                METRICS.scans_timed_out.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Ok(());
            }

            tokio::time::sleep(self.config.poll_interval).await;

            if !breaker.allow_request() {
                return Err("scanner circuit breaker is open".to_string());
            }
            let (status, progress) = match scanner.get_status(scan_id).await {
                Ok(v) => {
                    breaker.record_success();
                    v
                }
                Err(e) => {
                    breaker.record_failure();
                    return Err(format!("get_status: {e}"));
                }
            };

            if let Some(progress) = progress {
                let mut fields = TaskUpdateFields::default();
                fields.progress = Some(progress);
                let _ = self.store.update_status(task_id, TaskStatus::Running, fields).await;
            }

            match status {
                ScanStatus::Completed => break,
                ScanStatus::Failed => {
                    let mut fields = TaskUpdateFields::default();
                    fields.error_message = Some("scan backend reported failure".to_string());
                    self.store
                        .update_status(task_id, TaskStatus::Failed, fields)
                        .await
                        .map_err(|e| e.to_string())?;
                    METRICS.scans_failed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    return Ok(());
                }
                ScanStatus::Queued | ScanStatus::Running => continue,
            }
        }

        let artifact_path = self.store.artifact_path(task_id);
        if let Err(e) = scanner.export_results(scan_id, &artifact_path).await {
            return Err(format!("export_results: {e}"));
        }
        let _ = scanner.delete_scan(scan_id).await;

        let parsed = report::parse_file(&artifact_path).map_err(|e| e.to_string())?;
        let file_size = validator::check_file(&artifact_path)?;
        let outcome = validator::validate(&parsed, file_size, scan_type);

        let auth_failed = outcome.authentication_status == crate::task::AuthenticationStatus::Failed;

        let mut fields = TaskUpdateFields::default();
        fields.validation_stats = Some(outcome.stats.clone());
        fields.validation_warnings = Some(outcome.warnings.clone());
        fields.authentication_status = Some(outcome.authentication_status);

        if auth_failed {
            fields.error_message = Some(format!(
                "credentialed checks did not authenticate: {} auth-dependent plugins fired (need {})",
                outcome.stats.auth_plugins_found,
                crate::validator::MIN_AUTH_PLUGINS,
            ));
            self.store
                .update_status(task_id, TaskStatus::Failed, fields)
                .await
                .map_err(|e| e.to_string())?;
            METRICS.scans_failed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        } else {
            self.store
                .update_status(task_id, TaskStatus::Completed, fields)
                .await
                .map_err(|e| e.to_string())?;
            METRICS.scans_completed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }

        Ok(())
    }
}
