// Task store.
//
// Content-addressed per-task directory on local storage:
//
//   {data_root}/{task_id}/task.json          - serialized Task record
//   {data_root}/{task_id}/scan_native.nessus - artifact, written once
//
// Writes are whole-file atomic (write-to-temp-then-rename). Concurrent
// writers are serialized by reloading and re-validating the transition
// through the lifecycle machine before writing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::errors::TaskStoreError;
use crate::ip_match;
use crate::task::{Task, TaskStatus};

pub const ARTIFACT_FILE_NAME: &str = "scan_native.nessus";
const RECORD_FILE_NAME: &str = "task.json";

/// Composite filter applied by `List`.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub scanner_pool: Option<String>,
    pub scanner_type: Option<String>,
    pub target: Option<String>,
}

impl TaskFilter {
    fn matches(&self, task: &Task) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(pool) = &self.scanner_pool {
            if &task.scanner_pool != pool {
                return false;
            }
        }
        if let Some(scanner_type) = &self.scanner_type {
            if &task.scanner_type != scanner_type {
                return false;
            }
        }
        if let Some(target) = &self.target {
            if !ip_match::target_matches(target, &task.payload.targets) {
                return false;
            }
        }
        true
    }
}

/// Filesystem-backed task store. Cheap to clone; shares the same root path.
#[derive(Debug, Clone)]
pub struct TaskStore {
    data_root: Arc<PathBuf>,
}

impl TaskStore {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: Arc::new(data_root.into()),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    fn task_dir(&self, task_id: &str) -> PathBuf {
        self.data_root.join(task_id)
    }

    pub fn artifact_path(&self, task_id: &str) -> PathBuf {
        self.task_dir(task_id).join(ARTIFACT_FILE_NAME)
    }

    fn record_path(&self, task_id: &str) -> PathBuf {
        self.task_dir(task_id).join(RECORD_FILE_NAME)
    }

    /// Atomically materialize the directory and record. Fails if the task
    /// already exists.
    pub async fn create(&self, task: Task) -> Result<(), TaskStoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.create_blocking(task))
            .await
            .map_err(|e| TaskStoreError::Io(e.to_string()))?
    }

    fn create_blocking(&self, task: Task) -> Result<(), TaskStoreError> {
        let dir = self.task_dir(&task.task_id);
        if dir.exists() {
            return Err(TaskStoreError::AlreadyExists(task.task_id.clone()));
        }
        std::fs::create_dir_all(&dir).map_err(|e| TaskStoreError::Io(e.to_string()))?;
        self.write_record_blocking(&task)
    }

    fn write_record_blocking(&self, task: &Task) -> Result<(), TaskStoreError> {
        let dir = self.task_dir(&task.task_id);
        let final_path = self.record_path(&task.task_id);
        let tmp_path = dir.join(format!("{RECORD_FILE_NAME}.tmp"));
        let json = serde_json::to_vec_pretty(task).map_err(|e| TaskStoreError::Io(e.to_string()))?;
        std::fs::write(&tmp_path, json).map_err(|e| TaskStoreError::Io(e.to_string()))?;
        std::fs::rename(&tmp_path, &final_path).map_err(|e| TaskStoreError::Io(e.to_string()))?;
        Ok(())
    }

    /// Returns the record, or `not found`. Missing fields on older records
    /// default to absent via `serde`'s `#[serde(default)]` on `Task`.
    pub async fn get(&self, task_id: &str) -> Result<Task, TaskStoreError> {
        let store = self.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || store.get_blocking(&task_id))
            .await
            .map_err(|e| TaskStoreError::Io(e.to_string()))?
    }

    fn get_blocking(&self, task_id: &str) -> Result<Task, TaskStoreError> {
        let path = self.record_path(task_id);
        let bytes = std::fs::read(&path).map_err(|_| TaskStoreError::NotFound(task_id.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TaskStoreError::Io(e.to_string()))
    }

    /// Loads, validates the transition through the lifecycle machine, sets
    /// timestamps, merges additional fields, writes atomically.
    ///
    /// `started_at` is assigned on first entry into `running`; `completed_at`
    /// on any terminal. A losing writer (stale reload racing another update)
    /// surfaces the lifecycle machine's rejection, not a silent overwrite.
    pub async fn update_status(
        &self,
        task_id: &str,
        next: TaskStatus,
        fields: TaskUpdateFields,
    ) -> Result<Task, TaskStoreError> {
        let store = self.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || store.update_status_blocking(&task_id, next, fields))
            .await
            .map_err(|e| TaskStoreError::Io(e.to_string()))?
    }

    fn update_status_blocking(
        &self,
        task_id: &str,
        next: TaskStatus,
        fields: TaskUpdateFields,
    ) -> Result<Task, TaskStoreError> {
        let mut task = self.get_blocking(task_id)?;
        task.status = task.status.transition(next)?;

        if task.status == TaskStatus::Running && task.started_at.is_none() {
            task.started_at = Some(std::time::SystemTime::now());
        }
        if task.status.is_terminal() && task.completed_at.is_none() {
            task.completed_at = Some(std::time::SystemTime::now());
        }

        fields.apply(&mut task);

        if task.status.is_failure_terminal() && task.error_message.is_none() {
            return Err(TaskStoreError::Io(
                "error_message must be set on non-completed terminal transition".to_string(),
            ));
        }

        self.write_record_blocking(&task)?;
        Ok(task)
    }

    /// Writes the scan artifact exactly once. Called by the worker after
    /// `ExportResults` returns.
    pub async fn write_artifact(&self, task_id: &str, bytes: Vec<u8>) -> Result<(), TaskStoreError> {
        let store = self.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || {
            let path = store.artifact_path(&task_id);
            std::fs::write(path, bytes).map_err(|e| TaskStoreError::Io(e.to_string()))
        })
        .await
        .map_err(|e| TaskStoreError::Io(e.to_string()))?
    }

    /// Scans the directory, applying the composite filter.
    pub async fn list(&self, filter: TaskFilter, limit: usize) -> Result<Vec<Task>, TaskStoreError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.list_blocking(filter, limit))
            .await
            .map_err(|e| TaskStoreError::Io(e.to_string()))?
    }

    fn list_blocking(&self, filter: TaskFilter, limit: usize) -> Result<Vec<Task>, TaskStoreError> {
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(&*self.data_root) {
            Ok(entries) => entries,
            Err(_) => return Ok(out),
        };
        for entry in entries.flatten() {
            if out.len() >= limit {
                break;
            }
            let record = entry.path().join(RECORD_FILE_NAME);
            if !record.exists() {
                continue;
            }
            let Ok(bytes) = std::fs::read(&record) else { continue };
            let Ok(task) = serde_json::from_slice::<Task>(&bytes) else { continue };
            if filter.matches(&task) {
                out.push(task);
            }
        }
        Ok(out)
    }
}

/// Extra fields merged into a task record as part of an `UpdateStatus` call.
/// Only carries the fields the worker/validator actually set — everything
/// else is preserved from the existing record.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdateFields {
    pub upstream_scan_id: Option<i64>,
    pub progress: Option<f32>,
    pub error_message: Option<String>,
    pub validation_stats: Option<crate::task::ValidationStats>,
    pub validation_warnings: Option<Vec<String>>,
    pub authentication_status: Option<crate::task::AuthenticationStatus>,
    pub extra: HashMap<String, Value>,
}

impl TaskUpdateFields {
    fn apply(self, task: &mut Task) {
        if let Some(v) = self.upstream_scan_id {
            task.upstream_scan_id = Some(v);
        }
        if let Some(v) = self.progress {
            task.progress = Some(v);
        }
        if let Some(v) = self.error_message {
            task.error_message = Some(v);
        }
        if let Some(v) = self.validation_stats {
            task.validation_stats = Some(v);
        }
        if let Some(v) = self.validation_warnings {
            task.validation_warnings = v;
        }
        if let Some(v) = self.authentication_status {
            task.authentication_status = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{ScanPayload, ScanType};

    fn sample_task(id: &str, targets: &str) -> Task {
        Task::new(
            id.to_string(),
            "trace-1".to_string(),
            ScanType::Untrusted,
            "default".to_string(),
            "nessus".to_string(),
            None,
            ScanPayload {
                targets: targets.to_string(),
                name: "s1".to_string(),
                description: String::new(),
                credentials: None,
                schema_profile: "brief".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());
        let task = sample_task("t1", "192.168.1.1");
        store.create(task.clone()).await.unwrap();
        let fetched = store.get("t1").await.unwrap();
        assert_eq!(fetched.task_id, "t1");
        assert_eq!(fetched.status, TaskStatus::Queued);
    }

    #[tokio::test]
    async fn create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());
        store.create(sample_task("t1", "1.2.3.4")).await.unwrap();
        let err = store.create(sample_task("t1", "1.2.3.4")).await.unwrap_err();
        assert!(matches!(err, TaskStoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());
        store.create(sample_task("t1", "1.2.3.4")).await.unwrap();
        let err = store
            .update_status("t1", TaskStatus::Completed, TaskUpdateFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskStoreError::Lifecycle(_)));
    }

    #[tokio::test]
    async fn running_then_completed_sets_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());
        store.create(sample_task("t1", "1.2.3.4")).await.unwrap();
        let running = store
            .update_status("t1", TaskStatus::Running, TaskUpdateFields::default())
            .await
            .unwrap();
        assert!(running.started_at.is_some());
        let completed = store
            .update_status("t1", TaskStatus::Completed, TaskUpdateFields::default())
            .await
            .unwrap();
        assert!(completed.completed_at.is_some());
        assert!(completed.completed_at.unwrap() >= completed.started_at.unwrap());
    }

    #[tokio::test]
    async fn failed_terminal_requires_error_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());
        store.create(sample_task("t1", "1.2.3.4")).await.unwrap();
        store
            .update_status("t1", TaskStatus::Running, TaskUpdateFields::default())
            .await
            .unwrap();
        let err = store
            .update_status("t1", TaskStatus::Failed, TaskUpdateFields::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskStoreError::Io(_)));

        let mut fields = TaskUpdateFields::default();
        fields.error_message = Some("boom".to_string());
        let failed = store.update_status("t1", TaskStatus::Failed, fields).await.unwrap();
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn list_filters_by_cidr_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());
        store.create(sample_task("t1", "192.168.1.0/24")).await.unwrap();
        store.create(sample_task("t2", "10.0.0.50")).await.unwrap();

        let found = store
            .list(
                TaskFilter {
                    target: Some("192.168.1.100".to_string()),
                    ..Default::default()
                },
                10,
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].task_id, "t1");
    }
}
