// Scanner capability interface.
//
// Every concrete scanner backend implements the same small set of verbs; the
// registry and worker only ever talk to this trait, never to a concrete
// backend directly.

pub mod mock;
pub mod nessus;

use std::path::Path;

use async_trait::async_trait;

use crate::errors::ScannerError;
use crate::task::ScanPayload;

/// Status of an in-progress or finished scan as reported by the backend,
/// normalized out of whatever vocabulary the native product uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Maps a backend-native status string onto the normalized vocabulary
///: `paused` counts as still running, any of
/// `stopped`/`canceled`/`aborted` counts as failed, anything empty or
/// `pending` counts as still queued.
pub fn map_native_status(raw: &str) -> ScanStatus {
    match raw {
        "completed" => ScanStatus::Completed,
        "running" | "paused" => ScanStatus::Running,
        "stopped" | "canceled" | "cancelled" | "aborted" | "import error" => ScanStatus::Failed,
        "pending" | "" | "empty" => ScanStatus::Queued,
        _ => ScanStatus::Queued,
    }
}

#[async_trait]
pub trait Scanner: Send + Sync {
    /// Create a scan definition on the backend for the given payload,
    /// returning the backend's scan identifier.
    async fn create_scan(&self, payload: &ScanPayload) -> Result<i64, ScannerError>;

    /// Launch a previously created scan.
    async fn launch_scan(&self, scan_id: i64) -> Result<(), ScannerError>;

    /// Poll the current status (and, where available, progress) of a
    /// launched scan.
    async fn get_status(&self, scan_id: i64) -> Result<(ScanStatus, Option<f32>), ScannerError>;

    /// Export the completed scan's native report into `dest`.
    async fn export_results(&self, scan_id: i64, dest: &Path) -> Result<(), ScannerError>;

    /// Request early termination of a running scan.
    async fn stop_scan(&self, scan_id: i64) -> Result<(), ScannerError>;

    /// Delete the scan definition on the backend once its artifact has been
    /// captured locally.
    async fn delete_scan(&self, scan_id: i64) -> Result<(), ScannerError>;

    /// Release any session/connection state held by this handle.
    async fn close(&self) -> Result<(), ScannerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paused_counts_as_running() {
        assert_eq!(map_native_status("paused"), ScanStatus::Running);
    }

    #[test]
    fn aborted_counts_as_failed() {
        assert_eq!(map_native_status("aborted"), ScanStatus::Failed);
    }

    #[test]
    fn empty_counts_as_queued() {
        assert_eq!(map_native_status(""), ScanStatus::Queued);
    }
}
