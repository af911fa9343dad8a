// In-memory mock scanner (registry fallback for operating without a
// reachable Nessus instance during development).
//
// Scans "complete" instantly: `get_status` always reports `completed` and
// `export_results` writes a small synthetic `.nessus` document so the parser
// and validator have something real to chew on end to end.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use crate::errors::ScannerError;
use crate::task::ScanPayload;

use super::{ScanStatus, Scanner};

pub struct MockScanner {
    next_id: AtomicI64,
}

impl MockScanner {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MockScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn synthetic_report(targets: &str) -> String {
    let host = targets.split(|c: char| c == ',' || c.is_whitespace()).next().unwrap_or("127.0.0.1");
    format!(
        r#"<?xml version="1.0" ?>
<NessusClientData_v2>
  <Report name="mock">
    <ReportHost name="{host}">
      <HostProperties>
        <tag name="host-ip">{host}</tag>
      </HostProperties>
      <ReportItem port="0" svc_name="general" protocol="tcp" severity="0" pluginID="19506" pluginName="Nessus Scan Information" pluginFamily="Settings">
        <plugin_output>Credentialed checks : yes</plugin_output>
      </ReportItem>
    </ReportHost>
  </Report>
</NessusClientData_v2>
"#
    )
}

#[async_trait]
impl Scanner for MockScanner {
    async fn create_scan(&self, _payload: &ScanPayload) -> Result<i64, ScannerError> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn launch_scan(&self, _scan_id: i64) -> Result<(), ScannerError> {
        Ok(())
    }

    async fn get_status(&self, _scan_id: i64) -> Result<(ScanStatus, Option<f32>), ScannerError> {
        Ok((ScanStatus::Completed, Some(100.0)))
    }

    async fn export_results(&self, _scan_id: i64, dest: &Path) -> Result<(), ScannerError> {
        tokio::fs::write(dest, synthetic_report("127.0.0.1"))
            .await
            .map_err(|e| ScannerError::Protocol(format!("writing mock artifact: {e}")))
    }

    async fn stop_scan(&self, _scan_id: i64) -> Result<(), ScannerError> {
        Ok(())
    }

    async fn delete_scan(&self, _scan_id: i64) -> Result<(), ScannerError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ScannerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_scan_allocates_increasing_ids() {
        let scanner = MockScanner::new();
        let payload = ScanPayload {
            targets: "10.0.0.1".to_string(),
            name: "t".to_string(),
            description: String::new(),
            credentials: None,
            schema_profile: "brief".to_string(),
        };
        let a = scanner.create_scan(&payload).await.unwrap();
        let b = scanner.create_scan(&payload).await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn status_is_always_completed() {
        let scanner = MockScanner::new();
        let (status, progress) = scanner.get_status(1).await.unwrap();
        assert_eq!(status, ScanStatus::Completed);
        assert_eq!(progress, Some(100.0));
    }
}
