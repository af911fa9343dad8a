// Nessus backend — the only scanner backend actually wired up; a second
// backend was named in the original system but never implemented there
// either, so it stays out of scope here too.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::errors::ScannerError;
use crate::task::{CredentialDescriptor, ScanPayload};

use super::{map_native_status, ScanStatus, Scanner};

/// Standard Nessus "advanced scan" template UUID, used for every scan this
/// backend creates.
const ADVANCED_SCAN_TEMPLATE_UUID: &str = "ad629e16-03b6-8c1d-cef6-ef8c9dd3c658d24bd260ef5f9e66";

/// Connection details for one Nessus instance, as loaded from the pool
/// config.
#[derive(Debug, Clone)]
pub struct NessusConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub verify_tls: bool,
}

pub struct NessusScanner {
    config: NessusConfig,
    client: reqwest::Client,
    session_token: Mutex<Option<String>>,
}

impl NessusScanner {
    pub fn new(config: NessusConfig) -> Result<Self, ScannerError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScannerError::Http(e.to_string()))?;
        Ok(Self {
            config,
            client,
            session_token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    /// Authenticate via `POST /session` and cache the returned token for
    /// subsequent calls. A cached token is reused until the backend rejects
    /// it (cheaper than re-authenticating on every call, matching the
    /// upstream client's own session-token caching).
    async fn session_token(&self) -> Result<String, ScannerError> {
        let mut cached = self.session_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let resp = self
            .client
            .post(self.url("/session"))
            .json(&json!({
                "username": self.config.username,
                "password": self.config.password,
            }))
            .send()
            .await
            .map_err(|e| ScannerError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ScannerError::Protocol(format!(
                "session authentication failed with status {}",
                resp.status()
            )));
        }

        #[derive(Deserialize)]
        struct SessionResponse {
            token: String,
        }
        let parsed: SessionResponse = resp.json().await.map_err(|e| ScannerError::Protocol(e.to_string()))?;
        *cached = Some(parsed.token.clone());
        Ok(parsed.token)
    }

    async fn auth_header(&self) -> Result<(String, String), ScannerError> {
        let token = self.session_token().await?;
        Ok(("X-Cookie".to_string(), format!("token={token}")))
    }

    fn credentials_block(credentials: &Option<CredentialDescriptor>) -> serde_json::Value {
        let Some(creds) = credentials else {
            return json!({});
        };
        json!({
            "add": {
                "Host": {
                    "SSH": [{
                        "auth_method": "password",
                        "username": creds.username,
                        "password": creds.password,
                        "elevate_privileges_with": creds.escalation_method.clone().unwrap_or_else(|| "Nothing".to_string()),
                    }]
                }
            }
        })
    }
}

#[derive(Deserialize)]
struct ScanCreateResponse {
    scan: ScanCreateScan,
}

#[derive(Deserialize)]
struct ScanCreateScan {
    id: i64,
}

#[derive(Deserialize)]
struct ScanDetailsResponse {
    info: ScanDetailsInfo,
}

#[derive(Deserialize)]
struct ScanDetailsInfo {
    #[serde(default)]
    status: String,
    #[serde(default)]
    progress: Option<f32>,
}

#[async_trait]
impl Scanner for NessusScanner {
    async fn create_scan(&self, payload: &ScanPayload) -> Result<i64, ScannerError> {
        let body = json!({
            "uuid": ADVANCED_SCAN_TEMPLATE_UUID,
            "settings": {
                "name": payload.name,
                "text_targets": payload.targets,
                "description": if payload.description.is_empty() { payload.name.clone() } else { payload.description.clone() },
                "enabled": true,
                "folder_id": 3,
                "scanner_id": 1,
            },
            "credentials": Self::credentials_block(&payload.credentials),
        });

        let (header_name, header_value) = self.auth_header().await?;
        let resp = self
            .client
            .post(self.url("/scans"))
            .header(header_name, header_value)
            .json(&body)
            .send()
            .await
            .map_err(|e| ScannerError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ScannerError::Protocol(format!(
                "create_scan failed with status {}",
                resp.status()
            )));
        }

        let parsed: ScanCreateResponse = resp
            .json()
            .await
            .map_err(|e| ScannerError::Protocol(e.to_string()))?;
        Ok(parsed.scan.id)
    }

    async fn launch_scan(&self, scan_id: i64) -> Result<(), ScannerError> {
        let (header_name, header_value) = self.auth_header().await?;
        let resp = self
            .client
            .post(self.url(&format!("/scans/{scan_id}/launch")))
            .header(header_name, header_value)
            .send()
            .await
            .map_err(|e| ScannerError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ScannerError::Protocol(format!(
                "launch_scan failed with status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn get_status(&self, scan_id: i64) -> Result<(ScanStatus, Option<f32>), ScannerError> {
        let (header_name, header_value) = self.auth_header().await?;
        let resp = self
            .client
            .get(self.url(&format!("/scans/{scan_id}")))
            .header(header_name, header_value)
            .send()
            .await
            .map_err(|e| ScannerError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ScannerError::Protocol(format!(
                "get_status failed with status {}",
                resp.status()
            )));
        }

        let parsed: ScanDetailsResponse = resp
            .json()
            .await
            .map_err(|e| ScannerError::Protocol(e.to_string()))?;
        Ok((map_native_status(&parsed.info.status), parsed.info.progress))
    }

    async fn export_results(&self, scan_id: i64, dest: &Path) -> Result<(), ScannerError> {
        let (header_name, header_value) = self.auth_header().await?;
        let export_resp = self
            .client
            .post(self.url(&format!("/scans/{scan_id}/export")))
            .header(header_name, header_value)
            .json(&json!({"format": "nessus"}))
            .send()
            .await
            .map_err(|e| ScannerError::Http(e.to_string()))?;

        if !export_resp.status().is_success() {
            return Err(ScannerError::Protocol(format!(
                "export request failed with status {}",
                export_resp.status()
            )));
        }

        #[derive(Deserialize)]
        struct ExportResponse {
            file: i64,
        }
        let export: ExportResponse = export_resp
            .json()
            .await
            .map_err(|e| ScannerError::Protocol(e.to_string()))?;

        self.wait_for_export_ready(scan_id, export.file).await?;

        let (header_name, header_value) = self.auth_header().await?;
        let download = self
            .client
            .get(self.url(&format!("/scans/{scan_id}/export/{}/download", export.file)))
            .header(header_name, header_value)
            .send()
            .await
            .map_err(|e| ScannerError::Http(e.to_string()))?;

        if !download.status().is_success() {
            return Err(ScannerError::Protocol(format!(
                "export download failed with status {}",
                download.status()
            )));
        }

        let bytes = download
            .bytes()
            .await
            .map_err(|e| ScannerError::Protocol(e.to_string()))?;
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ScannerError::Protocol(format!("writing artifact: {e}")))?;
        Ok(())
    }

    async fn stop_scan(&self, scan_id: i64) -> Result<(), ScannerError> {
        let (header_name, header_value) = self.auth_header().await?;
        let resp = self
            .client
            .post(self.url(&format!("/scans/{scan_id}/stop")))
            .header(header_name, header_value)
            .send()
            .await
            .map_err(|e| ScannerError::Http(e.to_string()))?;

        if !resp.status().is_success() && resp.status().as_u16() != 404 {
            return Err(ScannerError::Protocol(format!(
                "stop_scan failed with status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn delete_scan(&self, scan_id: i64) -> Result<(), ScannerError> {
        let (header_name, header_value) = self.auth_header().await?;
        let resp = self
            .client
            .delete(self.url(&format!("/scans/{scan_id}")))
            .header(header_name, header_value)
            .send()
            .await
            .map_err(|e| ScannerError::Http(e.to_string()))?;

        if !resp.status().is_success() && resp.status().as_u16() != 404 {
            return Err(ScannerError::Protocol(format!(
                "delete_scan failed with status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ScannerError> {
        Ok(())
    }
}

impl NessusScanner {
    async fn wait_for_export_ready(&self, scan_id: i64, file_id: i64) -> Result<(), ScannerError> {
        #[derive(Deserialize)]
        struct ExportStatus {
            status: String,
        }

        for _ in 0..60 {
            let (header_name, header_value) = self.auth_header().await?;
            let resp = self
                .client
                .get(self.url(&format!("/scans/{scan_id}/export/{file_id}/status")))
                .header(header_name, header_value)
                .send()
                .await
                .map_err(|e| ScannerError::Http(e.to_string()))?;

            let parsed: ExportStatus = resp
                .json()
                .await
                .map_err(|e| ScannerError::Protocol(e.to_string()))?;

            if parsed.status == "ready" {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }

        Err(ScannerError::Protocol(
            "export did not become ready in time".to_string(),
        ))
    }
}
