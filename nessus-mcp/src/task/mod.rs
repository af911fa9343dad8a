// Task module
//
// Defines the durable record of one scan request and the
// lifecycle state machine that governs how it may be mutated.

pub mod lifecycle;
pub mod store;

use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

pub use lifecycle::TaskStatus;

/// Kind of scan being requested. Drives credential requirements and the
/// validator's authentication verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    Untrusted,
    Authenticated,
    AuthenticatedPrivileged,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Untrusted => "untrusted",
            ScanType::Authenticated => "authenticated",
            ScanType::AuthenticatedPrivileged => "authenticated_privileged",
        }
    }

    pub fn requires_credentials(&self) -> bool {
        !matches!(self, ScanType::Untrusted)
    }
}

impl std::str::FromStr for ScanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "untrusted" => Ok(ScanType::Untrusted),
            "authenticated" => Ok(ScanType::Authenticated),
            "authenticated_privileged" => Ok(ScanType::AuthenticatedPrivileged),
            other => Err(format!("unknown scan type: {other}")),
        }
    }
}

/// The fixed escalation method enumeration a credential descriptor may name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EscalationMethod {
    Nothing,
    Sudo,
    Su,
    SuSudo,
    Pbrun,
    Dzdo,
    K5Login,
    CiscoEnable,
    CheckpointGaiaExpert,
}

impl EscalationMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "Nothing" => EscalationMethod::Nothing,
            "sudo" => EscalationMethod::Sudo,
            "su" => EscalationMethod::Su,
            "su+sudo" => EscalationMethod::SuSudo,
            "pbrun" => EscalationMethod::Pbrun,
            "dzdo" => EscalationMethod::Dzdo,
            ".k5login" => EscalationMethod::K5Login,
            "Cisco 'enable'" => EscalationMethod::CiscoEnable,
            "Checkpoint Gaia 'expert'" => EscalationMethod::CheckpointGaiaExpert,
            _ => return None,
        })
    }
}

/// Credential descriptor for authenticated scans. Validated immediately on
/// submission — a bad descriptor must never reach the scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub escalation_method: Option<String>,
}

impl CredentialDescriptor {
    /// Validate required fields and the escalation method enumeration.
    pub fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("credential descriptor missing 'username'".to_string());
        }
        if self.password.is_empty() {
            return Err("credential descriptor missing 'password'".to_string());
        }
        if let Some(method) = &self.escalation_method {
            if EscalationMethod::parse(method).is_none() {
                return Err(format!("invalid escalation_method: {method}"));
            }
        }
        Ok(())
    }
}

/// Opaque request payload: targets, human-readable name, description,
/// optional credential descriptor, schema profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPayload {
    pub targets: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub credentials: Option<CredentialDescriptor>,
    #[serde(default = "default_schema_profile")]
    pub schema_profile: String,
}

fn default_schema_profile() -> String {
    "brief".to_string()
}

/// Severity/auth-plugin/file-size statistics recorded by the validator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationStats {
    pub hosts_scanned: u64,
    pub total_plugins: u64,
    pub auth_plugins_found: u64,
    pub severity_counts: HashMap<String, u64>,
    pub total_vulnerabilities: u64,
    pub file_size_bytes: u64,
}

/// The validator's verdict on whether a credentialed scan actually
/// authenticated to its targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticationStatus {
    NotApplicable,
    Success,
    Partial,
    Failed,
    Unknown,
}

/// Durable record of one scan request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub trace_id: String,
    pub scan_type: ScanType,
    pub scanner_pool: String,
    pub scanner_type: String,
    #[serde(default)]
    pub scanner_instance_id: Option<String>,
    pub status: TaskStatus,
    pub payload: ScanPayload,
    #[serde(default)]
    pub upstream_scan_id: Option<i64>,
    pub created_at: SystemTime,
    #[serde(default)]
    pub started_at: Option<SystemTime>,
    #[serde(default)]
    pub completed_at: Option<SystemTime>,
    #[serde(default)]
    pub progress: Option<f32>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub validation_stats: Option<ValidationStats>,
    #[serde(default)]
    pub validation_warnings: Vec<String>,
    #[serde(default)]
    pub authentication_status: Option<AuthenticationStatus>,
}

impl Task {
    pub fn new(
        task_id: String,
        trace_id: String,
        scan_type: ScanType,
        scanner_pool: String,
        scanner_type: String,
        scanner_instance_id: Option<String>,
        payload: ScanPayload,
    ) -> Self {
        Self {
            task_id,
            trace_id,
            scan_type,
            scanner_pool,
            scanner_type,
            scanner_instance_id,
            status: TaskStatus::Queued,
            payload,
            upstream_scan_id: None,
            created_at: SystemTime::now(),
            started_at: None,
            completed_at: None,
            progress: Some(0.0),
            error_message: None,
            validation_stats: None,
            validation_warnings: Vec::new(),
            authentication_status: None,
        }
    }

    /// Whether an external housekeeping sweeper would be allowed to prune
    /// this task's directory (on-disk layout retention rule).
    /// Never true for `queued`/`running`.
    pub fn is_prunable(&self, now: SystemTime, completed_retention_days: u64, failed_retention_days: u64) -> bool {
        let Some(completed_at) = self.completed_at else {
            return false;
        };
        let retention_days = match self.status {
            TaskStatus::Completed => completed_retention_days,
            TaskStatus::Failed | TaskStatus::Timeout | TaskStatus::Cancelled => failed_retention_days,
            TaskStatus::Queued | TaskStatus::Running => return false,
        };
        let retention = std::time::Duration::from_secs(retention_days * 86_400);
        now.duration_since(completed_at).map(|age| age >= retention).unwrap_or(false)
    }
}
