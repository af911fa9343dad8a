// Artifact validator.
//
// Runs once a scan artifact has been exported: confirms the file is present,
// non-trivial, and parseable, then derives an authentication verdict for
// credentialed scans from the "Credentialed checks" plugin output and how
// many of the well-known auth-dependent plugins actually fired.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;

use crate::parser::report::ParsedReport;
use crate::task::{AuthenticationStatus, ScanType, ValidationStats};

/// Plugin IDs that only produce meaningful output when credentialed checks
/// succeeded. Used alongside plugin 19506 to judge whether an authenticated
/// scan actually authenticated.
pub static AUTH_REQUIRED_PLUGINS: Lazy<HashSet<u64>> = Lazy::new(|| {
    [
        10736, // last system reboot
        12634, // authenticated check os name and installed package enumeration
        24269, // enumerate installed software (windows)
        26917, // microsoft windows sharing account information
        35705, // enumerate all smb shares
        56468, // time of last boot
        66334, // patch report
        70329, // hotfix check requires credentialed access
    ]
    .into_iter()
    .collect()
});

pub const MIN_AUTH_PLUGINS: usize = 5;
const CREDENTIALED_CHECKS_PLUGIN_ID: u64 = 19506;

#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub stats: ValidationStats,
    pub warnings: Vec<String>,
    pub authentication_status: AuthenticationStatus,
}

/// The textual verdict plugin 19506 ("Nessus Scan Information") reports for
/// `Credentialed checks : <value>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialedStatus {
    Yes,
    No,
    Partial,
}

/// Scan plugin 19506's output for a `Credentialed checks` line and parse its
/// value. Checked in `yes`/`no`/`partial` order, matching how the line reads.
fn parse_credentialed_status(plugin_output: &str) -> Option<CredentialedStatus> {
    for line in plugin_output.lines() {
        let line_lower = line.to_lowercase();
        if !line_lower.contains("credentialed checks") {
            continue;
        }
        if line_lower.contains("yes") {
            return Some(CredentialedStatus::Yes);
        } else if line_lower.contains("no") {
            return Some(CredentialedStatus::No);
        } else if line_lower.contains("partial") {
            return Some(CredentialedStatus::Partial);
        }
    }
    None
}

/// Confirm `path` exists and is non-empty; return its size or a descriptive
/// error otherwise.
pub fn check_file(path: &Path) -> Result<u64, String> {
    let metadata = std::fs::metadata(path).map_err(|e| format!("artifact missing: {e}"))?;
    if metadata.len() == 0 {
        return Err("artifact is empty".to_string());
    }
    Ok(metadata.len())
}

/// Run the full validation pipeline over an already-parsed report.
pub fn validate(report: &ParsedReport, file_size_bytes: u64, scan_type: ScanType) -> ValidationOutcome {
    let mut warnings = Vec::new();

    if report.hosts.is_empty() {
        warnings.push("report contains no hosts".to_string());
    }

    let mut severity_counts = std::collections::HashMap::new();
    let mut total_vulnerabilities = 0u64;
    let mut total_plugins = 0u64;
    let mut auth_plugins_found = 0u64;
    let mut credentialed_status = None;

    for host in &report.hosts {
        for item in &host.items {
            total_plugins += 1;
            if item.severity > 0 {
                total_vulnerabilities += 1;
            }
            *severity_counts.entry(item.severity.to_string()).or_insert(0u64) += 1;

            if AUTH_REQUIRED_PLUGINS.contains(&item.plugin_id) {
                auth_plugins_found += 1;
            }

            if item.plugin_id == CREDENTIALED_CHECKS_PLUGIN_ID {
                if let Some(status) = item.plugin_output.as_deref().and_then(parse_credentialed_status) {
                    credentialed_status = Some(status);
                }
            }
        }
    }

    let authentication_status = derive_authentication_status(
        scan_type,
        credentialed_status,
        auth_plugins_found as usize,
        report.hosts.len(),
    );

    if matches!(authentication_status, AuthenticationStatus::Failed | AuthenticationStatus::Partial) {
        warnings.push(format!(
            "authentication status is {:?}: plugin 19506 reported {:?}, {} of {} auth-dependent plugins fired (minimum {MIN_AUTH_PLUGINS})",
            authentication_status, credentialed_status, auth_plugins_found, report.hosts.len()
        ));
    }

    ValidationOutcome {
        stats: ValidationStats {
            hosts_scanned: report.hosts.len() as u64,
            total_plugins,
            auth_plugins_found,
            severity_counts,
            total_vulnerabilities,
            file_size_bytes,
        },
        warnings,
        authentication_status,
    }
}

/// Derive the authentication verdict as a priority chain, not a symmetric
/// matrix: the "Credentialed checks" plugin output, when present, always
/// wins outright (`yes`→success, `no`→failed, `partial`→partial). Plugin
/// count is only consulted as a fallback when plugin 19506 gave no textual
/// signal at all.
fn derive_authentication_status(
    scan_type: ScanType,
    credentialed_status: Option<CredentialedStatus>,
    auth_plugins_found: usize,
    hosts_scanned: usize,
) -> AuthenticationStatus {
    if !scan_type.requires_credentials() {
        return AuthenticationStatus::NotApplicable;
    }
    if hosts_scanned == 0 {
        return AuthenticationStatus::Unknown;
    }

    match credentialed_status {
        Some(CredentialedStatus::Yes) => AuthenticationStatus::Success,
        Some(CredentialedStatus::No) => AuthenticationStatus::Failed,
        Some(CredentialedStatus::Partial) => AuthenticationStatus::Partial,
        None if auth_plugins_found >= MIN_AUTH_PLUGINS => AuthenticationStatus::Success,
        None => AuthenticationStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::report::{ParsedHost, ParsedItem};

    fn host_with(plugin_ids: &[u64], credentialed_ok: bool) -> ParsedHost {
        host_with_status(plugin_ids, if credentialed_ok { "yes" } else { "no" })
    }

    fn host_with_status(plugin_ids: &[u64], status: &str) -> ParsedHost {
        let mut items: Vec<ParsedItem> = plugin_ids
            .iter()
            .map(|id| ParsedItem { plugin_id: *id, ..Default::default() })
            .collect();
        items.push(ParsedItem {
            plugin_id: CREDENTIALED_CHECKS_PLUGIN_ID,
            plugin_name: "Nessus Scan Information".to_string(),
            plugin_family: "Settings".to_string(),
            plugin_output: Some(format!("Credentialed checks : {status}")),
            ..Default::default()
        });
        ParsedHost {
            name: "10.0.0.1".to_string(),
            items,
        }
    }

    #[test]
    fn untrusted_is_never_evaluated() {
        let report = ParsedReport { hosts: vec![host_with(&[], false)] };
        let outcome = validate(&report, 100, ScanType::Untrusted);
        assert_eq!(outcome.authentication_status, AuthenticationStatus::NotApplicable);
    }

    #[test]
    fn full_signal_is_success() {
        let plugins: Vec<u64> = AUTH_REQUIRED_PLUGINS.iter().copied().take(MIN_AUTH_PLUGINS).collect();
        let report = ParsedReport { hosts: vec![host_with(&plugins, true)] };
        let outcome = validate(&report, 100, ScanType::Authenticated);
        assert_eq!(outcome.authentication_status, AuthenticationStatus::Success);
    }

    #[test]
    fn no_signal_is_failed() {
        let report = ParsedReport { hosts: vec![host_with(&[], false)] };
        let outcome = validate(&report, 100, ScanType::Authenticated);
        assert_eq!(outcome.authentication_status, AuthenticationStatus::Failed);
    }

    #[test]
    fn explicit_yes_wins_even_without_enough_plugins() {
        let report = ParsedReport { hosts: vec![host_with(&[], true)] };
        let outcome = validate(&report, 100, ScanType::AuthenticatedPrivileged);
        assert_eq!(outcome.authentication_status, AuthenticationStatus::Success);
    }

    #[test]
    fn explicit_partial_text_is_partial() {
        let report = ParsedReport { hosts: vec![host_with_status(&[], "partial")] };
        let outcome = validate(&report, 100, ScanType::Authenticated);
        assert_eq!(outcome.authentication_status, AuthenticationStatus::Partial);
    }

    #[test]
    fn explicit_no_outranks_plugin_count_inference() {
        let plugins: Vec<u64> = AUTH_REQUIRED_PLUGINS.iter().copied().take(MIN_AUTH_PLUGINS).collect();
        let report = ParsedReport { hosts: vec![host_with_status(&plugins, "no")] };
        let outcome = validate(&report, 100, ScanType::Authenticated);
        assert_eq!(outcome.authentication_status, AuthenticationStatus::Failed);
    }

    #[test]
    fn plugin_count_is_only_a_fallback_when_text_is_absent() {
        let plugins: Vec<u64> = AUTH_REQUIRED_PLUGINS.iter().copied().take(MIN_AUTH_PLUGINS).collect();
        let report = ParsedReport { hosts: vec![host_with_plugins_only(&plugins)] };
        let outcome = validate(&report, 100, ScanType::Authenticated);
        assert_eq!(outcome.authentication_status, AuthenticationStatus::Success);
    }

    fn host_with_plugins_only(plugin_ids: &[u64]) -> ParsedHost {
        let items: Vec<ParsedItem> = plugin_ids
            .iter()
            .map(|id| ParsedItem { plugin_id: *id, ..Default::default() })
            .collect();
        ParsedHost {
            name: "10.0.0.1".to_string(),
            items,
        }
    }
}
