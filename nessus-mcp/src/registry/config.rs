// Scanner pool configuration format.
//
// YAML with `${VAR}` / `${VAR:-default}` environment interpolation applied
// to every string scalar before deserialization, so secrets never have to be
// committed to the pool file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::ServerError;
use crate::scanner::nessus::NessusConfig as RuntimeNessusConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NessusInstanceConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
}

fn default_true() -> bool {
    true
}

impl From<NessusInstanceConfig> for RuntimeNessusConfig {
    fn from(c: NessusInstanceConfig) -> Self {
        RuntimeNessusConfig {
            base_url: c.base_url,
            username: c.username,
            password: c.password,
            verify_tls: c.verify_tls,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceConfig {
    pub id: String,
    pub pool: String,
    pub scanner_type: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub nessus: Option<NessusInstanceConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    pub default_pool: String,
    pub instances: Vec<InstanceConfig>,
}

/// Load and interpolate a pool config file, resolving `${VAR}` against the
/// process environment and `${VAR:-default}` against an inline fallback.
pub fn load_from_str(raw: &str) -> Result<RegistryConfig, ServerError> {
    let interpolated = interpolate_env(raw, &std::env::vars().collect());
    serde_yaml::from_str(&interpolated).map_err(|e| ServerError::Config(format!("parsing scanner pool config: {e}")))
}

pub fn load_from_path(path: &std::path::Path) -> Result<RegistryConfig, ServerError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ServerError::Config(format!("reading scanner pool config {}: {e}", path.display())))?;
    load_from_str(&raw)
}

pub(crate) fn interpolate_env(raw: &str, env: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c == '$' && raw[i..].starts_with("${") {
            if let Some(end) = raw[i..].find('}') {
                let expr = &raw[i + 2..i + end];
                let resolved = resolve_expr(expr, env);
                out.push_str(&resolved);
                for _ in 0..end {
                    chars.next();
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn resolve_expr(expr: &str, env: &HashMap<String, String>) -> String {
    match expr.split_once(":-") {
        Some((var, default)) => env.get(var).cloned().unwrap_or_else(|| default.to_string()),
        None => env.get(expr).cloned().unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_set_variable() {
        let mut env = HashMap::new();
        env.insert("FOO".to_string(), "bar".to_string());
        assert_eq!(interpolate_env("value: ${FOO}", &env), "value: bar");
    }

    #[test]
    fn falls_back_to_default_when_unset() {
        let env = HashMap::new();
        assert_eq!(interpolate_env("value: ${FOO:-baz}", &env), "value: baz");
    }

    #[test]
    fn unset_without_default_becomes_empty() {
        let env = HashMap::new();
        assert_eq!(interpolate_env("value: ${FOO}", &env), "value: ");
    }

    #[test]
    fn parses_minimal_pool_config() {
        let yaml = r#"
default_pool: default
instances:
  - id: primary
    pool: default
    scanner_type: mock
"#;
        let cfg = load_from_str(yaml).unwrap();
        assert_eq!(cfg.default_pool, "default");
        assert_eq!(cfg.instances.len(), 1);
        assert!(cfg.instances[0].enabled);
    }
}
