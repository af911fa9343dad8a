// Settings module for configuration.
//
// YAML on disk, with `${VAR}` / `${VAR:-default}` environment interpolation
// applied the same way as the scanner pool config.

use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Server settings for the MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    pub request_timeout: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: crate::defaults::SERVER_HOST.to_string(),
            port: crate::defaults::SERVER_PORT,
            workers: num_cpus::get(),
            cors_enabled: false,
            cors_origins: vec!["*".to_string()],
            request_timeout: crate::defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Redis connection settings backing the queue and idempotency index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Task store and worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSettings {
    pub data_root: String,
    pub scanner_pool_config_path: String,
    pub poll_interval_secs: u64,
    pub scan_timeout_secs: u64,
    pub worker_concurrency: usize,
    pub shutdown_grace_secs: u64,
    pub completed_retention_days: u64,
    pub failed_retention_days: u64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            data_root: "./data/tasks".to_string(),
            scanner_pool_config_path: "./config/scanners.yaml".to_string(),
            poll_interval_secs: 30,
            scan_timeout_secs: 24 * 3600,
            worker_concurrency: 4,
            shutdown_grace_secs: 60,
            completed_retention_days: 30,
            failed_retention_days: 7,
        }
    }
}

/// Complete settings for the MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub environment: String,
    pub server: ServerSettings,
    pub redis: RedisSettings,
    pub tasks: TaskSettings,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerSettings::default(),
            redis: RedisSettings::default(),
            tasks: TaskSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

/// Load settings from a file, writing out defaults if it doesn't exist yet.
pub fn load(path: impl AsRef<Path>) -> Result<Settings> {
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => {
            let defaults = Settings::default();
            save(&defaults, &path)?;
            return Ok(defaults);
        }
    };

    let interpolated = crate::registry::config::interpolate_env(&raw, &std::env::vars().collect());
    let settings: Settings = serde_yaml::from_str(&interpolated)?;
    Ok(settings)
}

pub fn save(settings: &Settings, path: impl AsRef<Path>) -> Result<()> {
    let raw = serde_yaml::to_string(settings)?;
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, raw)?;
    Ok(())
}
