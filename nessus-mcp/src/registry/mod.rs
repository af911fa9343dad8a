// Scanner registry.
//
// Owns every configured scanner instance, grouped into pools, and hands one
// out per task under a single mutex covering the select-and-account step so
// two concurrent acquires never pick the same least-loaded instance.

pub mod config;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::errors::RegistryError;
use crate::scanner::mock::MockScanner;
use crate::scanner::nessus::NessusScanner;
use crate::scanner::Scanner;

pub use config::{InstanceConfig, RegistryConfig};

struct InstanceState {
    config: InstanceConfig,
    scanner: Arc<dyn Scanner>,
    active_scans: u32,
    last_used: Instant,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct InstanceStatus {
    pub instance_id: String,
    pub scanner_type: String,
    pub enabled: bool,
    pub active_scans: u32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStatus {
    pub pool: String,
    pub instances: Vec<InstanceStatus>,
    pub total_active_scans: u32,
}

pub struct ScannerRegistry {
    pools: Mutex<HashMap<String, Vec<InstanceState>>>,
    default_pool: Mutex<String>,
}

impl ScannerRegistry {
    pub fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let mut pools: HashMap<String, Vec<InstanceState>> = HashMap::new();

        for instance in &config.instances {
            let scanner = build_scanner(instance)?;

            pools.entry(instance.pool.clone()).or_default().push(InstanceState {
                config: instance.clone(),
                scanner,
                active_scans: 0,
                last_used: Instant::now(),
            });
        }

        Ok(Self {
            pools: Mutex::new(pools),
            default_pool: Mutex::new(config.default_pool.clone()),
        })
    }

    pub fn list_pools(&self) -> Vec<String> {
        let mut pools: Vec<String> = self.pools.lock().keys().cloned().collect();
        pools.sort();
        pools
    }

    pub fn get_default_pool(&self) -> String {
        self.default_pool.lock().clone()
    }

    pub fn list_instances(&self, pool: &str) -> Result<Vec<InstanceStatus>, RegistryError> {
        let pools = self.pools.lock();
        let instances = pools.get(pool).ok_or_else(|| RegistryError::UnknownPool(pool.to_string()))?;
        Ok(instances
            .iter()
            .map(|i| InstanceStatus {
                instance_id: i.config.id.clone(),
                scanner_type: i.config.scanner_type.clone(),
                enabled: i.config.enabled,
                active_scans: i.active_scans,
            })
            .collect())
    }

    pub fn get_pool_status(&self, pool: &str) -> Result<PoolStatus, RegistryError> {
        let instances = self.list_instances(pool)?;
        let total_active_scans = instances.iter().map(|i| i.active_scans).sum();
        Ok(PoolStatus {
            pool: pool.to_string(),
            instances,
            total_active_scans,
        })
    }

    /// Select the enabled instance in `pool` with the fewest active scans,
    /// breaking ties by least-recently-used, and atomically account for the
    /// acquisition before releasing the lock. If `instance_id` is given, pin
    /// to that specific instance instead of running least-loaded selection.
    pub fn acquire_scanner(
        &self,
        pool: &str,
        instance_id: Option<&str>,
    ) -> Result<(String, Arc<dyn Scanner>), RegistryError> {
        let mut pools = self.pools.lock();
        let instances = pools.get_mut(pool).ok_or_else(|| RegistryError::UnknownPool(pool.to_string()))?;

        let chosen = match instance_id {
            Some(id) => {
                let instance = instances
                    .iter_mut()
                    .find(|i| i.config.id == id)
                    .ok_or_else(|| RegistryError::UnknownInstance(id.to_string(), pool.to_string()))?;
                if !instance.config.enabled {
                    return Err(RegistryError::InstanceDisabled(id.to_string(), pool.to_string()));
                }
                instance
            }
            None => instances
                .iter_mut()
                .filter(|i| i.config.enabled)
                .min_by(|a, b| a.active_scans.cmp(&b.active_scans).then(a.last_used.cmp(&b.last_used)))
                .ok_or_else(|| RegistryError::NoEnabledInstances(pool.to_string()))?,
        };

        chosen.active_scans += 1;
        chosen.last_used = Instant::now();
        Ok((chosen.config.id.clone(), chosen.scanner.clone()))
    }

    pub fn release_scanner(&self, pool: &str, instance_id: &str) -> Result<(), RegistryError> {
        let mut pools = self.pools.lock();
        let instances = pools.get_mut(pool).ok_or_else(|| RegistryError::UnknownPool(pool.to_string()))?;
        let instance = instances
            .iter_mut()
            .find(|i| i.config.id == instance_id)
            .ok_or_else(|| RegistryError::UnknownInstance(instance_id.to_string(), pool.to_string()))?;
        instance.active_scans = instance.active_scans.saturating_sub(1);
        Ok(())
    }

    /// Replace pool membership/enablement from freshly loaded config without
    /// dropping in-flight accounting for instances that still exist.
    pub fn reload(&self, config: &RegistryConfig) -> Result<(), RegistryError> {
        let mut pools = self.pools.lock();
        let mut rebuilt: HashMap<String, Vec<InstanceState>> = HashMap::new();

        for instance in &config.instances {
            let existing = pools
                .values_mut()
                .flat_map(|v| v.iter())
                .find(|i| i.config.id == instance.id);

            let (scanner, active_scans, last_used) = if let Some(existing) = existing {
                (existing.scanner.clone(), existing.active_scans, existing.last_used)
            } else {
                (build_scanner(instance)?, 0, Instant::now())
            };

            rebuilt.entry(instance.pool.clone()).or_default().push(InstanceState {
                config: instance.clone(),
                scanner,
                active_scans,
                last_used,
            });
        }

        *pools = rebuilt;
        *self.default_pool.lock() = config.default_pool.clone();
        Ok(())
    }
}

fn build_scanner(instance: &InstanceConfig) -> Result<Arc<dyn Scanner>, RegistryError> {
    Ok(match instance.scanner_type.as_str() {
        "nessus" => {
            let nessus_cfg = instance.nessus.clone().ok_or_else(|| {
                RegistryError::InvalidInstanceConfig(instance.id.clone(), "missing 'nessus' config block".to_string())
            })?;
            Arc::new(NessusScanner::new(nessus_cfg.into()).map_err(|e| {
                RegistryError::InvalidInstanceConfig(instance.id.clone(), e.to_string())
            })?)
        }
        "mock" => Arc::new(MockScanner::new()),
        other => {
            return Err(RegistryError::InvalidInstanceConfig(
                instance.id.clone(),
                format!("unknown scanner_type '{other}'"),
            ))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_config(pool: &str, ids: &[(&str, bool)]) -> RegistryConfig {
        RegistryConfig {
            default_pool: pool.to_string(),
            instances: ids
                .iter()
                .map(|(id, enabled)| InstanceConfig {
                    id: id.to_string(),
                    pool: pool.to_string(),
                    scanner_type: "mock".to_string(),
                    enabled: *enabled,
                    nessus: None,
                })
                .collect(),
        }
    }

    #[test]
    fn instance_id_override_pins_the_requested_instance() {
        let config = mock_config("default", &[("a", true), ("b", true)]);
        let registry = ScannerRegistry::from_config(&config).unwrap();

        let (id, _) = registry.acquire_scanner("default", Some("b")).unwrap();
        assert_eq!(id, "b");
    }

    #[test]
    fn instance_id_override_rejects_disabled_instance() {
        let config = mock_config("default", &[("a", false)]);
        let registry = ScannerRegistry::from_config(&config).unwrap();

        let err = registry.acquire_scanner("default", Some("a")).unwrap_err();
        assert!(matches!(err, RegistryError::InstanceDisabled(_, _)));
    }

    #[test]
    fn instance_id_override_rejects_unknown_instance() {
        let config = mock_config("default", &[("a", true)]);
        let registry = ScannerRegistry::from_config(&config).unwrap();

        let err = registry.acquire_scanner("default", Some("missing")).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownInstance(_, _)));
    }
}
