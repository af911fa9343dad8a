// Idempotency index.
//
// Maps `idemp:{client_key}` to `{task_id, param_hash}` with a 48h TTL. The
// reservation is a compare-and-set implemented as a Lua script so the
// check-then-set is a single atomic round-trip against Redis, mirroring the
// Lua-script CAS pattern used for task persistence in comparable Rust MCP
// task stores.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};

use crate::errors::IdempotencyError;

const KEY_PREFIX: &str = "idemp";
const DEFAULT_TTL_SECS: i64 = 48 * 3600;

const RESERVE_SCRIPT: &str = r#"
local existing_task = redis.call('HGET', KEYS[1], 'task_id')
if not existing_task then
    redis.call('HSET', KEYS[1], 'task_id', ARGV[1], 'param_hash', ARGV[2])
    redis.call('EXPIRE', KEYS[1], ARGV[3])
    return {'stored', ARGV[1]}
end

local existing_hash = redis.call('HGET', KEYS[1], 'param_hash')
if existing_hash == ARGV[2] then
    return {'already_exists_same', existing_task}
end
return {'conflict', existing_task}
"#;

/// Outcome of `reserve`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Stored,
    AlreadyExistsSame { task_id: String },
    Conflict { task_id: String },
}

/// Outcome of the non-mutating `check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Miss,
    Hit { task_id: String },
    Conflict { task_id: String },
}

#[derive(Clone)]
pub struct IdempotencyIndex {
    conn: ConnectionManager,
    ttl_secs: i64,
}

impl IdempotencyIndex {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    fn key(client_key: &str) -> String {
        format!("{KEY_PREFIX}:{client_key}")
    }

    /// Atomic compare-and-set: `stored` if the key was free, `already_exists_same`
    /// if an identical request was already reserved, `conflict` if the key is
    /// held by a request with different canonical parameters.
    pub async fn reserve(
        &self,
        client_key: &str,
        task_id: &str,
        params: &serde_json::Value,
    ) -> Result<ReserveOutcome, IdempotencyError> {
        let hash = canonical_hash(params);
        let mut conn = self.conn.clone();
        let (tag, existing_task_id): (String, String) = redis::Script::new(RESERVE_SCRIPT)
            .key(Self::key(client_key))
            .arg(task_id)
            .arg(&hash)
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| IdempotencyError::Backend(e.to_string()))?;

        Ok(match tag.as_str() {
            "stored" => ReserveOutcome::Stored,
            "already_exists_same" => ReserveOutcome::AlreadyExistsSame {
                task_id: existing_task_id,
            },
            _ => ReserveOutcome::Conflict {
                task_id: existing_task_id,
            },
        })
    }

    /// Non-mutating lookup.
    pub async fn check(
        &self,
        client_key: &str,
        params: &serde_json::Value,
    ) -> Result<CheckOutcome, IdempotencyError> {
        let mut conn = self.conn.clone();
        let existing: Option<(String, String)> = {
            let key = Self::key(client_key);
            let task_id: Option<String> = conn
                .hget(&key, "task_id")
                .await
                .map_err(|e| IdempotencyError::Backend(e.to_string()))?;
            match task_id {
                None => None,
                Some(task_id) => {
                    let hash: String = conn
                        .hget(&key, "param_hash")
                        .await
                        .map_err(|e| IdempotencyError::Backend(e.to_string()))?;
                    Some((task_id, hash))
                }
            }
        };

        let Some((task_id, existing_hash)) = existing else {
            return Ok(CheckOutcome::Miss);
        };

        if existing_hash == canonical_hash(params) {
            Ok(CheckOutcome::Hit { task_id })
        } else {
            Ok(CheckOutcome::Conflict { task_id })
        }
    }
}

/// Canonicalization rule: sort keys lexicographically, render
/// `None`/missing as a single canonical sentinel, render booleans as
/// `true`/`false`, hash the UTF-8 byte stream with a fixed 256-bit hash.
pub fn canonical_hash(params: &serde_json::Value) -> String {
    let canonical = canonicalize(params);
    let bytes = serde_json::to_vec(&canonical).expect("canonical value always serializes");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

/// Canonical sentinel standing in for JSON `null` / an absent key, so a
/// request that omits an optional field hashes identically to one that sets
/// it explicitly to `null`.
fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::Null => Value::String("__none__".to_string()),
        Value::Bool(b) => Value::String(if *b { "true" } else { "false" }.to_string()),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), canonicalize(v));
            }
            let object: serde_json::Map<String, Value> = sorted.into_iter().collect();
            Value::Object(object)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_stable_under_key_permutation() {
        let a = json!({"targets": "1.2.3.4", "name": "s", "credentials": null});
        let b = json!({"credentials": null, "name": "s", "targets": "1.2.3.4"});
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn missing_key_hashes_like_explicit_null() {
        let a = json!({"targets": "1.2.3.4", "credentials": null});
        let b = json!({"targets": "1.2.3.4"});
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn different_params_hash_differently() {
        let a = json!({"targets": "1.2.3.4"});
        let b = json!({"targets": "1.2.3.5"});
        assert_ne!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn boolean_coercion_is_canonical() {
        let a = json!({"enabled": true});
        let b = json!({"enabled": true});
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }
}
