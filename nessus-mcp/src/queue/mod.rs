// Pool-partitioned durable queue.
//
// Each scanner pool gets its own FIFO (`{pool}:queue`, a Redis list) and its
// own dead-letter sorted set (`{pool}:queue:dead`, scored by the time the
// entry was dead-lettered so `ListDLQ` can page oldest-first). Entries are
// JSON-encoded `QueueEntry` values carrying everything the worker needs to
// process the task without rereading the task store; an entry that fails to
// decode on dequeue is dead-lettered with reason `corrupted_payload` rather
// than dropped.
//
// Dequeues use `BRPOP`, Redis's blocking pop, rather than a bare `RPOP`
// wrapped in a sleep loop: an empty queue suspends the caller up to the
// supplied timeout instead of busy-polling, and `dequeue_any` lists every
// pool's key in one `BRPOP` call so Redis picks whichever has work first.
// The key order is rotated on every call so a consistently busy pool can't
// starve the others.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::errors::QueueError;
use crate::task::ScanPayload;

const DLQ_SUFFIX: &str = "queue:dead";
const QUEUE_SUFFIX: &str = "queue";

/// Self-sufficient unit of work: everything `Worker::process_task_inner`
/// needs to run a scan without a round trip back to the task store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub task_id: String,
    pub trace_id: String,
    pub scan_type: String,
    pub scanner_type: String,
    pub scanner_pool: String,
    #[serde(default)]
    pub scanner_instance_id: Option<String>,
    pub payload: ScanPayload,
    pub enqueued_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub task_id: String,
    pub reason: String,
    pub dead_lettered_at: String,
    /// The full envelope, when the failure happened after a successful
    /// dequeue. Absent when the dequeued payload itself was corrupted.
    #[serde(default)]
    pub entry: Option<QueueEntry>,
    #[serde(default)]
    pub raw_payload: Option<String>,
}

#[derive(Clone)]
pub struct ScanQueue {
    conn: ConnectionManager,
    pools: Vec<String>,
    cursor: Arc<AtomicUsize>,
}

impl ScanQueue {
    pub fn new(conn: ConnectionManager, pools: Vec<String>) -> Self {
        Self { conn, pools, cursor: Arc::new(AtomicUsize::new(0)) }
    }

    fn queue_key(pool: &str) -> String {
        format!("{pool}:{QUEUE_SUFFIX}")
    }

    fn dlq_key(pool: &str) -> String {
        format!("{pool}:{DLQ_SUFFIX}")
    }

    fn pool_from_queue_key(key: &str) -> String {
        key.strip_suffix(&format!(":{QUEUE_SUFFIX}")).unwrap_or(key).to_string()
    }

    /// Push `entry` onto `pool`'s queue, returning the queue depth
    /// immediately after the push (the entry's position from the back).
    pub async fn enqueue(&self, pool: &str, entry: &QueueEntry) -> Result<u64, QueueError> {
        let payload = serde_json::to_string(entry).map_err(|e| QueueError::Backend(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.lpush(Self::queue_key(pool), payload).await.map_err(|e| QueueError::Backend(e.to_string()))
    }

    /// Blocking pop of the oldest entry for one pool, waiting up to
    /// `timeout` for work to arrive. Corrupted payloads are moved to that
    /// pool's DLQ and the caller sees `None`, same as an empty queue.
    pub async fn dequeue(&self, pool: &str, timeout: Duration, now_rfc3339: &str) -> Result<Option<QueueEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn
            .brpop(Self::queue_key(pool), timeout.as_secs_f64())
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let Some((_, raw)) = popped else { return Ok(None) };
        self.decode_or_dead_letter(pool, raw, now_rfc3339).await
    }

    /// Blocking pop across every configured pool in one round trip. Redis
    /// evaluates the given key list in order and returns the first one with
    /// data, so the list is rotated by one position on each call to give
    /// every pool a turn at the front.
    pub async fn dequeue_any(&self, timeout: Duration, now_rfc3339: &str) -> Result<Option<(String, QueueEntry)>, QueueError> {
        if self.pools.is_empty() {
            return Ok(None);
        }

        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % self.pools.len();
        let keys: Vec<String> =
            (0..self.pools.len()).map(|i| Self::queue_key(&self.pools[(start + i) % self.pools.len()])).collect();

        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> =
            conn.brpop(keys, timeout.as_secs_f64()).await.map_err(|e| QueueError::Backend(e.to_string()))?;

        let Some((key, raw)) = popped else { return Ok(None) };
        let pool = Self::pool_from_queue_key(&key);
        let entry = self.decode_or_dead_letter(&pool, raw, now_rfc3339).await?;
        Ok(entry.map(|e| (pool, e)))
    }

    async fn decode_or_dead_letter(
        &self,
        pool: &str,
        raw: String,
        now_rfc3339: &str,
    ) -> Result<Option<QueueEntry>, QueueError> {
        match serde_json::from_str::<QueueEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(_) => {
                self.write_dlq_entry(
                    pool,
                    DeadLetterEntry {
                        task_id: String::new(),
                        reason: "corrupted_payload".to_string(),
                        dead_lettered_at: now_rfc3339.to_string(),
                        entry: None,
                        raw_payload: Some(raw),
                    },
                )
                .await?;
                Ok(None)
            }
        }
    }

    pub async fn peek(&self, pool: &str) -> Result<Option<QueueEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(Self::queue_key(pool), -1, -1)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(raw.into_iter().next().and_then(|raw| serde_json::from_str::<QueueEntry>(&raw).ok()))
    }

    pub async fn depth(&self, pool: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        conn.llen(Self::queue_key(pool))
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))
    }

    pub async fn dlq_depth(&self, pool: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        conn.zcard(Self::dlq_key(pool))
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))
    }

    /// Move a task already taken off the live queue to the DLQ (worker-side
    /// failure path; on uncaught processing errors). `entry` is the full
    /// envelope the worker dequeued, preserved so the task can be retried.
    pub async fn move_to_dlq(
        &self,
        pool: &str,
        entry: &QueueEntry,
        reason: &str,
        now_rfc3339: &str,
    ) -> Result<(), QueueError> {
        self.write_dlq_entry(
            pool,
            DeadLetterEntry {
                task_id: entry.task_id.clone(),
                reason: reason.to_string(),
                dead_lettered_at: now_rfc3339.to_string(),
                entry: Some(entry.clone()),
                raw_payload: None,
            },
        )
        .await
    }

    async fn write_dlq_entry(&self, pool: &str, entry: DeadLetterEntry) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&entry).map_err(|e| QueueError::Backend(e.to_string()))?;
        let score = chrono::Utc::now().timestamp() as f64;
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(Self::dlq_key(pool), payload, score)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))
    }

    /// List DLQ entries oldest-first, up to `limit`.
    pub async fn list_dlq(&self, pool: &str, limit: isize) -> Result<Vec<DeadLetterEntry>, QueueError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .zrange(Self::dlq_key(pool), 0, limit.saturating_sub(1))
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(raw
            .into_iter()
            .filter_map(|raw| serde_json::from_str::<DeadLetterEntry>(&raw).ok())
            .collect())
    }

    pub async fn get_dlq_entry(&self, pool: &str, task_id: &str) -> Result<Option<DeadLetterEntry>, QueueError> {
        Ok(self
            .list_dlq(pool, -1)
            .await?
            .into_iter()
            .find(|entry| entry.task_id == task_id))
    }

    /// Move a dead-lettered task back onto the live queue for reprocessing.
    /// Corrupted entries with no recoverable envelope can't be retried.
    pub async fn retry_dlq(&self, pool: &str, task_id: &str, now_rfc3339: &str) -> Result<bool, QueueError> {
        let entries = self.list_dlq(pool, -1).await?;
        let Some(dlq_entry) = entries.iter().find(|e| e.task_id == task_id) else {
            return Ok(false);
        };
        let Some(entry) = dlq_entry.entry.clone() else {
            return Err(QueueError::Backend(format!(
                "task '{task_id}' has no recoverable envelope (corrupted payload)"
            )));
        };

        let serialized = serde_json::to_string(dlq_entry).map_err(|e| QueueError::Backend(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.zrem::<_, _, ()>(Self::dlq_key(pool), serialized)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let mut retried = entry;
        retried.enqueued_at = now_rfc3339.to_string();
        self.enqueue(pool, &retried).await?;
        Ok(true)
    }

    pub async fn clear_dlq(&self, pool: &str) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let count = self.dlq_depth(pool).await?;
        conn.del::<_, ()>(Self::dlq_key(pool))
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(count)
    }

    pub fn pools(&self) -> &[String] {
        &self.pools
    }
}
