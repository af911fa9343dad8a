// nessus-mcp: a Model Context Protocol server mediating API clients and a
// pool of Nessus scanner instances.
//
// Submitted scans are durably queued, picked up by a bounded worker pool,
// run against whichever scanner instance the registry hands out, validated
// once exported, and made available through a paginated, filterable results
// API.

pub mod api;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod idempotency;
pub mod ip_match;
pub mod metrics;
pub mod parser;
pub mod queue;
pub mod registry;
pub mod scanner;
pub mod state;
pub mod task;
pub mod validator;
pub mod worker;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use redis::aio::ConnectionManager;

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::idempotency::IdempotencyIndex;
use crate::queue::ScanQueue;
use crate::registry::ScannerRegistry;
use crate::state::AppState;
use crate::task::store::TaskStore;
use crate::worker::{Worker, WorkerConfig};

/// Version of the MCP specification implemented by this server.
pub const MCP_VERSION: &str = "1.0.0";

/// Default server configuration constants.
pub mod defaults {
    pub const SERVER_PORT: u16 = 3010;
    pub const SERVER_HOST: &str = "127.0.0.1";
    pub const REQUEST_TIMEOUT_SECS: u64 = 60;
    pub const WORKERS: usize = 0;
}

/// Build application state and run both the worker pool and the HTTP server
/// until shutdown.
pub async fn start_server(config_path: Option<&str>) -> Result<()> {
    let settings = config::load_config(config_path).context("loading settings")?;

    let redis_client = redis::Client::open(settings.redis.url.clone()).context("constructing redis client")?;
    let conn = ConnectionManager::new(redis_client).await.context("connecting to redis")?;

    let pool_config = registry::config::load_from_path(std::path::Path::new(&settings.tasks.scanner_pool_config_path))
        .context("loading scanner pool config")?;
    let registry = Arc::new(ScannerRegistry::from_config(&pool_config).context("constructing scanner registry")?);
    let breakers = Arc::new(CircuitBreakerRegistry::new());

    let store = TaskStore::new(settings.tasks.data_root.clone());
    let pool_names = registry.list_pools();
    let queue = ScanQueue::new(conn.clone(), pool_names);
    let idempotency = IdempotencyIndex::new(conn);

    let state = AppState {
        settings: settings.clone(),
        store: store.clone(),
        queue: queue.clone(),
        idempotency,
        registry: registry.clone(),
        breakers: breakers.clone(),
    };

    let worker = Arc::new(Worker::new(
        store,
        queue,
        registry,
        breakers,
        WorkerConfig {
            concurrency: settings.tasks.worker_concurrency,
            poll_interval: std::time::Duration::from_secs(settings.tasks.poll_interval_secs),
            scan_timeout: std::time::Duration::from_secs(settings.tasks.scan_timeout_secs),
            shutdown_grace: std::time::Duration::from_secs(settings.tasks.shutdown_grace_secs),
        },
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    info!("starting nessus-mcp server version {MCP_VERSION}");
    let server_result = api::init_server(state).await;

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;

    server_result.context("running http server")
}

/// Gracefully shuts down the MCP server. Exposed for callers embedding the
/// server in a larger process that manages its own signal handling.
pub async fn shutdown_server() -> Result<(), Box<dyn std::error::Error>> {
    Ok(())
}
