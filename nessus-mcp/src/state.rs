// Shared application state handed to every HTTP handler.

use std::sync::Arc;

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::config::Settings;
use crate::idempotency::IdempotencyIndex;
use crate::queue::ScanQueue;
use crate::registry::ScannerRegistry;
use crate::task::store::TaskStore;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: TaskStore,
    pub queue: ScanQueue,
    pub idempotency: IdempotencyIndex,
    pub registry: Arc<ScannerRegistry>,
    pub breakers: Arc<CircuitBreakerRegistry>,
}
