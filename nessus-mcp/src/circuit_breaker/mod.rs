// Per-scanner-instance circuit breaker.
//
// Guards every outbound call to a scanner instance. CLOSED lets calls
// through and counts consecutive failures; crossing `failure_threshold`
// trips to OPEN, which rejects calls outright until `recovery_timeout` has
// elapsed, then allows a limited number of HALF_OPEN probes before deciding
// whether to close again or re-open.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_HALF_OPEN_MAX_IN_FLIGHT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
}

/// A single instance's breaker. `failure_threshold`, `recovery_timeout`, and
/// `half_open_max_in_flight` are fixed at construction (defaults:
/// 5 / 30s / 1).
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_in_flight: u32,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_params(
            DEFAULT_FAILURE_THRESHOLD,
            DEFAULT_RECOVERY_TIMEOUT,
            DEFAULT_HALF_OPEN_MAX_IN_FLIGHT,
        )
    }

    pub fn with_params(failure_threshold: u32, recovery_timeout: Duration, half_open_max_in_flight: u32) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            half_open_max_in_flight,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_in_flight: 0,
            }),
        }
    }

    /// Whether a new call may proceed right now. Also performs the
    /// OPEN -> HALF_OPEN transition once `recovery_timeout` has elapsed, and
    /// reserves one of the limited half-open probe slots.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_in_flight = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.half_open_max_in_flight {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.consecutive_failures = self.failure_threshold;
            }
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.half_open_in_flight = 0;
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns one `CircuitBreaker` per scanner instance id, created lazily.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<String, std::sync::Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, instance_id: &str) -> std::sync::Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        breakers
            .entry(instance_id.to_string())
            .or_insert_with(|| std::sync::Arc::new(CircuitBreaker::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_open_after_threshold_failures() {
        let breaker = CircuitBreaker::with_params(3, Duration::from_secs(30), 1);
        for _ in 0..3 {
            assert!(breaker.allow_request());
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn half_open_probe_recovers_to_closed_on_success() {
        let breaker = CircuitBreaker::with_params(1, Duration::from_millis(0), 1);
        breaker.allow_request();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::with_params(1, Duration::from_millis(0), 1);
        breaker.allow_request();
        breaker.record_failure();
        assert!(breaker.allow_request());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
