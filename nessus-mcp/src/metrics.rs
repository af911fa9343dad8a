// In-process counters (SPEC_FULL ambient stack section). No metrics crate is
// grounded in any candidate teacher, so this stays a handful of atomics
// behind a lazily-initialized static, exposed through `/metrics` as plain
// text rather than a Prometheus exposition format.

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;

pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::default);

#[derive(Default)]
pub struct Metrics {
    pub scans_submitted: AtomicU64,
    pub scans_completed: AtomicU64,
    pub scans_failed: AtomicU64,
    pub scans_timed_out: AtomicU64,
    pub scans_cancelled: AtomicU64,
    pub idempotent_replays: AtomicU64,
    pub idempotency_conflicts: AtomicU64,
    pub dead_lettered: AtomicU64,
    pub circuit_breaker_trips: AtomicU64,
}

impl Metrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render(&self) -> String {
        format!(
            "scans_submitted {}\nscans_completed {}\nscans_failed {}\nscans_timed_out {}\nscans_cancelled {}\nidempotent_replays {}\nidempotency_conflicts {}\ndead_lettered {}\ncircuit_breaker_trips {}\n",
            self.scans_submitted.load(Ordering::Relaxed),
            self.scans_completed.load(Ordering::Relaxed),
            self.scans_failed.load(Ordering::Relaxed),
            self.scans_timed_out.load(Ordering::Relaxed),
            self.scans_cancelled.load(Ordering::Relaxed),
            self.idempotent_replays.load(Ordering::Relaxed),
            self.idempotency_conflicts.load(Ordering::Relaxed),
            self.dead_lettered.load(Ordering::Relaxed),
            self.circuit_breaker_trips.load(Ordering::Relaxed),
        )
    }
}
