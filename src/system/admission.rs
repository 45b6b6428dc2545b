//! Admission control (spec §4.7: `isOverloaded()`).
//!
//! There is no single implicit event loop in a multi-threaded Tokio
//! runtime, so "event-loop lag" is approximated by measuring how late a
//! periodic tick fires relative to its scheduled interval — a cheap,
//! runtime-agnostic proxy for scheduler contention.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Default `busyLagLimit`: 3s (spec §4.7). `<= 0` disables the check.
pub const DEFAULT_BUSY_LAG_LIMIT_MS: i64 = 3_000;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

/// Tracks scheduler lag and answers `is_overloaded()` against a
/// configured limit.
pub struct AdmissionGate {
    busy_lag_limit_ms: i64,
    observed_lag_ms: Arc<AtomicI64>,
}

impl AdmissionGate {
    pub fn new(busy_lag_limit_ms: i64) -> Arc<Self> {
        let gate = Arc::new(Self {
            busy_lag_limit_ms,
            observed_lag_ms: Arc::new(AtomicI64::new(0)),
        });
        if busy_lag_limit_ms > 0 {
            gate.clone().spawn_sampler();
        }
        gate
    }

    fn spawn_sampler(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut next_tick = Instant::now() + SAMPLE_INTERVAL;
            loop {
                tokio::time::sleep_until(next_tick).await;
                let lag = Instant::now().saturating_duration_since(next_tick);
                self.observed_lag_ms.store(lag.as_millis() as i64, Ordering::Relaxed);
                next_tick += SAMPLE_INTERVAL;
            }
        });
    }

    pub fn is_overloaded(&self) -> bool {
        self.busy_lag_limit_ms > 0 && self.observed_lag_ms.load(Ordering::Relaxed) >= self.busy_lag_limit_ms
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self {
            busy_lag_limit_ms: DEFAULT_BUSY_LAG_LIMIT_MS,
            observed_lag_ms: Arc::new(AtomicI64::new(0)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn disabled_gate_never_reports_overloaded() {
        let gate = AdmissionGate::new(0);
        assert!(!gate.is_overloaded());
    }

    #[tokio::test]
    async fn idle_runtime_is_not_overloaded() {
        let gate = AdmissionGate::new(DEFAULT_BUSY_LAG_LIMIT_MS);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!gate.is_overloaded());
    }
}
