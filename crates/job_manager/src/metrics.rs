//! In-process metrics counters (§15, "Metrics counters" — supplemented
//! ambient feature, not excluded by any §1 Non-goal). Mirrors the
//! reference control plane's single-struct-of-atomics design: plain
//! data, lock-free increments, one writer pattern per field.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Process-wide counters for the manager's two pollers and its worker
/// pool. Exposed as a plain struct rather than wired to an exporter: the
/// binary crate owns any Prometheus/OTel integration, the same split the
/// reference control plane draws between its metrics struct and its own
/// binaries.
#[derive(Default)]
pub struct Metrics {
    pub jobs_admitted: AtomicU64,
    pub jobs_launched: AtomicU64,
    pub jobs_succeeded: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_removed: AtomicU64,
    pub operations_dispatched: AtomicU64,
    pub operations_retried: AtomicU64,
    pub operations_superseded: AtomicU64,
    pub cache_poll_errors: AtomicU64,
    pub executor_poll_errors: AtomicU64,
    pub running_set_size: AtomicI64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_admitted: self.jobs_admitted.load(Ordering::Relaxed),
            jobs_launched: self.jobs_launched.load(Ordering::Relaxed),
            jobs_succeeded: self.jobs_succeeded.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            jobs_removed: self.jobs_removed.load(Ordering::Relaxed),
            operations_dispatched: self.operations_dispatched.load(Ordering::Relaxed),
            operations_retried: self.operations_retried.load(Ordering::Relaxed),
            operations_superseded: self.operations_superseded.load(Ordering::Relaxed),
            cache_poll_errors: self.cache_poll_errors.load(Ordering::Relaxed),
            executor_poll_errors: self.executor_poll_errors.load(Ordering::Relaxed),
            running_set_size: self.running_set_size.load(Ordering::Relaxed),
        }
    }
}

/// Immutable point-in-time read of [`Metrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub jobs_admitted: u64,
    pub jobs_launched: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_removed: u64,
    pub operations_dispatched: u64,
    pub operations_retried: u64,
    pub operations_superseded: u64,
    pub cache_poll_errors: u64,
    pub executor_poll_errors: u64,
    pub running_set_size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let metrics = Metrics::new();
        metrics.jobs_admitted.fetch_add(1, Ordering::Relaxed);
        metrics.operations_retried.fetch_add(2, Ordering::Relaxed);
        let snap = metrics.snapshot();
        assert_eq!(snap.jobs_admitted, 1);
        assert_eq!(snap.operations_retried, 2);
        assert_eq!(snap.jobs_failed, 0);
    }
}
