//! Service metrics
//!
//! Lock-free counters updated by producers and by the worker, readable from
//! any thread through [`ServiceMetrics::snapshot`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one query service
#[derive(Debug)]
pub struct ServiceMetrics {
    // Admission
    pub units_enqueued: AtomicU64,
    pub admissions_dropped: AtomicU64,

    // Execution
    pub units_executed: AtomicU64,
    pub units_failed: AtomicU64,
    pub mutations_applied: AtomicU64,
    pub mutations_unresolved: AtomicU64,
    pub queries_evaluated: AtomicU64,
    pub results_interrupted: AtomicU64,

    // Planning
    pub index_lookups: AtomicU64,
    pub full_scans: AtomicU64,
    pub unresolved_terms: AtomicU64,

    pub start_time: DateTime<Utc>,
}

/// Point-in-time copy of [`ServiceMetrics`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub units_enqueued: u64,
    pub admissions_dropped: u64,
    pub units_executed: u64,
    pub units_failed: u64,
    pub mutations_applied: u64,
    pub mutations_unresolved: u64,
    pub queries_evaluated: u64,
    pub results_interrupted: u64,
    pub index_lookups: u64,
    pub full_scans: u64,
    pub unresolved_terms: u64,
    pub uptime_seconds: i64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            units_enqueued: AtomicU64::new(0),
            admissions_dropped: AtomicU64::new(0),
            units_executed: AtomicU64::new(0),
            units_failed: AtomicU64::new(0),
            mutations_applied: AtomicU64::new(0),
            mutations_unresolved: AtomicU64::new(0),
            queries_evaluated: AtomicU64::new(0),
            results_interrupted: AtomicU64::new(0),
            index_lookups: AtomicU64::new(0),
            full_scans: AtomicU64::new(0),
            unresolved_terms: AtomicU64::new(0),
            start_time: Utc::now(),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Units admitted but not yet executed
    pub fn queue_depth(&self) -> u64 {
        let enqueued = self.units_enqueued.load(Ordering::Relaxed);
        let executed = self.units_executed.load(Ordering::Relaxed);
        enqueued.saturating_sub(executed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            units_enqueued: self.units_enqueued.load(Ordering::Relaxed),
            admissions_dropped: self.admissions_dropped.load(Ordering::Relaxed),
            units_executed: self.units_executed.load(Ordering::Relaxed),
            units_failed: self.units_failed.load(Ordering::Relaxed),
            mutations_applied: self.mutations_applied.load(Ordering::Relaxed),
            mutations_unresolved: self.mutations_unresolved.load(Ordering::Relaxed),
            queries_evaluated: self.queries_evaluated.load(Ordering::Relaxed),
            results_interrupted: self.results_interrupted.load(Ordering::Relaxed),
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
            full_scans: self.full_scans.load(Ordering::Relaxed),
            unresolved_terms: self.unresolved_terms.load(Ordering::Relaxed),
            uptime_seconds: (Utc::now() - self.start_time).num_seconds(),
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSnapshot {
    /// Render as JSON for diagnostics endpoints
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_queue_depth() {
        let metrics = ServiceMetrics::new();
        ServiceMetrics::incr(&metrics.units_enqueued);
        ServiceMetrics::incr(&metrics.units_enqueued);
        ServiceMetrics::incr(&metrics.units_executed);
        ServiceMetrics::add(&metrics.index_lookups, 3);

        assert_eq!(metrics.queue_depth(), 1);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.units_enqueued, 2);
        assert_eq!(snapshot.index_lookups, 3);
        assert_eq!(snapshot.units_failed, 0);
    }

    #[test]
    fn test_snapshot_json() {
        let json = ServiceMetrics::new().snapshot().to_json().unwrap();
        assert!(json.contains("\"queries_evaluated\": 0"));
    }
}
