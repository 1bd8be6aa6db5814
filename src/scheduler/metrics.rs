//! Scheduler counters and gauges
//!
//! Fire-and-forget observers; nothing in the scheduler reads them back.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Thread-safe scheduler metrics
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    schedule_loops: AtomicU64,
    auto_fetches: AtomicU64,
    manual_fetches: AtomicU64,
    errors: AtomicU64,
    known_repos: AtomicU64,
}

/// Plain copy of [`SchedulerMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Passes of the schedule loop
    pub schedule_loops: u64,
    /// Repos enqueued because they became due
    pub auto_fetches: u64,
    /// Repos enqueued through a manual one-shot update
    pub manual_fetches: u64,
    /// Failed update requests
    pub errors: u64,
    /// Repos known to the scheduler at the last sync
    pub known_repos: u64,
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_schedule_loops(&self) {
        self.schedule_loops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_auto_fetches(&self) {
        self.auto_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_manual_fetches(&self) {
        self.manual_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_known_repos(&self, known: usize) {
        self.known_repos.store(known as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            schedule_loops: self.schedule_loops.load(Ordering::Relaxed),
            auto_fetches: self.auto_fetches.load(Ordering::Relaxed),
            manual_fetches: self.manual_fetches.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            known_repos: self.known_repos.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = SchedulerMetrics::new();
        metrics.inc_schedule_loops();
        metrics.inc_auto_fetches();
        metrics.inc_auto_fetches();
        metrics.inc_manual_fetches();
        metrics.inc_errors();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.schedule_loops, 1);
        assert_eq!(snapshot.auto_fetches, 2);
        assert_eq!(snapshot.manual_fetches, 1);
        assert_eq!(snapshot.errors, 1);
    }

    #[test]
    fn test_known_repos_gauge_overwrites() {
        let metrics = SchedulerMetrics::new();
        metrics.set_known_repos(10);
        metrics.set_known_repos(3);
        assert_eq!(metrics.snapshot().known_repos, 3);
    }
}
