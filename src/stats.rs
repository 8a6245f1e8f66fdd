//! Statistics tracking for DNS proxy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::events::Category;

/// Atomic counters shared by every query task.
///
/// `total` is bumped when a query enters the pipeline and exactly one of the
/// outcome counters when it completes.
pub struct Stats {
    total: AtomicU64,
    blocked: AtomicU64,
    cached: AtomicU64,
    allowed: AtomicU64,
    failed: AtomicU64,
    /// Cumulative response time in microseconds for averaging.
    total_response_time_us: AtomicU64,
    started: Instant,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            cached: AtomicU64::new(0),
            allowed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn record_query(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, category: Category, elapsed: Duration) {
        let counter = match category {
            Category::Blocked => &self.blocked,
            Category::Cached => &self.cached,
            Category::Allowed => &self.allowed,
            Category::Error => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    pub fn cached_hits(&self) -> u64 {
        self.cached.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total = self.total();
        let blocked = self.blocked();
        let cached = self.cached_hits();
        let allowed = self.allowed.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let total_us = self.total_response_time_us.load(Ordering::Relaxed);

        let completed = blocked + cached + allowed + failed;
        let avg_response_ms = if completed > 0 {
            (total_us as f64 / completed as f64) / 1000.0
        } else {
            0.0
        };

        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            total,
            blocked,
            cached,
            allowed,
            failed,
            avg_response_ms,
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub total: u64,
    pub blocked: u64,
    pub cached: u64,
    pub allowed: u64,
    pub failed: u64,
    pub avg_response_ms: f64,
}

impl StatsSnapshot {
    /// Share of queries that were blocked, in percent.
    pub fn blocked_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.blocked as f64 / self.total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_are_counted_separately() {
        let stats = Stats::new();
        for category in [
            Category::Blocked,
            Category::Cached,
            Category::Cached,
            Category::Allowed,
            Category::Error,
        ] {
            stats.record_query();
            stats.record_outcome(category, Duration::from_millis(2));
        }

        let snapshot = stats.snapshot();

        assert_eq!(snapshot.total, 5);
        assert_eq!(snapshot.blocked, 1);
        assert_eq!(snapshot.cached, 2);
        assert_eq!(snapshot.allowed, 1);
        assert_eq!(snapshot.failed, 1);
        assert!((snapshot.avg_response_ms - 2.0).abs() < f64::EPSILON);
        assert!((snapshot.blocked_percent() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn empty_snapshot_has_no_average() {
        let snapshot = Stats::new().snapshot();

        assert_eq!(snapshot.total, 0);
        assert_eq!(snapshot.avg_response_ms, 0.0);
        assert_eq!(snapshot.blocked_percent(), 0.0);
    }
}
