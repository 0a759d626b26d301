//! Metrics collection for cache engine operations.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// A latency measurement accumulated across many operations.
#[derive(Debug, Clone, Copy)]
pub struct LatencyMetric {
    /// Total time spent on operations (in nanoseconds).
    pub total_ns: u64,
    /// Number of operations measured.
    pub count: u64,
    /// Maximum observed latency (in nanoseconds).
    pub max_ns: u64,
}

impl LatencyMetric {
    /// Creates a new empty latency metric.
    pub fn new() -> Self {
        Self {
            total_ns: 0,
            count: 0,
            max_ns: 0,
        }
    }

    /// Returns the average latency in nanoseconds.
    pub fn average_ns(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ns as f64 / self.count as f64
        }
    }

    /// Returns the average latency as a Duration.
    pub fn average_duration(&self) -> Duration {
        if self.count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_ns / self.count)
        }
    }
}

impl Default for LatencyMetric {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks cache-wide counters and latency for the engine's operations,
/// including the coalescer, background refresher, and verification path.
#[derive(Debug, Default)]
pub struct Metrics {
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,

    total_bytes: AtomicUsize,
    entry_count: AtomicUsize,

    /// Callers that joined an in-progress load instead of running their
    /// own loader invocation.
    coalesced_joins: AtomicU64,
    /// Background refreshes scheduled for stale-while-revalidate.
    refreshes_scheduled: AtomicU64,
    /// Background refreshes that completed, successfully or not.
    refreshes_completed: AtomicU64,
    /// Sampled verifications scheduled.
    verifications_scheduled: AtomicU64,
    /// Verifications that found cached and fresh values disagreeing.
    verifications_stale: AtomicU64,

    get_latency: std::sync::Mutex<LatencyMetric>,
    set_latency: std::sync::Mutex<LatencyMetric>,
}

impl Metrics {
    /// Creates a new `Metrics` instance with all counters set to zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_insertion(&self) {
        self.insertions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_entry_size(&self, old_size: usize, new_size: usize) {
        if old_size > 0 {
            let _ = self.total_bytes.fetch_sub(old_size, Ordering::Relaxed);
        } else {
            let _ = self.entry_count.fetch_add(1, Ordering::Relaxed);
        }
        if new_size > 0 {
            let _ = self.total_bytes.fetch_add(new_size, Ordering::Relaxed);
        }
    }

    pub fn record_entry_removal(&self, size: usize) {
        if size > 0 {
            let _ = self.total_bytes.fetch_sub(size, Ordering::Relaxed);
        }
        let _ = self.entry_count.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_coalesced_join(&self) {
        self.coalesced_joins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_scheduled(&self) {
        self.refreshes_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_completed(&self) {
        self.refreshes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_verification_scheduled(&self) {
        self.verifications_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_verification_stale(&self) {
        self.verifications_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn begin_get_timing(&self) -> Instant {
        Instant::now()
    }

    pub fn record_get_latency(&self, start: Instant) {
        let nanos = start.elapsed().as_nanos() as u64;
        let mut get_latency = self.get_latency.lock().unwrap();
        get_latency.total_ns += nanos;
        get_latency.count += 1;
        if nanos > get_latency.max_ns {
            get_latency.max_ns = nanos;
        }
    }

    pub fn begin_set_timing(&self) -> Instant {
        Instant::now()
    }

    pub fn record_set_latency(&self, start: Instant) {
        let nanos = start.elapsed().as_nanos() as u64;
        let mut set_latency = self.set_latency.lock().unwrap();
        set_latency.total_ns += nanos;
        set_latency.count += 1;
        if nanos > set_latency.max_ns {
            set_latency.max_ns = nanos;
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn insertions(&self) -> u64 {
        self.insertions.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }

    pub fn coalesced_joins(&self) -> u64 {
        self.coalesced_joins.load(Ordering::Relaxed)
    }

    pub fn refreshes_scheduled(&self) -> u64 {
        self.refreshes_scheduled.load(Ordering::Relaxed)
    }

    pub fn refreshes_completed(&self) -> u64 {
        self.refreshes_completed.load(Ordering::Relaxed)
    }

    pub fn verifications_scheduled(&self) -> u64 {
        self.verifications_scheduled.load(Ordering::Relaxed)
    }

    pub fn verifications_stale(&self) -> u64 {
        self.verifications_stale.load(Ordering::Relaxed)
    }

    pub fn average_entry_size(&self) -> usize {
        let count = self.entry_count();
        let bytes = self.total_bytes();
        if count == 0 {
            0
        } else {
            bytes / count
        }
    }

    pub fn get_latency(&self) -> LatencyMetric {
        *self.get_latency.lock().unwrap()
    }

    pub fn set_latency(&self) -> LatencyMetric {
        *self.set_latency.lock().unwrap()
    }

    pub fn average_get_latency_ns(&self) -> f64 {
        self.get_latency.lock().unwrap().average_ns()
    }

    pub fn average_set_latency_ns(&self) -> f64 {
        self.set_latency.lock().unwrap().average_ns()
    }

    /// Returns the hit rate as a float between 0.0 and 1.0.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let misses = self.misses();
        if hits == 0 && misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        }
    }
}
