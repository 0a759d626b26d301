//! Injectable clock source.
//!
//! All freshness comparisons go through a [`Clock`] rather than calling
//! `SystemTime::now()` directly, so scenario tests can advance "now"
//! deterministically instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of monotonic-ish wall-clock milliseconds.
///
/// The engine tolerates clock skew up to the shortest configured TTL; it
/// does not require a true monotonic clock, only one that does not run
/// backwards across the lifetime of a single entry in practice.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current time in milliseconds since an arbitrary origin.
    fn now_ms(&self) -> u64;
}

/// The default clock: wall-clock milliseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_millis() as u64
    }
}

/// A manually-advanced clock for deterministic tests of freshness
/// transitions, advanced explicitly instead of sleeping.
#[derive(Debug, Default)]
pub struct TestClock {
    now: AtomicU64,
}

impl TestClock {
    /// Creates a test clock starting at `t` = 0.
    pub fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
        }
    }

    /// Creates a test clock starting at the given time.
    pub fn at(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Advances the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time.
    pub fn set(&self, t_ms: u64) {
        self.now.store(t_ms, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_monotonically() {
        let clock = TestClock::new();
        assert_eq!(clock.now_ms(), 0);
        clock.advance(100);
        assert_eq!(clock.now_ms(), 100);
        clock.set(50);
        assert_eq!(clock.now_ms(), 50);
    }

    #[test]
    fn system_clock_is_nonzero_and_increasing() {
        let clock = SystemClock;
        let t0 = clock.now_ms();
        assert!(t0 > 0);
        let t1 = clock.now_ms();
        assert!(t1 >= t0);
    }
}
