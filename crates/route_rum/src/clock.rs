//! Wall-clock sources used to stamp lifecycle signals.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of epoch-millisecond timestamps.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> f64;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        let now = Utc::now();
        now.timestamp_millis() as f64 + f64::from(now.timestamp_subsec_micros() % 1000) / 1000.0
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a handle kept by a test or a
/// replay driver can advance the clock seen by an aggregator.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock frozen at `start_ms`.
    pub fn new(start_ms: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start_ms.to_bits())),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_ms: f64) {
        self.bits.store(now_ms.to_bits(), Ordering::SeqCst);
    }

    /// Move forward by `delta_ms`.
    pub fn advance(&self, delta_ms: f64) {
        let now = self.now_ms();
        self.set(now + delta_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_2020() {
        let now = SystemClock.now_ms();
        assert!(now > 1_577_836_800_000.0);
    }

    #[test]
    fn test_system_clock_monotonic_enough() {
        let a = SystemClock.now_ms();
        let b = SystemClock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::new(1000.0);
        assert_eq!(clock.now_ms(), 1000.0);

        clock.advance(40.5);
        assert_eq!(clock.now_ms(), 1040.5);

        clock.set(5.0);
        assert_eq!(clock.now_ms(), 5.0);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(0.0);
        let handle = clock.clone();

        handle.advance(250.0);
        assert_eq!(clock.now_ms(), 250.0);
    }
}
