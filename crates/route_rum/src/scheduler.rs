//! Delayed flush timer with forced-flush support.
//!
//! At most one timer is pending at a time. Each armed timer carries a
//! generation number and must [`claim`](FlushScheduler::claim) it before
//! doing any work, so a timer that was cancelled after it already woke up
//! still cannot fire.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{RumError, RumResult};

/// Default deferral between completion and synthesis.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug)]
struct PendingFlush {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Owns the (single) pending delayed-flush timer.
#[derive(Debug)]
pub struct FlushScheduler {
    delay: Duration,
    generation: u64,
    pending: Option<PendingFlush>,
}

impl Default for FlushScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

impl FlushScheduler {
    /// Create a scheduler deferring flushes by `delay`.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: 0,
            pending: None,
        }
    }

    /// The configured deferral.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether completion should flush synchronously.
    pub fn is_immediate(&self) -> bool {
        self.delay.is_zero()
    }

    /// Whether a timer is armed and has not fired or been cancelled.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Cancel any pending timer and arm a new one.
    ///
    /// `on_fire` runs on the tokio runtime after the delay with the timer's
    /// generation, which it must pass to [`claim`](Self::claim).
    pub fn arm<F>(&mut self, on_fire: F) -> RumResult<u64>
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.cancel();

        let runtime = Handle::try_current().map_err(|_| RumError::NoRuntime)?;
        self.generation += 1;
        let generation = self.generation;
        let delay = self.delay;

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(generation);
        });
        self.pending = Some(PendingFlush { generation, handle });

        tracing::trace!(
            target: "route_rum::scheduler",
            generation,
            delay_ms = delay.as_millis() as u64,
            "flush timer armed"
        );
        Ok(generation)
    }

    /// Cancel the pending timer. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.handle.abort();
                tracing::trace!(
                    target: "route_rum::scheduler",
                    generation = pending.generation,
                    "flush timer cancelled"
                );
                true
            }
            None => false,
        }
    }

    /// Called by a fired timer. Returns `true` only for the live generation.
    pub fn claim(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(pending) if pending.generation == generation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    type Fired = Arc<Mutex<Vec<u64>>>;

    fn arm_recording(scheduler: &Arc<Mutex<FlushScheduler>>, fired: &Fired) -> u64 {
        let weak = Arc::downgrade(scheduler);
        let fired = fired.clone();
        scheduler
            .lock()
            .unwrap()
            .arm(move |generation| {
                if let Some(scheduler) = weak.upgrade() {
                    if scheduler.lock().unwrap().claim(generation) {
                        fired.lock().unwrap().push(generation);
                    }
                }
            })
            .unwrap()
    }

    #[test]
    fn test_default_delay() {
        let scheduler = FlushScheduler::default();
        assert_eq!(scheduler.delay(), Duration::from_millis(2000));
        assert!(!scheduler.is_immediate());
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn test_zero_delay_is_immediate() {
        assert!(FlushScheduler::new(Duration::ZERO).is_immediate());
    }

    #[test]
    fn test_arm_without_runtime_fails() {
        let mut scheduler = FlushScheduler::default();
        let result = scheduler.arm(|_| {});
        assert!(matches!(result, Err(RumError::NoRuntime)));
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let scheduler = Arc::new(Mutex::new(FlushScheduler::new(Duration::from_millis(100))));
        let fired: Fired = Arc::default();

        let generation = arm_recording(&scheduler, &fired);
        assert!(scheduler.lock().unwrap().is_pending());

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(fired.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*fired.lock().unwrap(), vec![generation]);
        assert!(!scheduler.lock().unwrap().is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_pending_timer() {
        let scheduler = Arc::new(Mutex::new(FlushScheduler::new(Duration::from_millis(100))));
        let fired: Fired = Arc::default();

        let first = arm_recording(&scheduler, &fired);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = arm_recording(&scheduler, &fired);
        assert_ne!(first, second);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*fired.lock().unwrap(), vec![second]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let scheduler = Arc::new(Mutex::new(FlushScheduler::new(Duration::from_millis(10))));
        let fired: Fired = Arc::default();

        arm_recording(&scheduler, &fired);
        assert!(scheduler.lock().unwrap().cancel());
        assert!(!scheduler.lock().unwrap().cancel());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stale_generation_cannot_claim() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _guard = runtime.enter();

        let calls = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicU64::new(0));
        let mut scheduler = FlushScheduler::new(Duration::from_secs(60));

        let first = {
            let calls = calls.clone();
            scheduler.arm(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        }
        .unwrap();
        let second = {
            let last = last.clone();
            scheduler.arm(move |generation| last.store(generation, Ordering::SeqCst))
        }
        .unwrap();

        assert!(!scheduler.claim(first));
        assert!(scheduler.claim(second));
        assert!(!scheduler.claim(second));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
