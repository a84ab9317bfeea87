//! Route-change timing aggregator.
//!
//! Reacts to router lifecycle signals, keeps one cycle of timestamps,
//! and hands exactly one [`RumPayload`] per completed cycle to the sink.
//!
//! # Cycle
//!
//! ```text
//! Idle -> start -> before_render* -> after_render* -> complete -> (delay) -> flush -> Idle
//! ```
//!
//! A `start` while a cycle is still open, a page unload or a teardown forces
//! the open cycle to flush immediately. Cycles missing a mandatory timestamp
//! are discarded without calling the sink.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::RumConfig;
use crate::error::RumResult;
use crate::index::ResourceTimingIndex;
use crate::payload::{page_bundle_pattern, synthesize, RumPayload};
use crate::resource::{ResourceEntry, TimeRange};
use crate::scheduler::FlushScheduler;
use crate::sink::NavigationSink;
use crate::store::{marks, path_details, CyclePhase, TimingStore};

/// A lifecycle signal delivered as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Route change to `path` started
    Start { path: String },
    /// View is about to render (repeats on render retries)
    BeforeRender,
    /// View finished rendering (may repeat)
    AfterRender,
    /// Route change to `path` completed
    Complete { path: String },
    /// The page is being unloaded
    Unload,
    /// The owning component is going away
    Teardown,
}

/// Handler taking a route path.
pub type PathHandler = Arc<dyn Fn(&str) + Send + Sync>;
/// Handler taking no arguments.
pub type SignalHandler = Arc<dyn Fn() + Send + Sync>;

/// The four handlers to subscribe to a router.
///
/// Bound once when the aggregator is built; every clone points at the same
/// closures, so the same references can be used to unsubscribe later.
/// Handlers become no-ops once the aggregator is dropped.
#[derive(Clone)]
pub struct RouteHandlers {
    pub start: PathHandler,
    pub before_render: SignalHandler,
    pub after_render: SignalHandler,
    pub complete: PathHandler,
}

impl fmt::Debug for RouteHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandlers").finish_non_exhaustive()
    }
}

impl RouteHandlers {
    fn bind(shared: &Arc<Shared>) -> Self {
        let start = {
            let weak = Arc::downgrade(shared);
            Arc::new(move |path: &str| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_start(path);
                }
            }) as PathHandler
        };
        let before_render = {
            let weak = Arc::downgrade(shared);
            Arc::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_before_render();
                }
            }) as SignalHandler
        };
        let after_render = {
            let weak = Arc::downgrade(shared);
            Arc::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_after_render();
                }
            }) as SignalHandler
        };
        let complete = {
            let weak = Arc::downgrade(shared);
            Arc::new(move |path: &str| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_complete(path);
                }
            }) as PathHandler
        };

        Self {
            start,
            before_render,
            after_render,
            complete,
        }
    }
}

/// A synthesized record waiting to be handed to the sink.
struct Emission {
    path: String,
    rum: RumPayload,
    resources: Vec<ResourceEntry>,
}

#[derive(Debug)]
struct CycleState {
    store: TimingStore,
    scheduler: FlushScheduler,
    cycle_id: Option<Uuid>,
}

struct Shared {
    config: RumConfig,
    clock: Arc<dyn Clock>,
    index: ResourceTimingIndex,
    sink: Arc<dyn NavigationSink>,
    state: Mutex<CycleState>,
    emitted: AtomicU64,
    discarded: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_start(&self, path: &str) {
        let prior = {
            let mut state = self.lock();
            let prior = self.force_locked(&mut state, "new cycle");

            if self.config.clear_resource_timings {
                self.index.clear();
            }
            let cycle_id = Uuid::new_v4();
            state.cycle_id = Some(cycle_id);
            state
                .store
                .set(marks::NAVIGATION_START, Some(path_details(path)));

            tracing::debug!(
                target: "route_rum::aggregator",
                %cycle_id,
                path,
                "navigation started"
            );
            prior
        };
        self.deliver(prior);
    }

    fn on_before_render(&self) {
        let mut state = self.lock();
        let recorded = state.store.set(marks::DOM_LOADING, None);
        tracing::trace!(
            target: "route_rum::aggregator",
            cycle_id = ?state.cycle_id,
            recorded,
            "before render"
        );
    }

    fn on_after_render(&self) {
        let mut state = self.lock();
        state.store.set(marks::DOM_INTERACTIVE, None);
        tracing::trace!(
            target: "route_rum::aggregator",
            cycle_id = ?state.cycle_id,
            "after render"
        );
    }

    fn on_complete(self: &Arc<Self>, path: &str) {
        let emission = {
            let mut state = self.lock();
            state
                .store
                .set(marks::LOAD_EVENT_END, Some(path_details(path)));

            if state.scheduler.is_immediate() {
                state.scheduler.cancel();
                self.flush_locked(&mut state, "completed")
            } else {
                let weak: Weak<Shared> = Arc::downgrade(self);
                let armed = state.scheduler.arm(move |generation| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_timer(generation);
                    }
                });
                match armed {
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!(
                            target: "route_rum::aggregator",
                            path,
                            error = %e,
                            "flush timer unavailable, flushing immediately"
                        );
                        self.flush_locked(&mut state, "completed")
                    }
                }
            }
        };
        self.deliver(emission);
    }

    fn on_timer(&self, generation: u64) {
        let emission = {
            let mut state = self.lock();
            if !state.scheduler.claim(generation) {
                return;
            }
            self.flush_locked(&mut state, "timer")
        };
        self.deliver(emission);
    }

    /// Forced flush: a no-op when nothing is pending or recorded.
    fn force_locked(&self, state: &mut CycleState, reason: &'static str) -> Option<Emission> {
        let was_pending = state.scheduler.cancel();
        if !was_pending && state.store.is_empty() {
            return None;
        }
        self.flush_locked(state, reason)
    }

    /// Synthesize the current cycle and reset the store.
    fn flush_locked(&self, state: &mut CycleState, reason: &'static str) -> Option<Emission> {
        let snapshot = state.store.snapshot();
        state.store.reset();
        let cycle_id = state.cycle_id.take();

        let resources = match snapshot.timestamp(marks::NAVIGATION_START) {
            Some(navigation_start) => self
                .index
                .entries(TimeRange::new(navigation_start, self.clock.now_ms())),
            None => Vec::new(),
        };

        let path = snapshot.path().unwrap_or_default().to_string();
        let bundle = match page_bundle_pattern(&path, &self.config.bundle_root) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::debug!(
                    target: "route_rum::aggregator",
                    path = %path,
                    error = %e,
                    "no page bundle pattern"
                );
                None
            }
        };

        match synthesize(&snapshot, &resources, bundle.as_ref()) {
            Some(rum) => {
                tracing::debug!(
                    target: "route_rum::aggregator",
                    cycle_id = ?cycle_id,
                    path = %path,
                    reason,
                    duration_ms = rum.duration(),
                    resources = resources.len(),
                    "navigation synthesized"
                );
                Some(Emission {
                    path,
                    rum,
                    resources,
                })
            }
            None => {
                self.discarded.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(
                    target: "route_rum::aggregator",
                    cycle_id = ?cycle_id,
                    path = %path,
                    reason,
                    "incomplete navigation discarded"
                );
                None
            }
        }
    }

    /// Hand a record to the sink. Must be called without the state lock.
    fn deliver(&self, emission: Option<Emission>) {
        if let Some(emission) = emission {
            self.emitted.fetch_add(1, Ordering::SeqCst);
            self.sink
                .navigated(&emission.path, &emission.rum, &emission.resources);
        }
    }

    fn force_flush(&self, reason: &'static str) {
        let emission = {
            let mut state = self.lock();
            self.force_locked(&mut state, reason)
        };
        self.deliver(emission);
    }
}

/// Collects router lifecycle signals into one navigation record per cycle.
pub struct Aggregator {
    shared: Arc<Shared>,
    handlers: RouteHandlers,
}

impl fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("config", &self.shared.config)
            .field("phase", &self.phase())
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl Aggregator {
    /// Create an aggregator over the system clock and the shared resource log.
    pub fn new(config: RumConfig, sink: impl NavigationSink + 'static) -> RumResult<Self> {
        Self::with_parts(
            config,
            Arc::new(sink),
            Arc::new(SystemClock),
            ResourceTimingIndex::global(),
        )
    }

    /// Create an aggregator from explicit collaborators.
    pub fn with_parts(
        config: RumConfig,
        sink: Arc<dyn NavigationSink>,
        clock: Arc<dyn Clock>,
        index: ResourceTimingIndex,
    ) -> RumResult<Self> {
        config.validate()?;

        if let Some(size) = config.resource_timing_buffer_size {
            if !index.set_buffer_size(size) {
                tracing::debug!(
                    target: "route_rum::aggregator",
                    size,
                    "resource timing buffer size not supported by host"
                );
            }
        }

        let state = CycleState {
            store: TimingStore::new(clock.clone()),
            scheduler: FlushScheduler::new(config.delay),
            cycle_id: None,
        };
        let shared = Arc::new(Shared {
            config,
            clock,
            index,
            sink,
            state: Mutex::new(state),
            emitted: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        });
        let handlers = RouteHandlers::bind(&shared);

        Ok(Self { shared, handlers })
    }

    /// The bound handlers for subscribing to a router.
    pub fn handlers(&self) -> &RouteHandlers {
        &self.handlers
    }

    /// A route change started.
    pub fn start(&self, path: &str) {
        self.shared.on_start(path);
    }

    /// The view is about to render.
    pub fn before_render(&self) {
        self.shared.on_before_render();
    }

    /// The view finished rendering.
    pub fn after_render(&self) {
        self.shared.on_after_render();
    }

    /// A route change completed.
    pub fn complete(&self, path: &str) {
        self.shared.on_complete(path);
    }

    /// Flush the open cycle now, cancelling any pending timer.
    pub fn flush(&self) {
        self.shared.force_flush("forced");
    }

    /// The page is unloading; flush what we have.
    pub fn page_unload(&self) {
        self.shared.force_flush("unload");
    }

    /// The owning component is going away; flush what we have.
    pub fn teardown(&self) {
        self.shared.force_flush("teardown");
    }

    /// Route a lifecycle event to its handler.
    pub fn dispatch(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Start { path } => self.start(&path),
            LifecycleEvent::BeforeRender => self.before_render(),
            LifecycleEvent::AfterRender => self.after_render(),
            LifecycleEvent::Complete { path } => self.complete(&path),
            LifecycleEvent::Unload => self.page_unload(),
            LifecycleEvent::Teardown => self.teardown(),
        }
    }

    /// Where the open cycle stands.
    pub fn phase(&self) -> CyclePhase {
        self.shared.lock().store.phase()
    }

    /// Whether a delayed flush is armed.
    pub fn is_pending(&self) -> bool {
        self.shared.lock().scheduler.is_pending()
    }

    /// Timestamp recorded for `mark` in the open cycle.
    pub fn timestamp(&self, mark: &str) -> Option<f64> {
        self.shared
            .lock()
            .store
            .get(mark)
            .map(|record| record.captured_at)
    }

    /// Records handed to the sink so far.
    pub fn emitted(&self) -> u64 {
        self.shared.emitted.load(Ordering::SeqCst)
    }

    /// Cycles discarded as incomplete so far.
    pub fn discarded(&self) -> u64 {
        self.shared.discarded.load(Ordering::SeqCst)
    }

    /// The active configuration.
    pub fn config(&self) -> &RumConfig {
        &self.shared.config
    }
}

impl Drop for Aggregator {
    fn drop(&mut self) {
        self.teardown();
    }
}
