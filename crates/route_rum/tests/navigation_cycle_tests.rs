//! Integration tests for delayed flushing and cycle boundaries
//!
//! These tests drive an aggregator through realistic router sequences on a
//! paused tokio clock, checking that each navigation cycle produces at most
//! one record and that pending timers never fire after being superseded.

use route_rum::{
    Aggregator, CyclePhase, ManualClock, Navigation, NavigationSink, ResourceEntry, ResourceLog,
    ResourceTimingIndex, RumConfig, RumPayload,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const T0: f64 = 1_700_000_000_000.0;
const DELAY: Duration = Duration::from_millis(2000);

/// Sink collecting every record it receives
#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<Navigation>>,
}

impl NavigationSink for CollectingSink {
    fn navigated(&self, path: &str, rum: &RumPayload, resources: &[ResourceEntry]) {
        self.records.lock().unwrap().push(Navigation {
            path: path.to_string(),
            rum: *rum,
            resources: resources.to_vec(),
        });
    }
}

impl CollectingSink {
    fn paths(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|record| record.path.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn get(&self, index: usize) -> Navigation {
        self.records.lock().unwrap()[index].clone()
    }
}

/// Test harness wiring an aggregator to a manual clock and private log
struct Harness {
    clock: ManualClock,
    log: Arc<ResourceLog>,
    sink: Arc<CollectingSink>,
    aggregator: Aggregator,
}

impl Harness {
    fn new(delay: Duration) -> Self {
        init_tracing();

        let clock = ManualClock::new(T0);
        let log = Arc::new(ResourceLog::new(T0));
        let sink = Arc::new(CollectingSink::default());
        let aggregator = Aggregator::with_parts(
            RumConfig::new().with_delay(delay),
            sink.clone(),
            Arc::new(clock.clone()),
            ResourceTimingIndex::new(log.clone()),
        )
        .unwrap();

        Self {
            clock,
            log,
            sink,
            aggregator,
        }
    }

    /// Run a complete navigation, advancing the manual clock between signals
    fn navigate(&self, path: &str) {
        self.aggregator.start(path);
        self.clock.advance(5.0);
        self.aggregator.before_render();
        self.clock.advance(35.0);
        self.aggregator.after_render();
        self.clock.advance(1.0);
        self.aggregator.complete(path);
    }

    /// Record a resource relative to the log's origin
    fn load(&self, name: &str, start: f64, end: f64) {
        self.log
            .record(ResourceEntry::new(name, start - T0).with_response(end - T0 - 1.0, end - T0));
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test(start_paused = true)]
async fn test_delayed_flush_emits_after_delay() {
    let h = Harness::new(DELAY);
    h.navigate("/about");

    assert!(h.aggregator.is_pending());
    assert_eq!(h.aggregator.phase(), CyclePhase::Completed);
    assert_eq!(h.sink.len(), 0);

    tokio::time::sleep(DELAY - Duration::from_millis(1)).await;
    assert_eq!(h.sink.len(), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(h.sink.len(), 1);
    assert!(!h.aggregator.is_pending());
    assert_eq!(h.aggregator.phase(), CyclePhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_delayed_flush_captures_late_assets() {
    let h = Harness::new(DELAY);
    h.navigate("/gallery");

    // Finishes long after the router reported completion
    h.clock.advance(1_500.0);
    h.load("/img/hero.webp", T0 + 20.0, T0 + 1_300.0);

    tokio::time::sleep(DELAY * 2).await;

    let record = h.sink.get(0);
    assert_eq!(record.rum.load_event_end, T0 + 1_300.0);
    assert_eq!(record.resources.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_start_forces_pending_cycle_out() {
    let h = Harness::new(DELAY);
    h.navigate("/first");
    assert!(h.aggregator.is_pending());

    h.clock.advance(100.0);
    h.aggregator.start("/second");

    // Prior cycle delivered synchronously, its timer cancelled
    assert_eq!(h.sink.paths(), vec!["/first"]);
    assert!(!h.aggregator.is_pending());
    assert_eq!(h.aggregator.phase(), CyclePhase::Started);

    tokio::time::sleep(DELAY * 3).await;
    assert_eq!(h.sink.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_navigations_emit_once_each() {
    let h = Harness::new(DELAY);

    for path in ["/a", "/b", "/c"] {
        h.navigate(path);
        h.clock.advance(50.0);
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    tokio::time::sleep(DELAY * 2).await;

    assert_eq!(h.sink.paths(), vec!["/a", "/b", "/c"]);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_complete_rearms_timer() {
    let h = Harness::new(DELAY);
    h.navigate("/settings");

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    h.clock.advance(1_500.0);
    h.aggregator.complete("/settings");

    // The first timer would have fired here
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(h.sink.len(), 0);

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(h.sink.len(), 1);
    assert_eq!(h.sink.get(0).rum.load_event_end, T0 + 1_541.0);
}

#[tokio::test(start_paused = true)]
async fn test_page_unload_flushes_pending_cycle() {
    let h = Harness::new(DELAY);
    h.navigate("/checkout");

    h.aggregator.page_unload();
    assert_eq!(h.sink.len(), 1);
    assert!(!h.aggregator.is_pending());

    // Nothing left to flush
    h.aggregator.page_unload();
    tokio::time::sleep(DELAY * 2).await;
    assert_eq!(h.sink.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_teardown_flushes_pending_cycle() {
    let h = Harness::new(DELAY);
    h.navigate("/profile");

    let sink = h.sink.clone();
    drop(h);

    assert_eq!(sink.paths(), vec!["/profile"]);
    tokio::time::sleep(DELAY * 2).await;
    assert_eq!(sink.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_forced_flush_without_pending_or_data_is_noop() {
    let h = Harness::new(DELAY);

    h.aggregator.flush();
    h.aggregator.teardown();

    assert_eq!(h.sink.len(), 0);
    assert_eq!(h.aggregator.discarded(), 0);
    assert_eq!(h.aggregator.emitted(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_incomplete_cycle_discarded_after_delay() {
    let h = Harness::new(DELAY);
    h.aggregator.start("/oops");
    h.aggregator.before_render();
    h.aggregator.complete("/oops");

    tokio::time::sleep(DELAY * 2).await;
    assert_eq!(h.sink.len(), 0);
    assert_eq!(h.aggregator.discarded(), 1);
    assert_eq!(h.aggregator.phase(), CyclePhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_render_retry_storm() {
    let h = Harness::new(DELAY);
    h.aggregator.start("/flaky");
    h.clock.advance(5.0);

    for _ in 0..10 {
        h.aggregator.before_render();
        h.clock.advance(3.0);
        h.aggregator.after_render();
        h.clock.advance(2.0);
    }
    h.aggregator.complete("/flaky");
    tokio::time::sleep(DELAY * 2).await;

    let rum = h.sink.get(0).rum;
    assert_eq!(rum.dom_loading, T0 + 5.0);
    assert_eq!(rum.dom_interactive, T0 + 53.0);
    assert!(rum.dom_loading < rum.dom_interactive);
}
