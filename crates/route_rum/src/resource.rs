//! Resource timing entries and the shared buffered resource log.
//!
//! The log mirrors what a host performance capability keeps: a bounded,
//! process-wide buffer of sub-resource load timings, recorded relative to the
//! high-resolution clock. The engine reads it, clears it at the start of each
//! navigation cycle and may raise its capacity once.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::capability::{prefixed, CapabilityTable};
use crate::clock::{Clock, SystemClock};

/// Member names a performance host may expose (unprefixed spelling).
pub mod members {
    /// Epoch value of zero on the high-resolution clock.
    pub const TIME_ORIGIN: &str = "timeOrigin";
    /// Legacy navigation start, used when `timeOrigin` is missing.
    pub const NAVIGATION_START: &str = "navigationStart";
    /// Buffered entries of a given type.
    pub const GET_ENTRIES_BY_TYPE: &str = "getEntriesByType";
    /// Empties the resource buffer.
    pub const CLEAR_RESOURCE_TIMINGS: &str = "clearResourceTimings";
    /// Changes the resource buffer capacity.
    pub const SET_RESOURCE_TIMING_BUFFER_SIZE: &str = "setResourceTimingBufferSize";

    /// Every member, in declaration order.
    pub const ALL: [&str; 5] = [
        TIME_ORIGIN,
        NAVIGATION_START,
        GET_ENTRIES_BY_TYPE,
        CLEAR_RESOURCE_TIMINGS,
        SET_RESOURCE_TIMING_BUFFER_SIZE,
    ];
}

/// Entry type of sub-resource timings.
pub const RESOURCE_ENTRY_TYPE: &str = "resource";

/// Default capacity of the resource buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 250;

/// Timing information for one sub-resource fetch.
///
/// Time fields are milliseconds. Entries read from a host are relative to
/// the time origin; entries returned by the index are epoch milliseconds.
/// A value of `0.0` means the host did not expose that phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceEntry {
    pub name: String,
    pub entry_type: String,
    pub initiator_type: String,
    pub start_time: f64,
    pub duration: f64,
    pub redirect_start: f64,
    pub redirect_end: f64,
    pub fetch_start: f64,
    pub domain_lookup_start: f64,
    pub domain_lookup_end: f64,
    pub connect_start: f64,
    pub connect_end: f64,
    pub secure_connection_start: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub response_end: f64,
    pub transfer_size: u64,
    pub encoded_body_size: u64,
    pub decoded_body_size: u64,
}

impl Default for ResourceEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            entry_type: RESOURCE_ENTRY_TYPE.to_string(),
            initiator_type: "other".to_string(),
            start_time: 0.0,
            duration: 0.0,
            redirect_start: 0.0,
            redirect_end: 0.0,
            fetch_start: 0.0,
            domain_lookup_start: 0.0,
            domain_lookup_end: 0.0,
            connect_start: 0.0,
            connect_end: 0.0,
            secure_connection_start: 0.0,
            request_start: 0.0,
            response_start: 0.0,
            response_end: 0.0,
            transfer_size: 0,
            encoded_body_size: 0,
            decoded_body_size: 0,
        }
    }
}

impl ResourceEntry {
    /// Create an entry that starts fetching at `start_time`.
    pub fn new(name: &str, start_time: f64) -> Self {
        Self {
            name: name.to_string(),
            start_time,
            fetch_start: start_time,
            ..Default::default()
        }
    }

    /// Set the initiator type (`script`, `img`, `link`, ...).
    pub fn with_initiator(mut self, initiator_type: &str) -> Self {
        self.initiator_type = initiator_type.to_string();
        self
    }

    /// Set the response window; also updates `duration`.
    pub fn with_response(mut self, response_start: f64, response_end: f64) -> Self {
        self.response_start = response_start;
        self.response_end = response_end;
        self.duration = (response_end - self.start_time).max(0.0);
        self
    }

    /// Set the fetch start independently of `start_time` (redirects, caches).
    pub fn with_fetch_start(mut self, fetch_start: f64) -> Self {
        self.fetch_start = fetch_start;
        self
    }

    /// Shift every start/end/time field by `origin`.
    ///
    /// `start_time` and `fetch_start` are always reported, so zero there is
    /// the origin itself. The optional phases stay zero when the host did
    /// not expose them.
    pub fn normalized(mut self, origin: f64) -> Self {
        self.start_time += origin;
        self.fetch_start += origin;
        for field in [
            &mut self.redirect_start,
            &mut self.redirect_end,
            &mut self.domain_lookup_start,
            &mut self.domain_lookup_end,
            &mut self.connect_start,
            &mut self.connect_end,
            &mut self.secure_connection_start,
            &mut self.request_start,
            &mut self.response_start,
            &mut self.response_end,
        ] {
            if *field != 0.0 {
                *field += origin;
            }
        }
        self
    }

    /// Response start, or response end when the start was not exposed.
    pub fn response_marker(&self) -> f64 {
        if self.response_start != 0.0 {
            self.response_start
        } else {
            self.response_end
        }
    }
}

/// Inclusive window of epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Create a range; bounds are inclusive.
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Whether `at` lies within the range.
    pub fn contains(&self, at: f64) -> bool {
        at >= self.start && at <= self.end
    }
}

/// A host performance capability, addressed by member name.
///
/// Callers resolve the member spelling through
/// [`lookup`](crate::capability::lookup) first; implementations answer only
/// for names they expose.
pub trait PerformanceHost: CapabilityTable + Send + Sync {
    /// Read a numeric property.
    fn read_number(&self, member: &str) -> Option<f64>;

    /// Snapshot of buffered entries of `entry_type`.
    fn entries_by_type(&self, member: &str, entry_type: &str) -> Vec<ResourceEntry>;

    /// Empty the resource buffer.
    fn clear_resource_timings(&self, member: &str);

    /// Change the resource buffer capacity.
    fn set_resource_timing_buffer_size(&self, member: &str, size: usize);
}

#[derive(Debug)]
struct LogState {
    entries: Vec<ResourceEntry>,
    capacity: usize,
    dropped: u64,
}

/// In-process buffered resource log that behaves like a host capability.
#[derive(Debug)]
pub struct ResourceLog {
    vendor_prefix: Option<String>,
    time_origin: Option<f64>,
    navigation_start: Option<f64>,
    state: Mutex<LogState>,
}

/// Global resource log instance
static GLOBAL_RESOURCE_LOG: OnceLock<Arc<ResourceLog>> = OnceLock::new();

/// Get the process-wide resource log.
///
/// Its time origin is the wall-clock time of first access.
pub fn global_resource_log() -> Arc<ResourceLog> {
    GLOBAL_RESOURCE_LOG
        .get_or_init(|| Arc::new(ResourceLog::new(SystemClock.now_ms())))
        .clone()
}

impl ResourceLog {
    /// Create an empty log whose high-resolution clock starts at `time_origin`.
    pub fn new(time_origin: f64) -> Self {
        Self {
            vendor_prefix: None,
            time_origin: Some(time_origin),
            navigation_start: None,
            state: Mutex::new(LogState {
                entries: Vec::new(),
                capacity: DEFAULT_BUFFER_SIZE,
                dropped: 0,
            }),
        }
    }

    /// Create a log that only reports the legacy navigation start.
    pub fn legacy(navigation_start: f64) -> Self {
        Self {
            time_origin: None,
            navigation_start: Some(navigation_start),
            ..Self::new(0.0)
        }
    }

    /// Expose every member under a vendor prefix (`webkit`, `ms`, `moz`).
    pub fn with_vendor_prefix(mut self, prefix: &str) -> Self {
        self.vendor_prefix = Some(prefix.to_string());
        self
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The spelling under which `canonical` is exposed.
    pub fn member_name(&self, canonical: &str) -> String {
        match &self.vendor_prefix {
            Some(prefix) => prefixed(prefix, canonical),
            None => canonical.to_string(),
        }
    }

    /// Map an exposed spelling back to its canonical member.
    fn resolve(&self, member: &str) -> Option<&'static str> {
        members::ALL.into_iter().find(|canonical| {
            self.member_name(canonical) == member
                && match *canonical {
                    members::TIME_ORIGIN => self.time_origin.is_some(),
                    members::NAVIGATION_START => self.navigation_start.is_some(),
                    _ => true,
                }
        })
    }

    /// Record an entry; returns `false` when the buffer is full.
    pub fn record(&self, entry: ResourceEntry) -> bool {
        let mut state = self.lock();
        if state.entries.len() >= state.capacity {
            state.dropped += 1;
            tracing::trace!(
                target: "route_rum::resource",
                name = %entry.name,
                capacity = state.capacity,
                "resource buffer full, entry dropped"
            );
            return false;
        }
        state.entries.push(entry);
        true
    }

    /// Number of buffered entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Current buffer capacity.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Entries rejected because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

impl CapabilityTable for ResourceLog {
    fn has_member(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

impl PerformanceHost for ResourceLog {
    fn read_number(&self, member: &str) -> Option<f64> {
        match self.resolve(member)? {
            members::TIME_ORIGIN => self.time_origin,
            members::NAVIGATION_START => self.navigation_start,
            _ => None,
        }
    }

    fn entries_by_type(&self, member: &str, entry_type: &str) -> Vec<ResourceEntry> {
        if self.resolve(member) != Some(members::GET_ENTRIES_BY_TYPE) {
            return Vec::new();
        }
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.entry_type == entry_type)
            .cloned()
            .collect()
    }

    fn clear_resource_timings(&self, member: &str) {
        if self.resolve(member) == Some(members::CLEAR_RESOURCE_TIMINGS) {
            self.lock().entries.clear();
        }
    }

    fn set_resource_timing_buffer_size(&self, member: &str, size: usize) {
        if self.resolve(member) == Some(members::SET_RESOURCE_TIMING_BUFFER_SIZE) {
            let mut state = self.lock();
            state.capacity = size;
            // Hosts keep what is already buffered; only new entries are refused.
            tracing::debug!(
                target: "route_rum::resource",
                capacity = size,
                buffered = state.entries.len(),
                "resource buffer resized"
            );
        }
    }
}
