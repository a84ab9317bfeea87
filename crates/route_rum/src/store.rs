//! Per-cycle storage of named lifecycle timestamps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;

/// Names under which lifecycle signals are recorded.
pub mod marks {
    /// Route change started.
    pub const NAVIGATION_START: &str = "navigationStart";
    /// First "about to render" of the cycle.
    pub const DOM_LOADING: &str = "domLoading";
    /// Latest "rendered" of the cycle.
    pub const DOM_INTERACTIVE: &str = "domInteractive";
    /// Route change completed.
    pub const LOAD_EVENT_END: &str = "loadEventEnd";
}

/// Extra field carrying the route path.
pub const PATH_FIELD: &str = "path";

/// A captured timestamp plus free-form details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    /// Epoch milliseconds at which the signal was seen
    pub captured_at: f64,
    /// Details supplied with the signal
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TimingRecord {
    /// Create a record with no details.
    pub fn new(captured_at: f64) -> Self {
        Self {
            captured_at,
            extra: Map::new(),
        }
    }

    /// The route path, when one was supplied.
    pub fn path(&self) -> Option<&str> {
        self.extra.get(PATH_FIELD).and_then(Value::as_str)
    }
}

/// Build the details map for a signal carrying a route path.
pub fn path_details(path: &str) -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert(PATH_FIELD.to_string(), Value::String(path.to_string()));
    extra
}

/// Where the current cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CyclePhase {
    /// Nothing recorded
    #[default]
    Idle,
    /// Navigation start seen
    Started,
    /// Render in progress (may repeat)
    Rendering,
    /// Render finished (may repeat)
    Rendered,
    /// Completion seen, awaiting flush
    Completed,
}

/// Owned copy of the store, handed to the payload synthesizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingSnapshot {
    records: HashMap<String, TimingRecord>,
}

impl TimingSnapshot {
    /// Build a snapshot from explicit timestamps.
    pub fn from_timestamps<'a>(timestamps: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self {
            records: timestamps
                .into_iter()
                .map(|(name, at)| (name.to_string(), TimingRecord::new(at)))
                .collect(),
        }
    }

    /// Insert or replace a record.
    pub fn insert(&mut self, name: &str, record: TimingRecord) {
        self.records.insert(name.to_string(), record);
    }

    /// Look up a record.
    pub fn get(&self, name: &str) -> Option<&TimingRecord> {
        self.records.get(name)
    }

    /// Timestamp of a record.
    pub fn timestamp(&self, name: &str) -> Option<f64> {
        self.get(name).map(|record| record.captured_at)
    }

    /// Route path of the cycle: the completion path, else the start path.
    pub fn path(&self) -> Option<&str> {
        [marks::LOAD_EVENT_END, marks::NAVIGATION_START]
            .into_iter()
            .find_map(|name| self.get(name).and_then(TimingRecord::path))
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Mapping from signal name to its latest [`TimingRecord`].
pub struct TimingStore {
    clock: Arc<dyn Clock>,
    records: HashMap<String, TimingRecord>,
    phase: CyclePhase,
}

impl std::fmt::Debug for TimingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingStore")
            .field("records", &self.records)
            .field("phase", &self.phase)
            .finish()
    }
}

impl TimingStore {
    /// Create an empty store stamping records with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            records: HashMap::new(),
            phase: CyclePhase::Idle,
        }
    }

    /// Stamp `name` with the current time.
    ///
    /// `domLoading` keeps its first value for the rest of the cycle; every
    /// other name is overwritten. Returns whether a value was written.
    pub fn set(&mut self, name: &str, extra: Option<Map<String, Value>>) -> bool {
        self.advance_phase(name);

        if name == marks::DOM_LOADING && self.records.contains_key(name) {
            return false;
        }

        let record = TimingRecord {
            captured_at: self.clock.now_ms(),
            extra: extra.unwrap_or_default(),
        };
        self.records.insert(name.to_string(), record);
        true
    }

    fn advance_phase(&mut self, name: &str) {
        self.phase = match name {
            marks::NAVIGATION_START => CyclePhase::Started,
            marks::DOM_LOADING => CyclePhase::Rendering,
            marks::DOM_INTERACTIVE => CyclePhase::Rendered,
            marks::LOAD_EVENT_END => CyclePhase::Completed,
            _ => self.phase,
        };
    }

    /// Look up a record.
    pub fn get(&self, name: &str) -> Option<&TimingRecord> {
        self.records.get(name)
    }

    /// Clear every record and return to [`CyclePhase::Idle`].
    pub fn reset(&mut self) {
        self.records.clear();
        self.phase = CyclePhase::Idle;
    }

    /// Current phase of the cycle.
    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Whether nothing has been recorded this cycle.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of recorded names.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Owned copy of the current records.
    pub fn snapshot(&self) -> TimingSnapshot {
        TimingSnapshot {
            records: self.records.clone(),
        }
    }
}
