//! Queryable view over the buffered resource log.
//!
//! Every host interaction is resolved through
//! [`capability::lookup`](crate::capability::lookup); when the host or a
//! member is missing the index answers with "no data" instead of failing.

use regex_lite::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::capability::lookup;
use crate::resource::{
    global_resource_log, members, PerformanceHost, ResourceEntry, TimeRange, RESOURCE_ENTRY_TYPE,
};

/// Capability-probing facade over a resource log.
pub struct ResourceTimingIndex {
    host: Option<Arc<dyn PerformanceHost>>,
    origin: OnceLock<f64>,
}

impl fmt::Debug for ResourceTimingIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTimingIndex")
            .field("available", &self.is_available())
            .field("origin", &self.origin.get())
            .finish()
    }
}

impl Default for ResourceTimingIndex {
    fn default() -> Self {
        Self::global()
    }
}

impl ResourceTimingIndex {
    /// Create an index over an injected host.
    pub fn new(host: Arc<dyn PerformanceHost>) -> Self {
        Self {
            host: Some(host),
            origin: OnceLock::new(),
        }
    }

    /// Create an index over the process-wide resource log.
    pub fn global() -> Self {
        Self::new(global_resource_log())
    }

    /// Create an index with no timing capability at all.
    pub fn unavailable() -> Self {
        Self {
            host: None,
            origin: OnceLock::new(),
        }
    }

    /// Whether a host capability was provided.
    pub fn is_available(&self) -> bool {
        self.host.is_some()
    }

    /// Resolve a member on the host, if both exist.
    fn member(&self, name: &str) -> Option<(&dyn PerformanceHost, String)> {
        let host = self.host.as_deref()?;
        let resolved = lookup(host, name)?;
        Some((host, resolved))
    }

    /// Epoch milliseconds of zero on the host's high-resolution clock.
    ///
    /// Prefers `timeOrigin`, falls back to the legacy `navigationStart`.
    /// The first value found is cached for the lifetime of the index.
    pub fn time_origin(&self) -> Option<f64> {
        if let Some(origin) = self.origin.get() {
            return Some(*origin);
        }

        let origin = [members::TIME_ORIGIN, members::NAVIGATION_START]
            .into_iter()
            .find_map(|name| {
                let (host, member) = self.member(name)?;
                host.read_number(&member)
            })?;

        Some(*self.origin.get_or_init(|| origin))
    }

    /// Correlated entries from the live log whose start lies in `range`.
    pub fn entries(&self, range: TimeRange) -> Vec<ResourceEntry> {
        let snapshot = match self.member(members::GET_ENTRIES_BY_TYPE) {
            Some((host, member)) => host.entries_by_type(&member, RESOURCE_ENTRY_TYPE),
            None => return Vec::new(),
        };
        self.entries_from(snapshot, range)
    }

    /// Normalize, sort and filter an already captured snapshot.
    ///
    /// Entries are shifted to epoch milliseconds, ordered by
    /// `(fetch_start, response_start | response_end)` and kept when their
    /// `start_time` lies in `range` (inclusive).
    pub fn entries_from(&self, snapshot: Vec<ResourceEntry>, range: TimeRange) -> Vec<ResourceEntry> {
        let Some(origin) = self.time_origin() else {
            return Vec::new();
        };

        let mut entries: Vec<ResourceEntry> = snapshot
            .into_iter()
            .map(|entry| entry.normalized(origin))
            .collect();

        entries.sort_by(|a, b| {
            a.fetch_start
                .total_cmp(&b.fetch_start)
                .then_with(|| a.response_marker().total_cmp(&b.response_marker()))
        });
        entries.retain(|entry| range.contains(entry.start_time));
        entries
    }

    /// First entry, in the given order, whose name matches `pattern`.
    pub fn find<'a>(resources: &'a [ResourceEntry], pattern: &Regex) -> Option<&'a ResourceEntry> {
        resources.iter().find(|entry| pattern.is_match(&entry.name))
    }

    /// Empty the shared log. Returns `false` when the capability is missing.
    pub fn clear(&self) -> bool {
        match self.member(members::CLEAR_RESOURCE_TIMINGS) {
            Some((host, member)) => {
                host.clear_resource_timings(&member);
                true
            }
            None => false,
        }
    }

    /// Resize the shared log. Returns `false` when the capability is missing.
    pub fn set_buffer_size(&self, size: usize) -> bool {
        match self.member(members::SET_RESOURCE_TIMING_BUFFER_SIZE) {
            Some((host, member)) => {
                host.set_resource_timing_buffer_size(&member, size);
                true
            }
            None => false,
        }
    }
}
