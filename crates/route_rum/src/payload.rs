//! Mapping from a finished cycle to a navigation-timing shaped record.
//!
//! A soft navigation has no network phases of its own, so most fields are
//! defaulted from the lifecycle timestamps and then refined with whatever the
//! resource log saw during the cycle.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RumError, RumResult};
use crate::index::ResourceTimingIndex;
use crate::resource::ResourceEntry;
use crate::store::{marks, TimingSnapshot};

/// Navigation-timing record for one route change, in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RumPayload {
    pub navigation_start: f64,
    pub fetch_start: f64,
    pub domain_lookup_start: f64,
    pub domain_lookup_end: f64,
    pub connect_start: f64,
    pub connect_end: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub response_end: f64,
    pub dom_loading: f64,
    pub dom_interactive: f64,
    pub dom_content_loaded: f64,
    pub dom_complete: f64,
    pub load_event_start: f64,
    pub load_event_end: f64,
}

impl RumPayload {
    /// Every field with its wire name, in navigation order.
    pub fn fields(&self) -> [(&'static str, f64); 15] {
        [
            ("navigationStart", self.navigation_start),
            ("fetchStart", self.fetch_start),
            ("domainLookupStart", self.domain_lookup_start),
            ("domainLookupEnd", self.domain_lookup_end),
            ("connectStart", self.connect_start),
            ("connectEnd", self.connect_end),
            ("requestStart", self.request_start),
            ("responseStart", self.response_start),
            ("responseEnd", self.response_end),
            ("domLoading", self.dom_loading),
            ("domInteractive", self.dom_interactive),
            ("domContentLoaded", self.dom_content_loaded),
            ("domComplete", self.dom_complete),
            ("loadEventStart", self.load_event_start),
            ("loadEventEnd", self.load_event_end),
        ]
    }

    /// Total time of the route change in milliseconds.
    pub fn duration(&self) -> f64 {
        self.load_event_end - self.navigation_start
    }

    /// Whether every field is a finite, non-negative number.
    pub fn is_well_formed(&self) -> bool {
        self.fields()
            .iter()
            .all(|(_, value)| value.is_finite() && *value >= 0.0)
    }
}

/// Build the matcher for a route's page bundle (`/<root>/<route>.js`).
///
/// Query strings and fragments are ignored, a trailing slash is dropped and
/// `/` maps to `index`.
pub fn page_bundle_pattern(route: &str, root: &str) -> RumResult<Regex> {
    let root = root.trim_matches('/');
    if root.is_empty() {
        return Err(RumError::InvalidConfig(
            "bundle root must not be empty".to_string(),
        ));
    }

    let route = route.split(['?', '#']).next().unwrap_or_default();
    let route = route.trim_end_matches('/');
    let route = if route.is_empty() { "/index" } else { route };
    let route = if route.starts_with('/') {
        route.to_string()
    } else {
        format!("/{route}")
    };

    let pattern = format!(
        r"/{}{}(?:/index)?\.js(?:[?#]|$)",
        regex_lite::escape(root),
        regex_lite::escape(&route)
    );
    Ok(Regex::new(&pattern)?)
}

/// Turn a cycle snapshot plus correlated resources into a payload.
///
/// Returns `None` (discard) when the navigation start, last render or
/// completion timestamp is missing.
pub fn synthesize(
    snapshot: &TimingSnapshot,
    resources: &[ResourceEntry],
    bundle: Option<&Regex>,
) -> Option<RumPayload> {
    let navigation_start = snapshot.timestamp(marks::NAVIGATION_START)?;
    let last_render = snapshot.timestamp(marks::DOM_INTERACTIVE)?;
    let completed = snapshot.timestamp(marks::LOAD_EVENT_END)?;
    let first_render = snapshot
        .timestamp(marks::DOM_LOADING)
        .unwrap_or(last_render);

    let mut rum = RumPayload {
        navigation_start,
        fetch_start: navigation_start,
        domain_lookup_start: navigation_start,
        domain_lookup_end: navigation_start,
        connect_start: navigation_start,
        connect_end: navigation_start,
        request_start: navigation_start,
        response_start: navigation_start,
        response_end: navigation_start,
        dom_loading: first_render,
        dom_interactive: last_render,
        dom_content_loaded: last_render,
        dom_complete: last_render,
        load_event_start: last_render,
        load_event_end: completed,
    };

    if let Some(entry) = bundle.and_then(|pattern| ResourceTimingIndex::find(resources, pattern)) {
        if entry.response_start != 0.0 {
            rum.response_start = entry.response_start;
        }
        if entry.response_end != 0.0 {
            rum.response_end = entry.response_end;
        }
    }

    // Assets can keep loading after the router reports completion.
    let last_response = resources
        .iter()
        .map(|entry| entry.response_end)
        .fold(f64::NEG_INFINITY, f64::max);
    if last_response > rum.load_event_end {
        rum.load_event_end = last_response;
    }

    if !rum.is_well_formed() {
        tracing::debug!(
            target: "route_rum::payload",
            ?rum,
            "payload has non-finite or negative fields, discarding"
        );
        return None;
    }

    Some(rum)
}
