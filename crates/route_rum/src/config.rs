//! Aggregator configuration.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

use crate::error::{RumError, RumResult};
use crate::scheduler::DEFAULT_DELAY;

/// Default directory segment of page bundles.
pub const DEFAULT_BUNDLE_ROOT: &str = "pages";

/// Configuration for a route timing aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RumConfig {
    /// Clear the shared resource log when a cycle starts
    pub clear_resource_timings: bool,
    /// Raise the shared resource log capacity once at construction
    pub resource_timing_buffer_size: Option<usize>,
    /// Deferral between completion and synthesis (milliseconds in JSON)
    #[serde(rename = "delay_ms", with = "millis")]
    pub delay: Duration,
    /// Directory segment used to recognise the page bundle
    pub bundle_root: String,
}

impl Default for RumConfig {
    fn default() -> Self {
        Self {
            clear_resource_timings: true,
            resource_timing_buffer_size: None,
            delay: DEFAULT_DELAY,
            bundle_root: DEFAULT_BUNDLE_ROOT.to_string(),
        }
    }
}

impl RumConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from JSON; missing keys take their defaults.
    pub fn from_json(json: &str) -> RumResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set whether the resource log is cleared at cycle start.
    pub fn with_clear_resource_timings(mut self, clear: bool) -> Self {
        self.clear_resource_timings = clear;
        self
    }

    /// Set the resource log capacity applied at construction.
    pub fn with_resource_timing_buffer_size(mut self, size: usize) -> Self {
        self.resource_timing_buffer_size = Some(size);
        self
    }

    /// Set the flush delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the page bundle directory segment.
    pub fn with_bundle_root(mut self, root: &str) -> Self {
        self.bundle_root = root.to_string();
        self
    }

    /// Check values that cannot be expressed in the types.
    pub fn validate(&self) -> RumResult<()> {
        if self.resource_timing_buffer_size == Some(0) {
            return Err(RumError::InvalidConfig(
                "resource timing buffer size must be positive".to_string(),
            ));
        }
        if self.bundle_root.trim_matches('/').is_empty() {
            return Err(RumError::InvalidConfig(
                "bundle root must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use super::*;

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(delay.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
