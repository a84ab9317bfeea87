//! Error types for the route timing engine.
//!
//! Handlers never fail: incomplete cycles are discarded and a missing timing
//! capability degrades to "no data". These errors only surface from
//! construction and configuration APIs.

use thiserror::Error;

/// Errors that can occur while configuring or wiring the engine.
#[derive(Debug, Error)]
pub enum RumError {
    /// Failed to (de)serialize configuration or payload data
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A resource name pattern failed to compile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex_lite::Error),

    /// A delayed flush was requested outside of a tokio runtime
    #[error("No tokio runtime available to arm the flush timer")]
    NoRuntime,
}

/// Result type for route timing operations.
pub type RumResult<T> = Result<T, RumError>;
