//! Route Transition Timing
//!
//! This crate measures client-side route changes in a single-page
//! application and reports each one as a navigation-timing shaped record,
//! even though no full page load took place. It provides:
//!
//! - A timing store fed by router lifecycle signals
//! - Correlation with the buffered resource timing log
//! - Vendor-prefix capability probing that degrades to "no data"
//! - A delayed flush so late assets are still attributed to the route
//! - Exactly one record per navigation cycle, delivered to a sink
//!
//! # Example
//!
//! ```rust
//! use route_rum::{Aggregator, RumConfig, RumPayload, ResourceEntry};
//! use std::time::Duration;
//!
//! let config = RumConfig::new().with_delay(Duration::ZERO);
//! let aggregator = Aggregator::new(config, |path: &str, rum: &RumPayload, _: &[ResourceEntry]| {
//!     println!("{path} took {}ms", rum.duration());
//! })
//! .unwrap();
//!
//! aggregator.start("/about");
//! aggregator.before_render();
//! aggregator.after_render();
//! aggregator.complete("/about");
//! assert_eq!(aggregator.emitted(), 1);
//! ```
//!
//! # Modules
//!
//! - [`aggregator`] - Lifecycle handlers and cycle orchestration
//! - [`store`] - Per-cycle timestamp storage
//! - [`scheduler`] - Delayed and forced flushing
//! - [`payload`] - Navigation record synthesis
//! - [`index`] - Queries over the resource timing log
//! - [`resource`] - Resource entries and the shared buffered log
//! - [`capability`] - Vendor-prefix member lookup
//! - [`sink`] - Record delivery
//! - [`config`] - Aggregator configuration
//! - [`clock`] - Timestamp sources
//! - [`error`] - Error types

pub mod aggregator;
pub mod capability;
pub mod clock;
pub mod config;
mod error;
pub mod index;
pub mod payload;
pub mod resource;
pub mod scheduler;
pub mod sink;
pub mod store;

pub use aggregator::{Aggregator, LifecycleEvent, RouteHandlers};
pub use capability::{lookup, CapabilityTable};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RumConfig;
pub use error::{RumError, RumResult};
pub use index::ResourceTimingIndex;
pub use payload::{page_bundle_pattern, synthesize, RumPayload};
pub use resource::{global_resource_log, PerformanceHost, ResourceEntry, ResourceLog, TimeRange};
pub use scheduler::FlushScheduler;
pub use sink::{ChannelSink, Navigation, NavigationSink};
pub use store::{CyclePhase, TimingRecord, TimingSnapshot, TimingStore};
