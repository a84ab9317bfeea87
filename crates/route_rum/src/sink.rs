//! Delivery of finished navigation records.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::payload::RumPayload;
use crate::resource::ResourceEntry;

/// Receives one call per completed navigation cycle.
///
/// Called after the aggregator has released its internal lock, so a sink may
/// call back into the aggregator.
pub trait NavigationSink: Send + Sync {
    /// A route change to `path` finished with the given timings.
    fn navigated(&self, path: &str, rum: &RumPayload, resources: &[ResourceEntry]);
}

impl<F> NavigationSink for F
where
    F: Fn(&str, &RumPayload, &[ResourceEntry]) + Send + Sync,
{
    fn navigated(&self, path: &str, rum: &RumPayload, resources: &[ResourceEntry]) {
        self(path, rum, resources)
    }
}

/// An owned navigation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    /// Route the cycle ended on
    pub path: String,
    /// Navigation timings
    pub rum: RumPayload,
    /// Resource entries correlated with the cycle
    pub resources: Vec<ResourceEntry>,
}

/// Sink forwarding records into a bounded tokio channel.
///
/// Delivery is best effort: when the channel is full or closed the record
/// is dropped and a warning is logged.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<Navigation>,
}

impl ChannelSink {
    /// Create a sink and the receiver it feeds.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Navigation>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl NavigationSink for ChannelSink {
    fn navigated(&self, path: &str, rum: &RumPayload, resources: &[ResourceEntry]) {
        let navigation = Navigation {
            path: path.to_string(),
            rum: *rum,
            resources: resources.to_vec(),
        };
        if let Err(e) = self.sender.try_send(navigation) {
            tracing::warn!(
                target: "route_rum::sink",
                path,
                error = %e,
                "navigation record dropped"
            );
        }
    }
}
