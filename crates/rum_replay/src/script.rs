//! Replay scripts: timed lifecycle signals and resource log writes.

use anyhow::{bail, Result};
use route_rum::{
    Aggregator, LifecycleEvent, ManualClock, Navigation, ResourceEntry, ResourceLog,
    ResourceTimingIndex, RumConfig, RumPayload,
};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A recorded session to replay.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Aggregator configuration; the delay is ignored
    #[serde(default)]
    pub config: RumConfig,
    /// Epoch milliseconds of zero on the recorded high-resolution clock
    pub time_origin: f64,
    /// Steps in the order they happened
    pub steps: Vec<Step>,
}

/// One step of a script.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Epoch milliseconds at which the step happened
    pub at: f64,
    #[serde(flatten)]
    pub action: Action,
}

/// What happened at a step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Action {
    Start { path: String },
    BeforeRender,
    AfterRender,
    Complete { path: String },
    /// A resource entry landed in the log (times relative to `time_origin`)
    Resource { entry: ResourceEntry },
    Unload,
}

/// Replay `script` and return every navigation the aggregator emitted.
///
/// Flushes are immediate so the output only depends on the script; an
/// unload at the end flushes whatever cycle is still open.
pub fn replay(script: Script) -> Result<Vec<Navigation>> {
    let clock = ManualClock::new(script.time_origin);
    let log = Arc::new(ResourceLog::new(script.time_origin));
    let records: Arc<Mutex<Vec<Navigation>>> = Arc::default();

    let sink = {
        let records = records.clone();
        move |path: &str, rum: &RumPayload, resources: &[ResourceEntry]| {
            if let Ok(mut records) = records.lock() {
                records.push(Navigation {
                    path: path.to_string(),
                    rum: *rum,
                    resources: resources.to_vec(),
                });
            }
        }
    };

    let aggregator = Aggregator::with_parts(
        script.config.with_delay(Duration::ZERO),
        Arc::new(sink),
        Arc::new(clock.clone()),
        ResourceTimingIndex::new(log.clone()),
    )?;

    let mut now = script.time_origin;
    for (i, step) in script.steps.into_iter().enumerate() {
        if step.at < now {
            bail!("step {} at {} goes back in time (previous {})", i, step.at, now);
        }
        now = step.at;
        clock.set(now);

        match step.action {
            Action::Start { path } => aggregator.dispatch(LifecycleEvent::Start { path }),
            Action::BeforeRender => aggregator.dispatch(LifecycleEvent::BeforeRender),
            Action::AfterRender => aggregator.dispatch(LifecycleEvent::AfterRender),
            Action::Complete { path } => aggregator.dispatch(LifecycleEvent::Complete { path }),
            Action::Resource { entry } => {
                if !log.record(entry) {
                    tracing::warn!("Resource log full at step {}", i);
                }
            }
            Action::Unload => aggregator.dispatch(LifecycleEvent::Unload),
        }
    }

    aggregator.page_unload();
    tracing::info!(
        emitted = aggregator.emitted(),
        discarded = aggregator.discarded(),
        "replay complete"
    );
    drop(aggregator);

    let navigations = match records.lock() {
        Ok(mut records) => std::mem::take(&mut *records),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    };
    Ok(navigations)
}
