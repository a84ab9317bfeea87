//! Replays a recorded router session and prints one JSON record per navigation.
//!
//! ```text
//! RUST_LOG=route_rum=debug rum-replay crates/rum_replay/demos/two_routes.json
//! ```

mod script;

use anyhow::{Context, Result};
use std::io::Write;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::script::{replay, Script};

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine readable
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: rum-replay <script.json>")?;
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let script: Script =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))?;

    tracing::info!("Replaying {} steps from {}", script.steps.len(), path);
    let navigations = replay(script)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for navigation in &navigations {
        serde_json::to_writer(&mut out, navigation)?;
        writeln!(out)?;
    }
    out.flush()?;

    Ok(())
}
