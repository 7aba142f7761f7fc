//! Tracing subscriber setup for the `woolly` binary.
//!
//! Library code only emits events; installing a subscriber is left to the
//! embedding application.

use std::io::{self, IsTerminal};
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

/// Filter used when neither `RUST_LOG` nor an explicit directive is given.
pub const DEFAULT_FILTER: &str = "woolly=info";

static INSTALLED: OnceLock<()> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Install a stderr subscriber once per process. `directive` takes precedence
/// over `RUST_LOG`; repeated calls are no-ops.
pub fn init(directive: Option<&str>) -> Result<(), TelemetryError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = build_filter(directive, std::env::var("RUST_LOG").ok().as_deref())?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init()
        .map_err(|e| TelemetryError::Install(e.to_string()))?;

    let _ = INSTALLED.set(());
    Ok(())
}

fn build_filter(directive: Option<&str>, env: Option<&str>) -> Result<EnvFilter, TelemetryError> {
    let source = directive
        .or(env.filter(|value| !value.trim().is_empty()))
        .unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(source).map_err(|e| TelemetryError::Filter(e.to_string()))
}
