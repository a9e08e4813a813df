// src/logging.rs

//! Diagnostic logging for `pipedag`.
//!
//! The supervisor owns stdout for operator-facing progress, so all
//! diagnostics go to stderr. An embedding application may pass an explicit
//! level; otherwise the `PIPEDAG_LOG` environment variable is consulted
//! (any spelling `tracing::Level` accepts, e.g. "debug"), falling back to
//! `info`.

use std::str::FromStr;

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

/// Install the global subscriber. Call once at startup.
pub fn init_logging(level: Option<Level>) -> Result<()> {
    fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.unwrap_or_else(level_from_env))
        .init();

    Ok(())
}

fn level_from_env() -> Level {
    std::env::var("PIPEDAG_LOG")
        .ok()
        .and_then(|raw| Level::from_str(raw.trim()).ok())
        .unwrap_or(Level::INFO)
}
