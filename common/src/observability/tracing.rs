//! Tracing initialization.
//!
//! Centralizes tracing config so every binary in the workspace behaves the same.

use crate::ColorWhen;
use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing subscriber.
///
/// - Respects `RUST_LOG` via `EnvFilter`, falling back to `default_level`.
/// - ANSI color controlled by `ColorWhen`.
///
/// # Errors
///
/// Returns error if a global subscriber was already installed.
pub fn init_tracing(color: ColorWhen, default_level: &str) -> Result<()> {
    // ---
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(env_filter)
        .with_ansi(color.should_color_stderr())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}
