// Copyright (c) 2025 - Cowboy AI, Inc.
//! Logging bootstrap

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber filtered by `RUST_LOG`, defaulting to `info`
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_target(true)
        .try_init()
        .is_ok()
}
