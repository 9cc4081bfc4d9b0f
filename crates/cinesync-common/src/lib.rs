//! Shared utilities for CineSync: wire protocol, settings, logging, error types.
//!
//! This crate provides common infrastructure used by the session client and the
//! player controller.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod helpers;
pub mod protocol;

pub use config::{Settings, SettingsStore};
pub use error::{Error, Result};
pub use protocol::*;

/// Initialize tracing with a fallback level.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies.
pub fn init_tracing_with_default(default_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second init (tests, embedding hosts) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
