//! # Spyder Common
//!
//! Shared plumbing for the Spyder offline worker crates.
//!
//! ## Features
//!
//! - Logging configuration and subscriber setup
//! - Wall-clock helpers used when stamping cache entries

use std::time::{SystemTime, UNIX_EPOCH};

pub mod logging;

pub use logging::{init_logging, try_init_logging, LogConfig, LogError, LogFormat};

/// Milliseconds since the Unix epoch.
///
/// A clock set before 1970 yields `0` rather than an error.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
