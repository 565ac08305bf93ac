//! Application configuration and constants.
//!
//! This module provides:
//! - Configuration constants (cache TTL, batch limits, endpoints, etc.)
//! - CLI option types and parsing

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{Command, Config, LogFormat, LogLevel};
