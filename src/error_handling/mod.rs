//! Error handling and lookup statistics.
//!
//! This module provides:
//! - Error type definitions for initialization, storage, the geolocation API
//!   and capture ingestion
//! - Lookup statistics tracking (cache hits, requests, failures, cooldowns)
//!
//! Only storage failures surface from a geolocation lookup. API failures are
//! logged and counted, and an active rate limit is a state rather than an error.

mod stats;
mod types;

// Re-export public API
pub use stats::LookupStats;
pub use types::{
    ApiError, CaptureError, GeolocationError, InitializationError, LookupEvent, StoreError,
};
