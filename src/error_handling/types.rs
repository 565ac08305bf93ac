//! Error type definitions.
//!
//! This module defines the error types and the lookup event kinds used
//! throughout the application.

use std::path::PathBuf;

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),

    /// The configured API base URL could not be parsed.
    #[error("Invalid API base URL {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Error types for the geolocation cache and cooldown stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error creating the database file.
    #[error("Database file creation error: {0}")]
    FileCreationError(String),

    /// SQL execution error.
    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    /// Schema migration error.
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be turned back into a record.
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

/// Errors surfaced by a geolocation lookup.
///
/// Network failures and rate limits never appear here; the store is the only
/// dependency without a fallback.
#[derive(Error, Debug)]
pub enum GeolocationError {
    #[error("Geolocation cache unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Failures talking to the geolocation API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Connection, timeout or body read failure.
    #[error("Geolocation request failed: {0}")]
    Transport(#[from] ReqwestError),

    /// The response body was not the expected JSON.
    #[error("Geolocation response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request URL could not be built.
    #[error("Invalid geolocation request URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Failures reading a capture directory.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to read capture directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Notable events during geolocation lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum LookupEvent {
    /// Address served from a fresh cache entry
    CacheHit,
    /// Address absent from the cache (or expired)
    CacheMiss,
    /// `GET /json/{address}` issued
    SingleRequest,
    /// `POST /batch` issued
    BatchRequest,
    /// Request failed, returned a non-success status or an undecodable body
    RequestFailed,
    /// A rate-limit cooldown was started
    CooldownEngaged,
    /// A lookup returned early because a cooldown was active
    CooldownSkipped,
    /// Record written to the cache
    CacheWrite,
}

impl std::fmt::Display for LookupEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl LookupEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupEvent::CacheHit => "Cache hits",
            LookupEvent::CacheMiss => "Cache misses",
            LookupEvent::SingleRequest => "Single requests",
            LookupEvent::BatchRequest => "Batch requests",
            LookupEvent::RequestFailed => "Failed requests",
            LookupEvent::CooldownEngaged => "Cooldowns engaged",
            LookupEvent::CooldownSkipped => "Lookups deferred by cooldown",
            LookupEvent::CacheWrite => "Cache writes",
        }
    }
}
