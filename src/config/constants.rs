//! Configuration constants.
//!
//! This module defines the operational parameters of the geolocation cache,
//! the ip-api.com client and the command-line defaults.

use std::time::Duration;

pub const DB_PATH: &str = "./route_atlas.db";

/// Default ip-api.com endpoint.
///
/// The free tier is only reachable over plain HTTP.
pub const DEFAULT_API_BASE_URL: &str = "http://ip-api.com";

/// Default response language for place names.
pub const DEFAULT_LANGUAGE: &str = "en";

pub const DEFAULT_USER_AGENT: &str = concat!("route_atlas/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout in seconds for calls to the geolocation API
pub const HTTP_TIMEOUT_SECS: u64 = 10;

// Geolocation cache
/// Age in days after which a cached record is refetched
pub const CACHE_EXPIRY_DAYS: i64 = 21;
/// Maximum addresses accepted by a single `/batch` call
pub const MAX_BATCH_SIZE: usize = 100;

// Rate limiting
/// Response header carrying the number of requests left in the current window
pub const HEADER_RATE_LIMIT_REMAINING: &str = "X-Rl";
/// Response header carrying the seconds until the window resets
pub const HEADER_RATE_LIMIT_TTL: &str = "X-Ttl";
/// Cooldown applied when the quota is exhausted but `X-Ttl` is missing
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);
/// A cooldown starts once this many requests (or fewer) remain
pub const RATE_LIMIT_THRESHOLD: u32 = 1;
/// Key of the persisted cooldown record
pub const COOLDOWN_RECORD_KEY: &str = "geocache-cooldown-epoch";
