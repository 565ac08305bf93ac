//! IP geolocation via ip-api.com, backed by a persistent cache.
//!
//! - [`classify`]: which addresses are worth looking up
//! - [`api`]: the HTTP client and response decoding
//! - [`cooldown`]: rate-limit state shared by all lookups
//! - [`service`]: cache-first lookup orchestration

pub mod api;
pub mod classify;
pub mod cooldown;
mod fields;
pub mod service;
mod types;

pub use api::{IpApiClient, RateLimit};
pub use classify::is_publicly_routable;
pub use cooldown::{CooldownStatus, CooldownTracker};
pub use fields::GeolocationFields;
pub use service::GeolocationService;
pub use types::{cache_key, GeolocationRecord};

pub(crate) use types::now_millis;
