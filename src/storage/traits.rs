//! Pluggable persistence interfaces.
//!
//! The geolocation service only talks to these traits, so any embedded or
//! remote keyed store can back the cache.

use std::collections::BTreeSet;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error_handling::StoreError;
use crate::geolocation::GeolocationRecord;

/// Predicate for [`GeolocationStore::query`].
///
/// Every populated criterion must hold for a record to match; an empty filter
/// matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheFilter {
    /// Only these addresses (already canonical)
    pub addresses: Option<BTreeSet<IpAddr>>,
    /// Only records created strictly after this instant
    pub created_after: Option<DateTime<Utc>>,
    /// Only records created strictly before this instant
    pub created_before: Option<DateTime<Utc>>,
}

impl CacheFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_addresses<I>(addresses: I) -> Self
    where
        I: IntoIterator<Item = IpAddr>,
    {
        CacheFilter {
            addresses: Some(addresses.into_iter().map(|a| a.to_canonical()).collect()),
            ..Self::default()
        }
    }

    pub fn created_after(mut self, instant: DateTime<Utc>) -> Self {
        self.created_after = Some(instant);
        self
    }

    pub fn created_before(mut self, instant: DateTime<Utc>) -> Self {
        self.created_before = Some(instant);
        self
    }

    /// Evaluates the filter against a record.
    pub fn matches(&self, record: &GeolocationRecord) -> bool {
        if let Some(addresses) = &self.addresses {
            if !addresses.contains(&record.query_address) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if record.created_at <= after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if record.created_at >= before {
                return false;
            }
        }
        true
    }
}

/// Keyed storage of geolocation records.
///
/// Keys are the canonical string form of the address (see
/// [`crate::geolocation::cache_key`]).
#[async_trait]
pub trait GeolocationStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<GeolocationRecord>, StoreError>;

    async fn query(&self, filter: &CacheFilter) -> Result<Vec<GeolocationRecord>, StoreError>;

    /// Inserts or replaces the record for its address. The stored creation
    /// time never moves backwards.
    async fn upsert(&self, record: &GeolocationRecord) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// Persistence for the single rate-limit cooldown value.
#[async_trait]
pub trait CooldownStore: Send + Sync {
    async fn load_cooldown(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn save_cooldown(&self, ends_at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn clear_cooldown(&self) -> Result<(), StoreError>;
}
