//! Geolocation data structures.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographic and network information about one address.
///
/// The query address is the record's identity: the cache holds at most one
/// record per address and an upsert replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeolocationRecord {
    pub query_address: IpAddr,
    pub country: Option<String>,
    pub country_code: Option<String>,
    /// Region code (e.g. `CA`)
    pub region: Option<String>,
    /// Region name (e.g. `California`)
    pub region_name: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub isp: Option<String>,
    pub org: Option<String>,
    /// AS number and organization, e.g. `AS15169 Google LLC`
    pub asn: Option<String>,
    pub as_name: Option<String>,
    pub is_hosting: bool,
    /// Set by the service when it could not locate the address
    /// (e.g. `reserved range`)
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GeolocationRecord {
    /// Creates an empty record for `address`.
    pub fn new(address: IpAddr, created_at: DateTime<Utc>) -> Self {
        GeolocationRecord {
            query_address: address.to_canonical(),
            country: None,
            country_code: None,
            region: None,
            region_name: None,
            city: None,
            latitude: None,
            longitude: None,
            isp: None,
            org: None,
            asn: None,
            as_name: None,
            is_hosting: false,
            error_message: None,
            created_at,
        }
    }

    /// Cache key: the canonical string form of the address.
    pub fn key(&self) -> String {
        cache_key(&self.query_address)
    }

    /// Returns `(latitude, longitude)` when both are known.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }

    /// Human readable place, most specific first (e.g. `Sydney, New South Wales, Australia`).
    pub fn place(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.city, &self.region_name, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Cache key for an address. v4-mapped IPv6 addresses share the key of their
/// IPv4 form.
pub fn cache_key(address: &IpAddr) -> String {
    address.to_canonical().to_string()
}

/// Current time truncated to the millisecond precision the cache stores.
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
