//! ip-api.com client.
//!
//! Issues the two request shapes the service understands and reports the
//! rate-limit headers of every response, including failed ones, so the caller
//! can throttle before deciding what to do with the body.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::config::{
    DEFAULT_COOLDOWN, HEADER_RATE_LIMIT_REMAINING, HEADER_RATE_LIMIT_TTL, RATE_LIMIT_THRESHOLD,
};
use crate::error_handling::{ApiError, InitializationError};

use super::fields::GeolocationFields;
use super::types::GeolocationRecord;

/// Rate-limit state reported by one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimit {
    /// `X-Rl`: requests left in the current window
    pub remaining: Option<u32>,
    /// `X-Ttl`: time until the window resets
    pub reset_after: Option<Duration>,
}

impl RateLimit {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        fn parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers.get(name)?.to_str().ok()?.trim().parse().ok()
        }

        RateLimit {
            remaining: parse(headers, HEADER_RATE_LIMIT_REMAINING),
            reset_after: parse::<u64>(headers, HEADER_RATE_LIMIT_TTL).map(Duration::from_secs),
        }
    }

    /// How long to pause, if the quota is (nearly) exhausted.
    pub fn cooldown(&self) -> Option<Duration> {
        match self.remaining {
            Some(remaining) if remaining <= RATE_LIMIT_THRESHOLD => {
                Some(self.reset_after.unwrap_or(DEFAULT_COOLDOWN))
            }
            _ => None,
        }
    }
}

/// One element of an ip-api.com response body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpApiRecord {
    pub query: IpAddr,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub isp: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default, rename = "as")]
    pub as_number: Option<String>,
    #[serde(default, rename = "asname")]
    pub as_name: Option<String>,
    #[serde(default)]
    pub hosting: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl IpApiRecord {
    pub fn into_record(self, created_at: DateTime<Utc>) -> GeolocationRecord {
        GeolocationRecord {
            query_address: self.query.to_canonical(),
            country: non_empty(self.country),
            country_code: non_empty(self.country_code),
            region: non_empty(self.region),
            region_name: non_empty(self.region_name),
            city: non_empty(self.city),
            latitude: self.lat,
            longitude: self.lon,
            isp: non_empty(self.isp),
            org: non_empty(self.org),
            asn: non_empty(self.as_number),
            as_name: non_empty(self.as_name),
            is_hosting: self.hosting,
            error_message: non_empty(self.message),
            created_at,
        }
    }
}

/// A lookup call: one address, or up to a batch of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupRequest {
    Single(IpAddr),
    Batch(Vec<IpAddr>),
}

impl LookupRequest {
    pub fn len(&self) -> usize {
        match self {
            LookupRequest::Single(_) => 1,
            LookupRequest::Batch(addresses) => addresses.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a request that reached the service.
#[derive(Debug)]
pub struct ApiReply {
    pub status: StatusCode,
    pub rate_limit: RateLimit,
    /// Decoded records for a success status; the raw body otherwise.
    pub body: Result<Vec<IpApiRecord>, ReplyFailure>,
}

/// Why a reply carried no records.
#[derive(Debug)]
pub enum ReplyFailure {
    /// Non-success status; holds the response text
    Status(String),
    Decode(ApiError),
}

impl std::fmt::Display for ReplyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyFailure::Status(body) => write!(f, "{}", body),
            ReplyFailure::Decode(e) => write!(f, "{}", e),
        }
    }
}

/// Client for the ip-api.com JSON and batch endpoints.
#[derive(Clone)]
pub struct IpApiClient {
    client: Arc<reqwest::Client>,
    base_url: Url,
    language: Option<String>,
    fields: GeolocationFields,
}

impl IpApiClient {
    pub fn new(
        client: Arc<reqwest::Client>,
        base_url: &str,
        language: Option<String>,
    ) -> Result<Self, InitializationError> {
        // Url::join drops the last path segment unless the base ends with '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url =
            Url::parse(&normalized).map_err(|source| InitializationError::InvalidBaseUrl {
                url: base_url.to_string(),
                source,
            })?;

        Ok(IpApiClient {
            client,
            base_url,
            language: language.filter(|l| !l.is_empty()),
            fields: GeolocationFields::RECORD,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let mut url = self.base_url.join(path)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("fields", &self.fields.bits().to_string());
            if let Some(language) = &self.language {
                query.append_pair("lang", language);
            }
        }
        Ok(url)
    }

    /// Sends `request`, returning `Err` only when no response arrived.
    pub async fn send(&self, request: &LookupRequest) -> Result<ApiReply, ApiError> {
        let builder = match request {
            LookupRequest::Single(address) => self
                .client
                .get(self.endpoint(&format!("json/{}", address))?),
            LookupRequest::Batch(addresses) => {
                let body: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
                self.client.post(self.endpoint("batch")?).json(&body)
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        let rate_limit = RateLimit::from_headers(response.headers());
        let text = response.text().await?;

        let body = if !status.is_success() {
            Err(ReplyFailure::Status(text))
        } else {
            match request {
                LookupRequest::Single(_) => {
                    serde_json::from_str::<IpApiRecord>(&text).map(|record| vec![record])
                }
                LookupRequest::Batch(_) => serde_json::from_str::<Vec<IpApiRecord>>(&text),
            }
            .map_err(|e| ReplyFailure::Decode(ApiError::from(e)))
        };

        Ok(ApiReply {
            status,
            rate_limit,
            body,
        })
    }
}
