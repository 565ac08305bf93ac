//! Cache-first geolocation lookups with rate-limit aware fetching.
//!
//! [`GeolocationService::perform_lookup`] answers from the cache whenever it
//! can. Missing addresses are fetched from ip-api.com one request at a time
//! under a process-wide single-flight lock, and the loop stops as soon as the
//! API signals that the quota is spent.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::{watch, Mutex};

use crate::config::MAX_BATCH_SIZE;
use crate::error_handling::{GeolocationError, LookupEvent, LookupStats, StoreError};
use crate::storage::{CacheFilter, CooldownStore, GeolocationStore};

use super::api::{IpApiClient, LookupRequest};
use super::classify::is_publicly_routable;
use super::cooldown::{CooldownStatus, CooldownTracker};
use super::types::{cache_key, now_millis, GeolocationRecord};

/// Resolves addresses to [`GeolocationRecord`]s.
///
/// Cheap to share behind an `Arc`; concurrent lookups are safe and never
/// issue overlapping requests.
pub struct GeolocationService {
    store: Arc<dyn GeolocationStore>,
    cooldown: CooldownTracker,
    api: IpApiClient,
    /// Held for the whole fetch phase; all network calls happen under it
    flight: Mutex<()>,
    stats: Arc<LookupStats>,
    cache_ttl: chrono::Duration,
}

impl GeolocationService {
    /// Creates the service, reapplying any cooldown persisted in `cooldown_store`.
    pub async fn new(
        store: Arc<dyn GeolocationStore>,
        cooldown_store: Arc<dyn CooldownStore>,
        api: IpApiClient,
        cache_ttl_days: i64,
    ) -> Result<Self, StoreError> {
        let cooldown = CooldownTracker::load(cooldown_store).await?;
        Ok(GeolocationService {
            store,
            cooldown,
            api,
            flight: Mutex::new(()),
            stats: Arc::new(LookupStats::new()),
            cache_ttl: chrono::Duration::days(cache_ttl_days.max(0)),
        })
    }

    pub fn stats(&self) -> Arc<LookupStats> {
        Arc::clone(&self.stats)
    }

    pub fn cooldown(&self) -> &CooldownTracker {
        &self.cooldown
    }

    pub fn cooldown_status(&self) -> CooldownStatus {
        self.cooldown.status()
    }

    /// Subscribes to cooldown changes.
    pub fn subscribe(&self) -> watch::Receiver<CooldownStatus> {
        self.cooldown.subscribe()
    }

    /// Geolocates `addresses`.
    ///
    /// Private, loopback and link-local addresses are dropped. Fresh cache
    /// entries come first in the result, followed by records fetched during
    /// this call. The result may be incomplete: a cooldown or a failed request
    /// leaves the remaining addresses unresolved without raising an error.
    ///
    /// # Errors
    ///
    /// Only a failing cache store produces an error.
    pub async fn perform_lookup<I>(
        &self,
        addresses: I,
    ) -> Result<Vec<GeolocationRecord>, GeolocationError>
    where
        I: IntoIterator<Item = IpAddr>,
    {
        let requested: BTreeSet<IpAddr> = addresses
            .into_iter()
            .map(|a| a.to_canonical())
            .filter(|a| is_publicly_routable(*a))
            .collect();
        if requested.is_empty() {
            return Ok(Vec::new());
        }

        let (cached, missing) = self.split_cached(&requested).await?;
        self.stats.add(LookupEvent::CacheHit, cached.len());
        self.stats.add(LookupEvent::CacheMiss, missing.len());
        info!(
            "Geolocation lookup for {} address(es): {} cached, {} missing",
            requested.len(),
            cached.len(),
            missing.len()
        );
        if missing.is_empty() {
            return Ok(cached);
        }

        if self.cooldown.is_active() {
            self.stats.increment(LookupEvent::CooldownSkipped);
            debug!(
                "Cooldown active; returning {} cached record(s) only",
                cached.len()
            );
            return Ok(cached);
        }

        let flight = self.flight.lock().await;
        self.cooldown.expire_if_elapsed(&flight).await?;

        // Another caller may have fetched while we waited for the lock
        let (mut results, mut missing) = self.split_cached(&requested).await?;
        if missing.is_empty() {
            return Ok(results);
        }

        let mut fetched = Vec::new();
        while !missing.is_empty() && !self.cooldown.is_active() {
            let request = match missing.first() {
                Some(only) if missing.len() == 1 => {
                    self.stats.increment(LookupEvent::SingleRequest);
                    LookupRequest::Single(*only)
                }
                _ => {
                    self.stats.increment(LookupEvent::BatchRequest);
                    LookupRequest::Batch(missing.iter().take(MAX_BATCH_SIZE).copied().collect())
                }
            };
            info!("Requesting geolocation for {} address(es)", request.len());

            let reply = match self.api.send(&request).await {
                Ok(reply) => reply,
                Err(e) => {
                    self.stats.increment(LookupEvent::RequestFailed);
                    error!("Geolocation request failed: {}", e);
                    break;
                }
            };

            if let Some(duration) = reply.rate_limit.cooldown() {
                self.stats.increment(LookupEvent::CooldownEngaged);
                self.cooldown.engage(duration, &flight).await?;
            }

            let items = match reply.body {
                Ok(items) => items,
                Err(failure) => {
                    self.stats.increment(LookupEvent::RequestFailed);
                    warn!(
                        "Geolocation request returned {}: {}",
                        reply.status, failure
                    );
                    break;
                }
            };

            let created_at = now_millis();
            let mut resolved = 0;
            for item in items {
                let record = item.into_record(created_at);
                if !missing.remove(&record.query_address) {
                    debug!("Ignoring unrequested record for {}", record.query_address);
                    continue;
                }
                self.store.upsert(&record).await?;
                self.stats.increment(LookupEvent::CacheWrite);
                fetched.push(record);
                resolved += 1;
            }

            if resolved == 0 {
                warn!(
                    "Geolocation response resolved none of {} requested address(es); giving up",
                    request.len()
                );
                break;
            }
        }

        if !missing.is_empty() {
            info!("{} address(es) left unresolved", missing.len());
        }

        results.extend(fetched);
        Ok(results)
    }

    /// Geolocates a single address.
    ///
    /// Returns `None` for non-routable addresses and for addresses that could
    /// not be resolved right now.
    pub async fn perform_single_lookup(
        &self,
        address: IpAddr,
    ) -> Result<Option<GeolocationRecord>, GeolocationError> {
        let key = cache_key(&address);
        let records = self.perform_lookup([address]).await?;
        Ok(records.into_iter().find(|r| r.key() == key))
    }

    /// Removes every cache entry older than the TTL, returning how many were
    /// deleted.
    pub async fn purge_expired(&self) -> Result<usize, GeolocationError> {
        let expired = self
            .store
            .query(&CacheFilter::all().created_before(self.cutoff()))
            .await?;

        let mut removed = 0;
        for record in &expired {
            if self.store.delete(&record.key()).await? {
                removed += 1;
            }
        }
        info!("Purged {} expired geolocation record(s)", removed);
        Ok(removed)
    }

    fn cutoff(&self) -> chrono::DateTime<chrono::Utc> {
        now_millis() - self.cache_ttl
    }

    /// Fresh cache entries for `requested`, plus the addresses without one.
    async fn split_cached(
        &self,
        requested: &BTreeSet<IpAddr>,
    ) -> Result<(Vec<GeolocationRecord>, BTreeSet<IpAddr>), StoreError> {
        let filter = CacheFilter::for_addresses(requested.iter().copied())
            .created_after(self.cutoff());
        let cached = self.store.query(&filter).await?;

        let mut missing = requested.clone();
        for record in &cached {
            missing.remove(&record.query_address);
        }
        Ok((cached, missing))
    }
}
