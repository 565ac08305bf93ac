//! Process-local store, used when no database is wanted and in tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error_handling::StoreError;
use crate::geolocation::GeolocationRecord;

use super::traits::{CacheFilter, CooldownStore, GeolocationStore};

/// In-memory implementation of both store traits.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, GeolocationRecord>>,
    cooldown: RwLock<Option<DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Corrupt("memory store lock poisoned".to_string())
}

#[async_trait]
impl GeolocationStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<GeolocationRecord>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(key).cloned())
    }

    async fn query(&self, filter: &CacheFilter) -> Result<Vec<GeolocationRecord>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        let mut matched: Vec<GeolocationRecord> = records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matched.sort_by_key(|r| r.key());
        Ok(matched)
    }

    async fn upsert(&self, record: &GeolocationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let mut stored = record.clone();
        if let Some(existing) = records.get(&record.key()) {
            stored.created_at = stored.created_at.max(existing.created_at);
        }
        records.insert(record.key(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        Ok(records.remove(key).is_some())
    }
}

#[async_trait]
impl CooldownStore for MemoryStore {
    async fn load_cooldown(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(*self.cooldown.read().map_err(poisoned)?)
    }

    async fn save_cooldown(&self, ends_at: DateTime<Utc>) -> Result<(), StoreError> {
        *self.cooldown.write().map_err(poisoned)? = Some(ends_at);
        Ok(())
    }

    async fn clear_cooldown(&self) -> Result<(), StoreError> {
        *self.cooldown.write().map_err(poisoned)? = None;
        Ok(())
    }
}
