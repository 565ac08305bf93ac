//! SQLite backend for the geolocation cache and cooldown record.

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::config::COOLDOWN_RECORD_KEY;
use crate::error_handling::StoreError;
use crate::geolocation::GeolocationRecord;

use super::pool::init_db_pool_with_path;
use super::run_migrations;
use super::traits::{CacheFilter, CooldownStore, GeolocationStore};

const SELECT_COLUMNS: &str = "SELECT address, country, country_code, region, region_name, city,
    latitude, longitude, isp, org, asn, as_name, is_hosting, error_message, created_at_ms
    FROM geolocation_cache";

/// Addresses bound per select; SQLite caps host parameters per statement.
const QUERY_CHUNK_SIZE: usize = 500;

/// Durable store backed by a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Arc<SqlitePool>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `db_path` and applies migrations.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let pool = init_db_pool_with_path(db_path).await?;
        run_migrations(&pool).await?;
        Ok(SqliteStore { pool })
    }

    /// Wraps a pool whose schema is already migrated.
    pub fn from_pool(pool: Arc<SqlitePool>) -> Self {
        SqliteStore { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn record_from_row(row: &SqliteRow) -> Result<GeolocationRecord, StoreError> {
    let address: String = row.try_get("address")?;
    let query_address: IpAddr = address
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("unparsable address {:?}", address)))?;
    let created_at_ms: i64 = row.try_get("created_at_ms")?;
    let created_at = DateTime::from_timestamp_millis(created_at_ms).ok_or_else(|| {
        StoreError::Corrupt(format!(
            "creation time {} out of range for {}",
            created_at_ms, address
        ))
    })?;

    Ok(GeolocationRecord {
        query_address,
        country: row.try_get("country")?,
        country_code: row.try_get("country_code")?,
        region: row.try_get("region")?,
        region_name: row.try_get("region_name")?,
        city: row.try_get("city")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        isp: row.try_get("isp")?,
        org: row.try_get("org")?,
        asn: row.try_get("asn")?,
        as_name: row.try_get("as_name")?,
        is_hosting: row.try_get("is_hosting")?,
        error_message: row.try_get("error_message")?,
        created_at,
    })
}

impl SqliteStore {
    /// Runs one filtered select. `addresses` replaces the filter's own set.
    async fn query_chunk(
        &self,
        filter: &CacheFilter,
        addresses: Option<&[IpAddr]>,
    ) -> Result<Vec<GeolocationRecord>, StoreError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_COLUMNS);
        builder.push(" WHERE 1 = 1");

        if let Some(addresses) = addresses {
            builder.push(" AND address IN (");
            let mut separated = builder.separated(", ");
            for address in addresses {
                separated.push_bind(address.to_string());
            }
            separated.push_unseparated(")");
        }
        if let Some(after) = filter.created_after {
            builder
                .push(" AND created_at_ms > ")
                .push_bind(after.timestamp_millis());
        }
        if let Some(before) = filter.created_before {
            builder
                .push(" AND created_at_ms < ")
                .push_bind(before.timestamp_millis());
        }
        builder.push(" ORDER BY address");

        let rows = builder.build().fetch_all(self.pool.as_ref()).await?;
        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl GeolocationStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<GeolocationRecord>, StoreError> {
        let row = sqlx::query(&format!("{} WHERE address = ?", SELECT_COLUMNS))
            .bind(key)
            .fetch_optional(self.pool.as_ref())
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn query(&self, filter: &CacheFilter) -> Result<Vec<GeolocationRecord>, StoreError> {
        let Some(addresses) = &filter.addresses else {
            return self.query_chunk(filter, None).await;
        };

        let addresses: Vec<IpAddr> = addresses.iter().copied().collect();
        let mut records = Vec::new();
        for chunk in addresses.chunks(QUERY_CHUNK_SIZE) {
            records.extend(self.query_chunk(filter, Some(chunk)).await?);
        }
        if addresses.len() > QUERY_CHUNK_SIZE {
            // Each chunk is ordered; restore the order across chunks
            records.sort_by_cached_key(GeolocationRecord::key);
        }
        Ok(records)
    }

    async fn upsert(&self, record: &GeolocationRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO geolocation_cache (
                address, country, country_code, region, region_name, city,
                latitude, longitude, isp, org, asn, as_name, is_hosting,
                error_message, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(address) DO UPDATE SET
                country=excluded.country,
                country_code=excluded.country_code,
                region=excluded.region,
                region_name=excluded.region_name,
                city=excluded.city,
                latitude=excluded.latitude,
                longitude=excluded.longitude,
                isp=excluded.isp,
                org=excluded.org,
                asn=excluded.asn,
                as_name=excluded.as_name,
                is_hosting=excluded.is_hosting,
                error_message=excluded.error_message,
                created_at_ms=MAX(geolocation_cache.created_at_ms, excluded.created_at_ms)",
        )
        .bind(record.key())
        .bind(&record.country)
        .bind(&record.country_code)
        .bind(&record.region)
        .bind(&record.region_name)
        .bind(&record.city)
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(&record.isp)
        .bind(&record.org)
        .bind(&record.asn)
        .bind(&record.as_name)
        .bind(record.is_hosting)
        .bind(&record.error_message)
        .bind(record.created_at.timestamp_millis())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM geolocation_cache WHERE address = ?")
            .bind(key)
            .execute(self.pool.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CooldownStore for SqliteStore {
    async fn load_cooldown(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let ends_at_ms: Option<i64> =
            sqlx::query_scalar("SELECT ends_at_ms FROM cooldown_state WHERE name = ?")
                .bind(COOLDOWN_RECORD_KEY)
                .fetch_optional(self.pool.as_ref())
                .await?;

        match ends_at_ms {
            None => Ok(None),
            Some(ms) => DateTime::from_timestamp_millis(ms)
                .map(Some)
                .ok_or_else(|| StoreError::Corrupt(format!("cooldown end {} out of range", ms))),
        }
    }

    async fn save_cooldown(&self, ends_at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO cooldown_state (name, ends_at_ms) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET ends_at_ms=excluded.ends_at_ms",
        )
        .bind(COOLDOWN_RECORD_KEY)
        .bind(ends_at.timestamp_millis())
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }

    async fn clear_cooldown(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cooldown_state WHERE name = ?")
            .bind(COOLDOWN_RECORD_KEY)
            .execute(self.pool.as_ref())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_helpers::{create_test_pool, create_test_record, days_ago};
    use tempfile::TempDir;

    async fn create_test_store() -> SqliteStore {
        SqliteStore::from_pool(Arc::new(create_test_pool().await))
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = create_test_store().await;
        let record = create_test_record("8.8.8.8", days_ago(1));

        store.upsert(&record).await.expect("upsert");
        let loaded = store.get("8.8.8.8").await.expect("get");
        assert_eq!(loaded, Some(record));
        assert_eq!(store.get("8.8.4.4").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_fields() {
        let store = create_test_store().await;
        let mut record = create_test_record("8.8.8.8", days_ago(2));
        store.upsert(&record).await.expect("upsert");

        record.city = Some("Kansas City".to_string());
        record.latitude = None;
        record.created_at = days_ago(1);
        store.upsert(&record).await.expect("upsert");

        let loaded = store.get("8.8.8.8").await.expect("get").expect("present");
        assert_eq!(loaded.city.as_deref(), Some("Kansas City"));
        assert_eq!(loaded.latitude, None);
        assert_eq!(loaded.created_at, record.created_at);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM geolocation_cache")
            .fetch_one(store.pool())
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_upsert_never_moves_created_at_backwards() {
        let store = create_test_store().await;
        let newer = create_test_record("8.8.8.8", days_ago(1));
        store.upsert(&newer).await.expect("upsert");

        let older = create_test_record("8.8.8.8", days_ago(10));
        store.upsert(&older).await.expect("upsert");

        let loaded = store.get("8.8.8.8").await.expect("get").expect("present");
        assert_eq!(loaded.created_at, newer.created_at);
    }

    #[tokio::test]
    async fn test_query_by_addresses_and_age() {
        let store = create_test_store().await;
        store
            .upsert(&create_test_record("8.8.8.8", days_ago(1)))
            .await
            .unwrap();
        store
            .upsert(&create_test_record("1.1.1.1", days_ago(30)))
            .await
            .unwrap();
        store
            .upsert(&create_test_record("2606:4700::1111", days_ago(2)))
            .await
            .unwrap();

        let filter = CacheFilter::for_addresses([
            "8.8.8.8".parse().unwrap(),
            "1.1.1.1".parse().unwrap(),
            "9.9.9.9".parse().unwrap(),
        ])
        .created_after(days_ago(21));
        let fresh = store.query(&filter).await.expect("query");
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].key(), "8.8.8.8");

        let stale = store
            .query(&CacheFilter::all().created_before(days_ago(21)))
            .await
            .expect("query");
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].key(), "1.1.1.1");

        assert_eq!(store.query(&CacheFilter::all()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_query_with_empty_address_set() {
        let store = create_test_store().await;
        store
            .upsert(&create_test_record("8.8.8.8", days_ago(1)))
            .await
            .unwrap();
        let result = store
            .query(&CacheFilter::for_addresses(Vec::new()))
            .await
            .expect("query");
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_query_with_more_addresses_than_one_select_binds() {
        let store = create_test_store().await;
        for address in ["3.3.3.3", "20.0.2.138", "20.0.4.175", "8.8.8.8"] {
            store
                .upsert(&create_test_record(address, days_ago(1)))
                .await
                .unwrap();
        }

        let mut addresses: Vec<IpAddr> = (0..1200u32)
            .map(|n| IpAddr::from([20, 0, (n / 256) as u8, (n % 256) as u8]))
            .collect();
        addresses.push("3.3.3.3".parse().unwrap());
        let found = store
            .query(&CacheFilter::for_addresses(addresses))
            .await
            .expect("query");

        let keys: Vec<String> = found.iter().map(|r| r.key()).collect();
        assert_eq!(keys, vec!["20.0.2.138", "20.0.4.175", "3.3.3.3"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = create_test_store().await;
        store
            .upsert(&create_test_record("8.8.8.8", days_ago(1)))
            .await
            .unwrap();
        assert!(store.delete("8.8.8.8").await.expect("delete"));
        assert!(!store.delete("8.8.8.8").await.expect("delete"));
        assert_eq!(store.get("8.8.8.8").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_address_is_reported() {
        let store = create_test_store().await;
        sqlx::query(
            "INSERT INTO geolocation_cache (address, is_hosting, created_at_ms) VALUES (?, 0, ?)",
        )
        .bind("not-an-address")
        .bind(days_ago(1).timestamp_millis())
        .execute(store.pool())
        .await
        .unwrap();

        let result = store.get("not-an-address").await;
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_cooldown_round_trip() {
        let store = create_test_store().await;
        assert_eq!(store.load_cooldown().await.unwrap(), None);

        let ends_at = DateTime::from_timestamp_millis(1_900_000_000_123).unwrap();
        store.save_cooldown(ends_at).await.unwrap();
        assert_eq!(store.load_cooldown().await.unwrap(), Some(ends_at));

        let later = DateTime::from_timestamp_millis(1_900_000_060_000).unwrap();
        store.save_cooldown(later).await.unwrap();
        assert_eq!(store.load_cooldown().await.unwrap(), Some(later));

        store.clear_cooldown().await.unwrap();
        assert_eq!(store.load_cooldown().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_persists_across_reopen() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("cache.db");

        let record = create_test_record("8.8.8.8", days_ago(3));
        {
            let store = SqliteStore::open(&path).await.expect("open");
            store.upsert(&record).await.unwrap();
            store.pool().close().await;
        }

        let reopened = SqliteStore::open(&path).await.expect("reopen");
        assert_eq!(reopened.get("8.8.8.8").await.unwrap(), Some(record));
    }
}
