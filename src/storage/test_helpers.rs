//! Shared test helpers for storage module tests.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::geolocation::GeolocationRecord;
use crate::storage::run_migrations;

/// Creates a test database pool with migrations applied.
/// Uses an in-memory database for fast test execution.
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create test database pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// Creates a populated geolocation record for `address`.
pub fn create_test_record(address: &str, created_at: DateTime<Utc>) -> GeolocationRecord {
    let ip: IpAddr = address.parse().expect("valid test address");
    let mut record = GeolocationRecord::new(ip, created_at);
    record.country = Some("United States".to_string());
    record.country_code = Some("US".to_string());
    record.region = Some("CA".to_string());
    record.region_name = Some("California".to_string());
    record.city = Some("Mountain View".to_string());
    record.latitude = Some(37.4056);
    record.longitude = Some(-122.0775);
    record.isp = Some("Google LLC".to_string());
    record.org = Some("Google Public DNS".to_string());
    record.asn = Some("AS15169 Google LLC".to_string());
    record.as_name = Some("GOOGLE".to_string());
    record.is_hosting = true;
    record
}

/// A timestamp `days` days before now, at millisecond precision.
pub fn days_ago(days: i64) -> DateTime<Utc> {
    crate::geolocation::now_millis() - chrono::Duration::days(days)
}
