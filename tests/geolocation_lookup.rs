//! End-to-end geolocation tests against a mock ip-api.com server and an
//! on-disk SQLite cache.

mod helpers;

use std::net::IpAddr;
use std::sync::Arc;

use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::json;
use tempfile::TempDir;

use route_atlas::config::CACHE_EXPIRY_DAYS;
use route_atlas::geolocation::{CooldownStatus, GeolocationService};
use route_atlas::storage::{CacheFilter, GeolocationStore, SqliteStore};

use helpers::{api_for, located};

async fn open_service(server: &Server, dir: &TempDir) -> (GeolocationService, Arc<SqliteStore>) {
    let store = Arc::new(
        SqliteStore::open(&dir.path().join("cache.db"))
            .await
            .expect("Failed to open cache"),
    );
    let service = GeolocationService::new(
        store.clone(),
        store.clone(),
        api_for(server),
        CACHE_EXPIRY_DAYS,
    )
    .await
    .expect("Failed to build service");
    (service, store)
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let dir = TempDir::new().unwrap();
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/batch"),
            request::query(url_decoded(contains(("lang", "en")))),
        ])
        .times(1)
        .respond_with(json_encoded(json!([
            located("1.1.1.1", "Sydney", "Australia"),
            located("8.8.8.8", "Ashburn", "United States"),
        ]))),
    );

    let first = {
        let (service, _) = open_service(&server, &dir).await;
        service
            .perform_lookup([ip("8.8.8.8"), ip("1.1.1.1"), ip("10.1.1.1")])
            .await
            .unwrap()
    };
    assert_eq!(first.len(), 2);

    let (service, store) = open_service(&server, &dir).await;
    let second = service
        .perform_lookup([ip("1.1.1.1"), ip("8.8.8.8")])
        .await
        .unwrap();
    assert_eq!(second.len(), 2);
    assert_eq!(service.stats().total_requests(), 0);

    let stored = store.query(&CacheFilter::all()).await.unwrap();
    assert_eq!(stored.len(), 2);
    let sydney = stored.iter().find(|r| r.key() == "1.1.1.1").unwrap();
    assert_eq!(sydney.place().as_deref(), Some("Sydney, Australia"));
    assert_eq!(sydney.asn.as_deref(), Some("AS64500 Example Networks"));
}

#[tokio::test]
async fn test_cooldown_survives_restart() {
    let dir = TempDir::new().unwrap();
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/json/9.9.9.9"))
            .times(1)
            .respond_with(
                status_code(429)
                    .append_header("X-Rl", "0")
                    .append_header("X-Ttl", "120")
                    .body("rate limited"),
            ),
    );

    {
        let (service, _) = open_service(&server, &dir).await;
        let records = service.perform_lookup([ip("9.9.9.9")]).await.unwrap();
        assert!(records.is_empty());
        assert!(service.cooldown_status().is_active());
    }

    // No further request may reach the server while the cooldown runs
    let (service, _) = open_service(&server, &dir).await;
    assert!(matches!(
        service.cooldown_status(),
        CooldownStatus::Active { .. }
    ));
    let records = service
        .perform_lookup([ip("9.9.9.9"), ip("1.1.1.1")])
        .await
        .unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_mapped_address_shares_cache_entry() {
    let dir = TempDir::new().unwrap();
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/json/8.8.4.4"))
            .times(1)
            .respond_with(json_encoded(located("8.8.4.4", "Ashburn", "United States"))),
    );
    let (service, _) = open_service(&server, &dir).await;

    let plain = service.perform_single_lookup(ip("8.8.4.4")).await.unwrap();
    let mapped = service
        .perform_single_lookup(ip("::ffff:8.8.4.4"))
        .await
        .unwrap();
    assert!(plain.is_some());
    assert_eq!(plain, mapped);
}

#[tokio::test]
async fn test_unlocatable_address_is_cached_with_message() {
    let dir = TempDir::new().unwrap();
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/json/192.0.2.1"))
            .times(1)
            .respond_with(json_encoded(json!({
                "query": "192.0.2.1",
                "message": "reserved range"
            }))),
    );
    let (service, store) = open_service(&server, &dir).await;

    let record = service
        .perform_single_lookup(ip("192.0.2.1"))
        .await
        .unwrap()
        .expect("failed lookups are still recorded");
    assert_eq!(record.error_message.as_deref(), Some("reserved range"));
    assert_eq!(record.coordinates(), None);

    // Served from the cache the second time
    service.perform_single_lookup(ip("192.0.2.1")).await.unwrap();
    assert!(store.get("192.0.2.1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_cooldown_subscribers_see_engagement() {
    let dir = TempDir::new().unwrap();
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/batch"))
            .times(1)
            .respond_with(
                status_code(200)
                    .append_header("X-Rl", "1")
                    .append_header("X-Ttl", "30")
                    .body(
                        json!([located("1.1.1.1", "Sydney", "Australia")]).to_string(),
                    ),
            ),
    );
    let (service, _) = open_service(&server, &dir).await;
    let mut updates = service.subscribe();
    assert_eq!(*updates.borrow_and_update(), CooldownStatus::Cleared);

    let records = service
        .perform_lookup([ip("1.1.1.1"), ip("8.8.8.8")])
        .await
        .unwrap();
    // 1.1.1.1 resolved; 8.8.8.8 deferred by the cooldown
    assert_eq!(records.len(), 1);

    updates.changed().await.expect("cooldown notification");
    assert!(updates.borrow().is_active());
}
