// Shared test helpers for capture files and mock geolocation servers.
//
// This module provides common utilities used across multiple test files to reduce duplication.

use std::path::Path;
use std::sync::Arc;

use httptest::Server;
use serde_json::{json, Value};

use route_atlas::geolocation::IpApiClient;

/// Builds a geolocation client pointed at the mock server.
#[allow(dead_code)] // Used by other test files
pub fn api_for(server: &Server) -> IpApiClient {
    IpApiClient::new(
        Arc::new(reqwest::Client::new()),
        &format!("http://{}", server.addr()),
        Some("en".to_string()),
    )
    .expect("Failed to build geolocation client")
}

/// An ip-api.com style record for `address`.
#[allow(dead_code)]
pub fn located(address: &str, city: &str, country: &str) -> Value {
    json!({
        "query": address,
        "country": country,
        "countryCode": "XX",
        "city": city,
        "lat": 1.5,
        "lon": 2.5,
        "as": "AS64500 Example Networks",
        "hosting": false
    })
}

/// Writes a traceroute capture whose hops answer from `hops` (`None` for `*`).
#[allow(dead_code)]
pub fn write_trace(dir: &Path, file: &str, timestamp: i64, destination: &str, hops: &[Option<&str>]) {
    let hops: Vec<Value> = hops
        .iter()
        .enumerate()
        .map(|(i, ip)| {
            json!({
                "hop": i + 1,
                "probes": [{ "ip": ip, "name": ip, "rtt": 1.5 * (i as f64 + 1.0) }]
            })
        })
        .collect();
    let capture = json!({
        "timestamp": timestamp,
        "destination_name": destination,
        "destination_ip": null,
        "hops": hops
    });
    std::fs::write(dir.join(file), capture.to_string()).expect("Failed to write trace");
}
