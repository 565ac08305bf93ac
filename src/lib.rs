//! route_atlas library: traceroute route deduplication and hop geolocation
//!
//! This library collapses repeated traceroute captures into canonical routes
//! and geolocates addresses through a cached, rate-limit aware ip-api.com
//! client.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use route_atlas::geolocation::{GeolocationService, IpApiClient};
//! use route_atlas::storage::SqliteStore;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::open(std::path::Path::new("./route_atlas.db")).await?);
//! let api = IpApiClient::new(Arc::new(reqwest::Client::new()), "http://ip-api.com", None)?;
//! let service = GeolocationService::new(store.clone(), store, api, 21).await?;
//!
//! for record in service.perform_lookup(["1.1.1.1".parse()?]).await? {
//!     println!("{}: {:?}", record.query_address, record.place());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! Geolocation and capture loading require a Tokio runtime. Route
//! deduplication is synchronous.

pub mod capture;
pub mod config;
pub mod error_handling;
pub mod geolocation;
pub mod initialization;
pub mod ping;
pub mod routes;
pub mod storage;

// Re-export public API
pub use capture::{load_captures, LoadedCaptures};
pub use config::{Command, Config, LogFormat, LogLevel};
pub use geolocation::{CooldownStatus, GeolocationRecord, GeolocationService};
pub use routes::{dedupe, CanonicalRoute, TracerouteCapture};
pub use run::{run, RunReport};

// Command dispatch for the CLI binary
mod run {
    use std::collections::HashMap;
    use std::fmt::Write as _;
    use std::net::IpAddr;
    use std::path::Path;
    use std::sync::Arc;

    use anyhow::{Context, Result};
    use log::{info, warn};
    use serde::Serialize;

    use crate::capture::load_captures;
    use crate::config::{Command, Config};
    use crate::geolocation::{
        cache_key, CooldownStatus, CooldownTracker, GeolocationRecord, GeolocationService,
        IpApiClient,
    };
    use crate::initialization::init_client;
    use crate::ping::{summarize, PingCapture, PingHostSummary};
    use crate::routes::{dedupe, CanonicalRoute, TracerouteCapture};
    use crate::storage::SqliteStore;

    /// Outcome of one CLI command.
    #[derive(Debug, Clone)]
    pub struct RunReport {
        /// Rendered command output, text or JSON
        pub output: String,
        /// Items produced (routes, records, summaries or purged entries)
        pub items: usize,
        /// Capture files that could not be decoded
        pub skipped: usize,
        pub elapsed_seconds: f64,
    }

    /// Executes the command selected in `config`.
    ///
    /// # Errors
    ///
    /// Fails when the cache database cannot be opened, the HTTP client
    /// cannot be built, a capture directory cannot be listed, or the cache
    /// store fails during a lookup. Unreachable or rate-limited geolocation
    /// only leaves addresses unresolved.
    pub async fn run(config: Config) -> Result<RunReport> {
        let start = std::time::Instant::now();

        let (output, items, skipped) = match &config.command {
            Command::Routes {
                dir,
                geolocate,
                json,
            } => run_routes(&config, dir, *geolocate, *json).await?,
            Command::Geolocate { addresses, json } => {
                run_geolocate(&config, addresses, *json).await?
            }
            Command::Ping { dir, json } => run_ping(dir, *json).await?,
            Command::Cooldown => run_cooldown(&config).await?,
            Command::Purge => run_purge(&config).await?,
        };

        Ok(RunReport {
            output,
            items,
            skipped,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })
    }

    async fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
        let store = SqliteStore::open(&config.db_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open geolocation cache {}",
                    config.db_path.display()
                )
            })?;
        Ok(Arc::new(store))
    }

    async fn open_service(config: &Config) -> Result<GeolocationService> {
        let store = open_store(config).await?;
        let client = init_client(config).context("Failed to initialize HTTP client")?;
        let api = IpApiClient::new(client, &config.api_base_url, Some(config.language.clone()))
            .context("Failed to initialize geolocation client")?;
        let service = GeolocationService::new(store.clone(), store, api, config.cache_ttl_days)
            .await
            .context("Failed to load geolocation cooldown")?;

        if let CooldownStatus::Active { ends_at } = service.cooldown_status() {
            warn!(
                "Geolocation is rate limited until {}; only cached locations are available",
                ends_at
            );
        }
        Ok(service)
    }

    #[derive(Serialize)]
    struct LocatedRoute<'a> {
        #[serde(flatten)]
        route: &'a CanonicalRoute,
        /// One entry per hop
        #[serde(skip_serializing_if = "Option::is_none")]
        locations: Option<Vec<Option<&'a GeolocationRecord>>>,
    }

    async fn run_routes(
        config: &Config,
        dir: &Path,
        geolocate: bool,
        json: bool,
    ) -> Result<(String, usize, usize)> {
        let loaded = load_captures::<TracerouteCapture>(dir)
            .await
            .context("Failed to load traceroute captures")?;
        if !loaded.skipped.is_empty() {
            warn!("Skipped {} malformed capture(s)", loaded.skipped.len());
        }

        let routes = dedupe(&loaded.items);
        info!(
            "Collapsed {} traceroute capture(s) into {} route(s)",
            loaded.items.len(),
            routes.len()
        );

        let records: HashMap<String, GeolocationRecord> = if geolocate {
            let service = open_service(config).await?;
            let found = service
                .perform_lookup(routes.iter().flat_map(|r| r.hop_addresses()))
                .await
                .context("Geolocation lookup failed")?;
            service.stats().log_summary();
            found.into_iter().map(|r| (r.key(), r)).collect()
        } else {
            HashMap::new()
        };

        let output = if json {
            let located: Vec<LocatedRoute<'_>> = routes
                .iter()
                .map(|route| LocatedRoute {
                    route,
                    locations: geolocate.then(|| locate(route, &records)),
                })
                .collect();
            serde_json::to_string_pretty(&located).context("Failed to serialize routes")?
        } else {
            let mut out = String::new();
            for route in &routes {
                write_route(&mut out, route, &locate(route, &records));
            }
            out
        };

        Ok((output, routes.len(), loaded.skipped.len()))
    }

    /// Location of each hop, aligned with `route.hops`.
    fn locate<'a>(
        route: &CanonicalRoute,
        records: &'a HashMap<String, GeolocationRecord>,
    ) -> Vec<Option<&'a GeolocationRecord>> {
        route
            .hops
            .iter()
            .map(|probe| {
                let ip = probe.as_ref()?.ip?;
                records.get(&cache_key(&ip))
            })
            .collect()
    }

    fn write_route(out: &mut String, route: &CanonicalRoute, locations: &[Option<&GeolocationRecord>]) {
        let seen = match (route.first_seen(), route.last_seen()) {
            (Some(first), Some(last)) if first != last => format!("{} .. {}", first, last),
            (Some(first), _) => first.to_string(),
            _ => "never".to_string(),
        };
        let _ = writeln!(
            out,
            "{} route #{}: {} hop(s), seen {} time(s) ({})",
            route.destination,
            route.id,
            route.hops.len(),
            route.occurrences.len(),
            seen
        );

        for (index, probe) in route.hops.iter().enumerate() {
            let Some(probe) = probe else {
                let _ = writeln!(out, "  {:>2}  *", index + 1);
                continue;
            };
            let address = probe
                .ip
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "*".to_string());
            let _ = write!(out, "  {:>2}  {:<39} {:>8.2} ms", index + 1, address, probe.rtt_ms);
            if let Some(name) = probe.name.as_deref().filter(|n| !n.is_empty()) {
                let _ = write!(out, "  {}", name);
            }
            if let Some(Some(record)) = locations.get(index) {
                let _ = write!(out, "  [{}]", describe(record));
            }
            out.push('\n');
        }
    }

    fn describe(record: &GeolocationRecord) -> String {
        if let Some(message) = &record.error_message {
            return format!("unavailable: {}", message);
        }
        let place = record.place().unwrap_or_else(|| "unknown".to_string());
        match &record.asn {
            Some(asn) => format!("{}, {}", place, asn),
            None => place,
        }
    }

    async fn run_geolocate(
        config: &Config,
        addresses: &[IpAddr],
        json: bool,
    ) -> Result<(String, usize, usize)> {
        let service = open_service(config).await?;
        let records = service
            .perform_lookup(addresses.iter().copied())
            .await
            .context("Geolocation lookup failed")?;
        service.stats().log_summary();

        let output = if json {
            serde_json::to_string_pretty(&records).context("Failed to serialize records")?
        } else {
            let by_key: HashMap<String, &GeolocationRecord> =
                records.iter().map(|r| (r.key(), r)).collect();
            let mut out = String::new();
            for address in addresses {
                let key = cache_key(address);
                match by_key.get(&key) {
                    Some(record) => {
                        let _ = writeln!(out, "{}: {}", key, describe(record));
                    }
                    None => {
                        let _ = writeln!(out, "{}: unresolved", key);
                    }
                }
            }
            out
        };
        Ok((output, records.len(), 0))
    }

    async fn run_ping(dir: &Path, json: bool) -> Result<(String, usize, usize)> {
        let loaded = load_captures::<PingCapture>(dir)
            .await
            .context("Failed to load ping captures")?;
        let summaries = summarize(&loaded.items);

        let output = if json {
            serde_json::to_string_pretty(&summaries).context("Failed to serialize summaries")?
        } else {
            let mut out = String::new();
            for summary in &summaries {
                write_ping_summary(&mut out, summary);
            }
            out
        };
        Ok((output, summaries.len(), loaded.skipped.len()))
    }

    fn write_ping_summary(out: &mut String, summary: &PingHostSummary) {
        let rtt = match (summary.mean_rtt_ms, summary.worst_rtt_ms) {
            (Some(mean), Some(worst)) => format!("avg {:.2} ms, worst {:.2} ms", mean, worst),
            _ => "no replies".to_string(),
        };
        let _ = writeln!(
            out,
            "{}: {} run(s), {}/{} received ({:.1}% loss), {} [{} .. {}]",
            summary.destination,
            summary.runs,
            summary.packets_received,
            summary.packets_transmitted,
            summary.packet_loss_percent,
            rtt,
            summary.first_seen,
            summary.last_seen
        );
    }

    async fn run_cooldown(config: &Config) -> Result<(String, usize, usize)> {
        let store = open_store(config).await?;
        let tracker = CooldownTracker::load(store)
            .await
            .context("Failed to load geolocation cooldown")?;
        let output = match tracker.status() {
            CooldownStatus::Cleared => "No geolocation cooldown active\n".to_string(),
            CooldownStatus::Active { ends_at } => {
                format!("Geolocation cooldown active until {}\n", ends_at)
            }
        };
        Ok((output, usize::from(tracker.is_active()), 0))
    }

    async fn run_purge(config: &Config) -> Result<(String, usize, usize)> {
        let service = open_service(config).await?;
        let removed = service
            .purge_expired()
            .await
            .context("Failed to purge expired cache entries")?;
        Ok((
            format!("Removed {} expired cache entr{}\n", removed, if removed == 1 { "y" } else { "ies" }),
            removed,
            0,
        ))
    }
}
