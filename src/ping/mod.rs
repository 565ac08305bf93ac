//! Ping capture models and per-destination summaries.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ping run as captured on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingCapture {
    pub destination: String,
    #[serde(default)]
    pub destination_ip: Option<IpAddr>,
    #[serde(default)]
    pub data_bytes: u32,
    pub packets_transmitted: u32,
    pub packets_received: u32,
    #[serde(default)]
    pub packet_loss_percent: f32,
    #[serde(default)]
    pub time_ms: f32,
    #[serde(default, rename = "round_trip_time_min")]
    pub rtt_min_ms: f32,
    #[serde(default, rename = "round_trip_time_avg")]
    pub rtt_avg_ms: f32,
    #[serde(default, rename = "round_trip_time_max")]
    pub rtt_max_ms: f32,
    #[serde(default, rename = "round_trip_time_stddev")]
    pub rtt_stddev_ms: f32,
    /// Unix seconds
    pub timestamp: i64,
    #[serde(default)]
    pub responses: Vec<PingResponse>,
}

/// A single echo reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub bytes: u32,
    #[serde(default)]
    pub response_ip: Option<IpAddr>,
    #[serde(default, alias = "imcp_seq")]
    pub icmp_seq: u32,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub time_ms: f32,
    #[serde(default)]
    pub duplicate: bool,
}

impl PingCapture {
    pub fn observed_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_default()
    }
}

/// Aggregate over every run against one destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingHostSummary {
    pub destination: String,
    pub runs: usize,
    pub packets_transmitted: u64,
    pub packets_received: u64,
    /// Share of transmitted packets that got no reply, over all runs
    pub packet_loss_percent: f64,
    /// Mean of the per-run average RTT, over runs that received a reply
    pub mean_rtt_ms: Option<f64>,
    pub worst_rtt_ms: Option<f64>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Summarizes `captures` per destination, in first-seen order.
pub fn summarize(captures: &[PingCapture]) -> Vec<PingHostSummary> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&PingCapture>> = HashMap::new();
    for capture in captures {
        let runs = groups.entry(capture.destination.as_str()).or_default();
        if runs.is_empty() {
            order.push(capture.destination.as_str());
        }
        runs.push(capture);
    }

    order
        .into_iter()
        .filter_map(|destination| {
            let runs = groups.remove(destination)?;
            Some(summarize_destination(destination, &runs))
        })
        .collect()
}

fn summarize_destination(destination: &str, runs: &[&PingCapture]) -> PingHostSummary {
    let transmitted: u64 = runs.iter().map(|r| u64::from(r.packets_transmitted)).sum();
    let received: u64 = runs.iter().map(|r| u64::from(r.packets_received)).sum();
    let packet_loss_percent = if transmitted == 0 {
        0.0
    } else {
        (transmitted.saturating_sub(received)) as f64 * 100.0 / transmitted as f64
    };

    let answered: Vec<&&PingCapture> = runs.iter().filter(|r| r.packets_received > 0).collect();
    let mean_rtt_ms = if answered.is_empty() {
        None
    } else {
        let total: f64 = answered.iter().map(|r| f64::from(r.rtt_avg_ms)).sum();
        Some(total / answered.len() as f64)
    };
    let worst_rtt_ms = answered
        .iter()
        .map(|r| f64::from(r.rtt_max_ms))
        .reduce(f64::max);

    let observed = runs.iter().map(|r| r.observed_at());
    let first_seen = observed.clone().min().unwrap_or_default();
    let last_seen = observed.max().unwrap_or_default();

    PingHostSummary {
        destination: destination.to_string(),
        runs: runs.len(),
        packets_transmitted: transmitted,
        packets_received: received,
        packet_loss_percent,
        mean_rtt_ms,
        worst_rtt_ms,
        first_seen,
        last_seen,
    }
}
