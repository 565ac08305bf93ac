//! Traceroute capture and canonical route models.

use std::collections::HashSet;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One traceroute run as captured on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerouteCapture {
    /// Unix seconds
    pub timestamp: i64,
    pub destination_name: String,
    #[serde(default)]
    pub destination_ip: Option<IpAddr>,
    #[serde(default)]
    pub hops: Vec<Hop>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub hop: u32,
    #[serde(default)]
    pub probes: Vec<Probe>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    /// `None` when the probe timed out
    #[serde(default)]
    pub ip: Option<IpAddr>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "rtt", default)]
    pub rtt_ms: f32,
}

impl Hop {
    /// The probe that represents this hop.
    pub fn leading_probe(&self) -> Option<&Probe> {
        self.probes.first()
    }
}

impl TracerouteCapture {
    pub fn observed_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_default()
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// Addresses of the leading probe of each hop, skipping unanswered hops.
    pub fn hop_addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.hops
            .iter()
            .filter_map(|hop| hop.leading_probe()?.ip)
            .map(|ip| ip.to_canonical())
    }

    pub(crate) fn address_set(&self) -> HashSet<IpAddr> {
        self.hop_addresses().collect()
    }
}

/// A distinct path to a destination, with every time it was observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRoute {
    /// Sequential from 1 across one deduplication run
    pub id: usize,
    pub destination: String,
    /// Leading probe of each hop of the representative capture
    pub hops: Vec<Option<Probe>>,
    /// Ascending
    pub occurrences: Vec<DateTime<Utc>>,
}

impl CanonicalRoute {
    pub fn hop_addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.hops.iter().filter_map(|probe| probe.as_ref()?.ip)
    }

    pub fn first_seen(&self) -> Option<DateTime<Utc>> {
        self.occurrences.first().copied()
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.occurrences.last().copied()
    }
}
