//! Traceroute route deduplication.

mod dedupe;
mod models;

pub use dedupe::dedupe;
pub use models::{CanonicalRoute, Hop, Probe, TracerouteCapture};
