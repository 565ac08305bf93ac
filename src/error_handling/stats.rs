//! Lookup statistics tracking.
//!
//! This module provides thread-safe counters for geolocation lookup events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use super::types::LookupEvent;

/// Thread-safe lookup statistics tracker.
///
/// Every `LookupEvent` gets an atomic counter initialized to zero on creation,
/// so the tracker can be shared across concurrent lookups behind an `Arc`.
pub struct LookupStats {
    counters: HashMap<LookupEvent, AtomicUsize>,
}

impl LookupStats {
    pub fn new() -> Self {
        let mut counters = HashMap::new();
        for event in LookupEvent::iter() {
            counters.insert(event, AtomicUsize::new(0));
        }
        LookupStats { counters }
    }

    /// Increment the counter for `event` by one.
    pub fn increment(&self, event: LookupEvent) {
        self.add(event, 1);
    }

    /// Increment the counter for `event` by `count`.
    pub fn add(&self, event: LookupEvent, count: usize) {
        if let Some(counter) = self.counters.get(&event) {
            counter.fetch_add(count, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment counter for {:?} which is not in the map. \
                 This indicates a bug in LookupStats initialization.",
                event
            );
        }
    }

    /// Get the count for an event.
    pub fn get_count(&self, event: LookupEvent) -> usize {
        self.counters
            .get(&event)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Number of HTTP requests issued (single and batch).
    pub fn total_requests(&self) -> usize {
        self.get_count(LookupEvent::SingleRequest) + self.get_count(LookupEvent::BatchRequest)
    }

    /// Logs every non-zero counter at info level.
    pub fn log_summary(&self) {
        let mut any = false;
        for event in LookupEvent::iter() {
            let count = self.get_count(event);
            if count > 0 {
                log::info!("{}: {}", event, count);
                any = true;
            }
        }
        if !any {
            log::info!("No geolocation activity");
        }
    }
}

impl Default for LookupStats {
    fn default() -> Self {
        Self::new()
    }
}
