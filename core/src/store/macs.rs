//! Deduplicated station sightings.
//!
//! During an active sniff the peripheral can emit many sightings per second,
//! so membership checks are O(1): a `HashSet` of canonical MAC strings guards
//! an insertion-ordered `Vec` used for display.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Upper bound on tracked stations. When full, new sightings are dropped;
/// existing entries are never evicted.
pub const DEFAULT_MAC_CAPACITY: usize = 4096;

/// One observed wireless station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacSighting {
    /// Canonical MAC string; unique key in the registry.
    pub mac: String,
    /// Signal strength in dBm.
    pub rssi: i32,
    /// Wi-Fi channel the station was seen on.
    pub channel: i32,
}

/// Insertion-ordered, deduplicating sighting collection. First sighting of a
/// MAC wins; later sightings of the same station are ignored entirely, so the
/// originally recorded rssi/channel are retained.
pub struct MacRegistry {
    seen: HashSet<String>,
    order: Vec<MacSighting>,
    capacity: usize,
}

impl MacRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAC_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: Vec::new(),
            capacity,
        }
    }

    /// Record a sighting. Returns whether it was newly inserted.
    pub fn record(&mut self, sighting: MacSighting) -> bool {
        if self.seen.contains(&sighting.mac) {
            return false;
        }
        if self.order.len() >= self.capacity {
            warn!(
                capacity = self.capacity,
                mac = %sighting.mac,
                "MAC registry full, dropping new sighting"
            );
            return false;
        }
        self.seen.insert(sighting.mac.clone());
        self.order.push(sighting);
        true
    }

    /// Whether this MAC has been recorded.
    pub fn contains(&self, mac: &str) -> bool {
        self.seen.contains(mac)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Sightings in insertion order.
    pub fn snapshot(&self) -> Vec<MacSighting> {
        self.order.clone()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}

impl Default for MacRegistry {
    fn default() -> Self {
        Self::new()
    }
}
