//! Wi-Fi collaborator surface.
//!
//! Network scanning belongs to the host platform; the core consumes its
//! results read-only. This module carries the record type, the exact
//! frequency-to-channel mapping, the [`WifiScanner`] capability trait, and
//! [`WifiCatalog`], the list/selection state an operator works against when
//! picking a target network.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

/// A network seen by the host Wi-Fi scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiNetwork {
    pub ssid: String,
    pub bssid: String,
    /// Signal level in dBm.
    pub signal_level: i32,
    pub frequency_mhz: u32,
    /// Derived from the frequency; `-1` when the band is unknown.
    pub channel: i32,
}

impl WifiNetwork {
    /// Build a record from raw scan output, deriving the channel.
    pub fn from_scan(
        ssid: impl Into<String>,
        bssid: impl Into<String>,
        signal_level: i32,
        frequency_mhz: u32,
    ) -> Self {
        Self {
            ssid: ssid.into(),
            bssid: bssid.into(),
            signal_level,
            frequency_mhz,
            channel: frequency_to_channel(frequency_mhz),
        }
    }

    /// Operator-facing label; hidden networks advertise an empty SSID.
    pub fn display_name(&self) -> String {
        let ssid = if self.ssid.is_empty() {
            "<hidden>"
        } else {
            &self.ssid
        };
        format!("{ssid} ({} MHz)", self.frequency_mhz)
    }
}

/// Map a center frequency in MHz to its Wi-Fi channel number.
///
/// Covers the 2.4 GHz, 5 GHz and 6 GHz bands; anything else maps to `-1`.
/// This mapping is relied on by the sniff/deauth command builders and must
/// stay exact.
pub fn frequency_to_channel(freq: u32) -> i32 {
    match freq {
        2412..=2484 => ((freq - 2407) / 5) as i32,
        5170..=5895 => ((freq - 5000) / 5) as i32,
        5955..=7115 => ((freq - 5950) / 5) as i32,
        _ => -1,
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WifiScanError {
    /// The host denied the scan (missing location/Wi-Fi permission).
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The platform scanner refused to start.
    #[error("scan failed to start: {0}")]
    StartFailed(String),
}

/// Result callback for a platform Wi-Fi scan. May be invoked more than once
/// if the platform delivers batched updates.
pub type ScanResultsFn = Box<dyn Fn(Vec<WifiNetwork>) + Send + Sync>;

/// Capability interface over the host Wi-Fi scanner.
pub trait WifiScanner: Send + Sync {
    fn start_scan(&self, on_results: ScanResultsFn) -> Result<(), WifiScanError>;
    fn stop(&self);
}

/// Observable target-network state: discovered networks, the selected
/// target (at most one), and the scanning flag.
pub struct WifiCatalog {
    networks_tx: watch::Sender<Vec<WifiNetwork>>,
    selected_tx: watch::Sender<Option<WifiNetwork>>,
    scanning_tx: watch::Sender<bool>,
}

impl WifiCatalog {
    pub fn new() -> Arc<Self> {
        let (networks_tx, _) = watch::channel(Vec::new());
        let (selected_tx, _) = watch::channel(None);
        let (scanning_tx, _) = watch::channel(false);
        Arc::new(Self {
            networks_tx,
            selected_tx,
            scanning_tx,
        })
    }

    /// Kick off a platform scan. The previous result list is cleared first.
    /// A scanner refusal publishes an empty result set and clears the
    /// scanning flag, logged as a warning rather than surfaced as an error.
    pub fn scan(self: &Arc<Self>, scanner: &dyn WifiScanner) {
        self.scanning_tx.send_replace(true);
        self.networks_tx.send_replace(Vec::new());

        let catalog = Arc::clone(self);
        let outcome = scanner.start_scan(Box::new(move |results| {
            debug!(count = results.len(), "Wi-Fi scan results");
            catalog.networks_tx.send_replace(results);
            catalog.scanning_tx.send_replace(false);
        }));

        if let Err(e) = outcome {
            warn!(error = %e, "Wi-Fi scan did not start");
            self.scanning_tx.send_replace(false);
        }
    }

    pub fn select(&self, network: WifiNetwork) {
        self.selected_tx.send_replace(Some(network));
    }

    pub fn clear_selection(&self) {
        self.selected_tx.send_replace(None);
    }

    /// Drop both the result list and the selection.
    pub fn reset(&self) {
        self.selected_tx.send_replace(None);
        self.networks_tx.send_replace(Vec::new());
    }

    pub fn networks(&self) -> Vec<WifiNetwork> {
        self.networks_tx.borrow().clone()
    }

    pub fn selected(&self) -> Option<WifiNetwork> {
        self.selected_tx.borrow().clone()
    }

    pub fn is_scanning(&self) -> bool {
        *self.scanning_tx.borrow()
    }

    pub fn watch_networks(&self) -> watch::Receiver<Vec<WifiNetwork>> {
        self.networks_tx.subscribe()
    }

    pub fn watch_selected(&self) -> watch::Receiver<Option<WifiNetwork>> {
        self.selected_tx.subscribe()
    }

    pub fn watch_scanning(&self) -> watch::Receiver<bool> {
        self.scanning_tx.subscribe()
    }
}
