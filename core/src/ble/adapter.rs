//! Platform adapter seam.
//!
//! The host BLE stack (scanning, GATT transport, permissions) is a black box
//! reached only through [`BleAdapter`]. Calls flow one way through the trait;
//! results flow back asynchronously as [`AdapterEvent`]s, which the binding
//! delivers to [`Session::handle_adapter_event`](crate::session::Session::handle_adapter_event).
//!
//! Callback delivery is expected to be serialized (one dispatch queue). The
//! core guards its state with a mutex regardless, so a binding that delivers
//! concurrently degrades safety margins, not correctness.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Characteristic;

/// A peripheral discovered during a BLE scan.
///
/// The address is the stable unique identifier; the advertised name is
/// whatever the radio saw, if anything. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceHandle {
    pub address: String,
    pub name: Option<String>,
}

impl DeviceHandle {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// Name for display, falling back for anonymous advertisers.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Result code attached to a GATT callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GattStatus {
    Success,
    Failure(i32),
}

impl GattStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, GattStatus::Success)
    }
}

/// GATT write mode for the command characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteType {
    /// Acknowledged write (the default write type).
    Default,
    /// Write without response.
    NoResponse,
}

/// Errors surfaced synchronously by adapter calls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The host denied the capability (missing scan/connect permission).
    /// A precondition failure at the session boundary, never a state-machine
    /// transition.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// No live GATT connection to operate on.
    #[error("not connected")]
    NotConnected,
    /// The write could not be issued.
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Asynchronous callbacks from the platform BLE stack.
///
/// One enum covers the whole surface: scan results, link lifecycle, handshake
/// step completions, and inbound notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// A peripheral was seen during scanning.
    DeviceDiscovered(DeviceHandle),
    /// Scanning failed to start or aborted.
    ScanFailed { code: i32 },
    /// Result of a connect attempt. `Success` means the link is up.
    Connected { status: GattStatus },
    /// The link dropped (peer-initiated or local teardown).
    Disconnected { status: GattStatus },
    /// MTU negotiation completed.
    MtuChanged { mtu: u16, status: GattStatus },
    /// Service discovery completed; presence of the required service,
    /// characteristics and descriptor is checked through the adapter.
    ServicesDiscovered { status: GattStatus },
    /// The CCCD write was acknowledged (or not) by the peripheral.
    DescriptorWrite { status: GattStatus },
    /// A characteristic write completed.
    CharacteristicWrite { status: GattStatus },
    /// Notification payload from the status characteristic.
    Notification { value: Vec<u8> },
}

/// Capability interface over the platform BLE stack.
///
/// Implementations: mobile platform bindings in production, the CLI's
/// simulated peripheral, and scripted adapters in tests. All methods are
/// fire-and-forget from the core's point of view; completion is reported
/// via [`AdapterEvent`].
pub trait BleAdapter: Send + Sync {
    /// Begin scanning for peripherals. Discovered devices arrive as
    /// [`AdapterEvent::DeviceDiscovered`].
    fn start_scan(&self) -> Result<(), AdapterError>;

    /// Stop an active scan.
    fn stop_scan(&self);

    /// Open a GATT connection to the device. Completion arrives as
    /// [`AdapterEvent::Connected`].
    fn connect_gatt(&self, device: &DeviceHandle) -> Result<(), AdapterError>;

    /// Request an MTU for the live link.
    fn request_mtu(&self, mtu: u16);

    /// Begin service discovery on the live link.
    fn discover_services(&self);

    /// Whether the control service was found during discovery.
    fn has_service(&self) -> bool;

    /// Whether the given characteristic was found on the control service.
    fn has_characteristic(&self, characteristic: Characteristic) -> bool;

    /// Whether the CCCD is present on the status characteristic.
    fn has_cccd(&self) -> bool;

    /// Enable or disable local notification dispatch for a characteristic.
    fn set_notifications(&self, characteristic: Characteristic, enabled: bool) -> bool;

    /// Write the CCCD to enable (or disable) notifications on the peripheral.
    /// Returns whether the write was issued; the acknowledgement arrives as
    /// [`AdapterEvent::DescriptorWrite`].
    fn write_cccd(&self, enable: bool) -> bool;

    /// Write a payload to a characteristic.
    fn write_characteristic(
        &self,
        characteristic: Characteristic,
        payload: &[u8],
        write_type: WriteType,
    ) -> Result<(), AdapterError>;

    /// Drop the GATT connection gracefully.
    fn disconnect(&self);

    /// Release the GATT handle.
    fn close(&self);
}
