//! BLE link layer.
//!
//! This module owns everything between the platform radio stack and the
//! session controller: the fixed GATT identifiers the firmware advertises,
//! the [`BleAdapter`] capability trait that platform bindings implement, and
//! the connection state machine that drives the handshake.
//!
//! No radio code lives here. Platform implementations (Android/iOS bindings,
//! the CLI's simulated peripheral, scripted test adapters) sit behind
//! [`BleAdapter`] and feed their callbacks in as [`AdapterEvent`]s, so the
//! whole layer is testable without hardware.

pub mod adapter;
pub mod connection;

use uuid::Uuid;

pub use adapter::{AdapterError, AdapterEvent, BleAdapter, DeviceHandle, GattStatus, WriteType};
pub use connection::{ConnectError, ConnectionConfig, ConnectionMachine, ConnectionState};

/// Control service advertised by the peripheral firmware.
pub const CONTROL_SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// Companion -> peripheral command characteristic (write).
pub const COMMAND_CHAR_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

/// Peripheral -> companion status characteristic (notify).
pub const STATUS_CHAR_UUID: Uuid = Uuid::from_u128(0x9d8c2d3a_7a12_4d3f_8f58_bc6b4f9c1123);

/// Client characteristic configuration descriptor (standard Bluetooth UUID).
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Characteristic roles on the control service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Command characteristic, written by the companion.
    Command,
    /// Status characteristic, notifying the companion.
    Status,
}

impl Characteristic {
    /// The firmware UUID for this role.
    pub fn uuid(&self) -> Uuid {
        match self {
            Characteristic::Command => COMMAND_CHAR_UUID,
            Characteristic::Status => STATUS_CHAR_UUID,
        }
    }
}
