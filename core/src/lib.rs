// Airscout Core — BLE control plane for a Wi-Fi auditing peripheral
//
// The companion app's entire brain lives here: the session state machine,
// the wire protocol, and the event stores. The platform keeps the radios
// and the pixels; everything between them is this crate, and all of it
// runs without hardware.

pub mod ble;
pub mod protocol;
pub mod session;
pub mod store;
pub mod wifi;

pub use ble::{
    AdapterError, AdapterEvent, BleAdapter, Characteristic, ConnectError, ConnectionConfig,
    ConnectionMachine, ConnectionState, DeviceHandle, GattStatus, WriteType, CCCD_UUID,
    COMMAND_CHAR_UUID, CONTROL_SERVICE_UUID, STATUS_CHAR_UUID,
};
pub use protocol::{parse, Command, Event};
pub use session::{Session, SessionConfig, SessionError};
pub use store::{LogStream, MacRegistry, MacSighting, StatusCell};
pub use wifi::{
    frequency_to_channel, ScanResultsFn, WifiCatalog, WifiNetwork, WifiScanError, WifiScanner,
};
