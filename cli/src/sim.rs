//! Simulated peripheral.
//!
//! An in-process stand-in for the ESP32 firmware so the whole control plane
//! can be driven on a desk with no radio: every adapter call enqueues the
//! callback the real device would produce, and command writes trigger canned
//! notification bursts. Deterministic by construction: same commands, same
//! frames.

use std::collections::VecDeque;

use airscout_core::{
    AdapterError, AdapterEvent, BleAdapter, Characteristic, DeviceHandle, GattStatus,
    ScanResultsFn, WifiNetwork, WifiScanError, WifiScanner, WriteType,
};
use parking_lot::Mutex;
use tracing::debug;

/// Faults the simulated firmware can be armed with, for demonstrating the
/// session's failure handling from the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SimFault {
    /// Reject the MTU negotiation.
    MtuFailure,
    /// Advertise the control service without its command characteristic.
    MissingCommandChar,
    /// Accept the connection and then never answer, forcing the
    /// supervisory timeout.
    Timeout,
}

pub struct SimPeripheral {
    queue: Mutex<VecDeque<AdapterEvent>>,
    fault: Option<SimFault>,
}

impl SimPeripheral {
    pub fn new(fault: Option<SimFault>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fault,
        }
    }

    /// Drain one pending callback. The console pumps these back into the
    /// session after each operation.
    pub fn poll(&self) -> Option<AdapterEvent> {
        self.queue.lock().pop_front()
    }

    fn push(&self, event: AdapterEvent) {
        self.queue.lock().push_back(event);
    }

    fn notify(&self, frame: &str) {
        self.push(AdapterEvent::Notification {
            value: frame.as_bytes().to_vec(),
        });
    }

    fn on_command(&self, payload: &str) {
        debug!(payload, "sim peripheral received command");
        if payload.starts_with("SNIFF|START") {
            self.notify("STATUS|SNIFF|value=STARTED");
            self.notify("LOG|SNIFF|msg=promiscuous mode on");
            self.notify("LOG|SNIFF|msg=locked to target channel");
            self.notify("MAC|SNIFF|mac=3C:71:BF:4A:90:01|rssi=-38|ch=6");
            self.notify("MAC|SNIFF|mac=A4:CF:12:75:33:D2|rssi=-61|ch=6");
            self.notify("MAC|SNIFF|mac=3C:71:BF:4A:90:01|rssi=-40|ch=6");
            self.notify("MAC|SNIFF|mac=F0:9F:C2:11:28:4B|rssi=-74|ch=6");
        } else if payload == "SNIFF|STOP" {
            self.notify("STATUS|SNIFF|value=STOPPED");
        } else if payload.starts_with("DEAUTH|START") {
            self.notify("STATUS|DEAUTH|value=RUNNING");
            self.notify("LOG|DEAUTH|msg=deauth burst 1 sent");
            self.notify("LOG|DEAUTH|msg=deauth burst 2 sent");
        } else if payload == "DEAUTH|STOP" {
            self.notify("STATUS|DEAUTH|value=STOPPED");
        } else if payload.starts_with("BEACON|START") {
            self.notify("STATUS|BEACON|value=BROADCASTING");
        }
        // MAC|CLEAR and WIFI|CLEAR are fire-and-forget on the real firmware
        // too; no response frames.
    }
}

impl BleAdapter for SimPeripheral {
    fn start_scan(&self) -> Result<(), AdapterError> {
        self.push(AdapterEvent::DeviceDiscovered(DeviceHandle::new(
            "24:6F:28:AE:52:7C",
            Some("Airscout-527C".to_string()),
        )));
        self.push(AdapterEvent::DeviceDiscovered(DeviceHandle::new(
            "5C:F3:70:9A:11:22",
            Some("LE-Speaker".to_string()),
        )));
        Ok(())
    }

    fn stop_scan(&self) {}

    fn connect_gatt(&self, _device: &DeviceHandle) -> Result<(), AdapterError> {
        if self.fault != Some(SimFault::Timeout) {
            self.push(AdapterEvent::Connected {
                status: GattStatus::Success,
            });
        }
        Ok(())
    }

    fn request_mtu(&self, mtu: u16) {
        let status = if self.fault == Some(SimFault::MtuFailure) {
            GattStatus::Failure(1)
        } else {
            GattStatus::Success
        };
        self.push(AdapterEvent::MtuChanged { mtu, status });
    }

    fn discover_services(&self) {
        self.push(AdapterEvent::ServicesDiscovered {
            status: GattStatus::Success,
        });
    }

    fn has_service(&self) -> bool {
        true
    }

    fn has_characteristic(&self, characteristic: Characteristic) -> bool {
        match characteristic {
            Characteristic::Command => self.fault != Some(SimFault::MissingCommandChar),
            Characteristic::Status => true,
        }
    }

    fn has_cccd(&self) -> bool {
        true
    }

    fn set_notifications(&self, _characteristic: Characteristic, _enabled: bool) -> bool {
        true
    }

    fn write_cccd(&self, _enable: bool) -> bool {
        self.push(AdapterEvent::DescriptorWrite {
            status: GattStatus::Success,
        });
        true
    }

    fn write_characteristic(
        &self,
        _characteristic: Characteristic,
        payload: &[u8],
        _write_type: WriteType,
    ) -> Result<(), AdapterError> {
        let payload = String::from_utf8_lossy(payload).to_string();
        self.on_command(&payload);
        Ok(())
    }

    fn disconnect(&self) {}

    fn close(&self) {}
}

/// Canned Wi-Fi environment for the demo.
pub struct SimWifiScanner;

impl WifiScanner for SimWifiScanner {
    fn start_scan(&self, on_results: ScanResultsFn) -> Result<(), WifiScanError> {
        on_results(vec![
            WifiNetwork::from_scan("HomeNet", "A0:40:A0:6F:01:23", -48, 2437),
            WifiNetwork::from_scan("CafeGuest", "58:EF:68:BB:42:10", -66, 2412),
            WifiNetwork::from_scan("", "C4:41:1E:99:F2:07", -71, 5180),
        ]);
        Ok(())
    }

    fn stop(&self) {}
}
