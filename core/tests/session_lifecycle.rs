// Session lifecycle integration tests.
//
// A scripted adapter stands in for the platform BLE stack: every call the
// core makes enqueues the callback a well-behaved (or deliberately faulty)
// peripheral would produce, and the test pumps the queue back into the
// session. This exercises the whole path (handshake sequencing, timeout
// supervision, notification decode, routing, teardown) without hardware.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use airscout_core::{
    AdapterError, AdapterEvent, BleAdapter, Characteristic, Command, ConnectionState,
    DeviceHandle, GattStatus, Session, SessionConfig, WifiNetwork, WriteType,
};

#[derive(Default)]
struct ScriptedAdapter {
    queue: Mutex<VecDeque<AdapterEvent>>,
    writes: Mutex<Vec<String>>,
    close_count: AtomicUsize,
    /// Never answer the connect attempt (exercises the supervisory timer).
    silent: bool,
    fail_mtu: bool,
    omit_command_char: bool,
}

impl ScriptedAdapter {
    fn push(&self, event: AdapterEvent) {
        self.queue.lock().push_back(event);
    }

    fn poll(&self) -> Option<AdapterEvent> {
        self.queue.lock().pop_front()
    }

    fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    fn closes(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

impl BleAdapter for ScriptedAdapter {
    fn start_scan(&self) -> Result<(), AdapterError> {
        self.push(AdapterEvent::DeviceDiscovered(DeviceHandle::new(
            "24:6F:28:AE:52:7C",
            Some("Minimap32".to_string()),
        )));
        self.push(AdapterEvent::DeviceDiscovered(DeviceHandle::new(
            "D8:3A:DD:01:02:03",
            None,
        )));
        Ok(())
    }

    fn stop_scan(&self) {}

    fn connect_gatt(&self, _device: &DeviceHandle) -> Result<(), AdapterError> {
        if !self.silent {
            self.push(AdapterEvent::Connected {
                status: GattStatus::Success,
            });
        }
        Ok(())
    }

    fn request_mtu(&self, mtu: u16) {
        let status = if self.fail_mtu {
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
            Characteristic::Command => !self.omit_command_char,
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

        // A sniff start makes the "firmware" stream a burst of frames,
        // duplicates and noise included.
        if payload.starts_with("SNIFF|START") {
            for frame in [
                "STATUS|SNIFF|value=STARTED",
                "LOG|SNIFF|msg=locked to channel 6",
                "MAC|SNIFF|mac=AA:BB:CC:DD:EE:FF|rssi=-42|ch=6",
                "MAC|SNIFF|mac=11:22:33:44:55:66|rssi=-71|ch=6",
                "MAC|SNIFF|mac=AA:BB:CC:DD:EE:FF|rssi=-44|ch=6",
                "corrupted frame",
            ] {
                self.push(AdapterEvent::Notification {
                    value: frame.as_bytes().to_vec(),
                });
            }
        }

        self.writes.lock().push(payload);
        Ok(())
    }

    fn disconnect(&self) {}

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

fn pump(session: &Session, adapter: &ScriptedAdapter) {
    while let Some(event) = adapter.poll() {
        session.handle_adapter_event(event);
    }
}

/// Feed exactly one queued callback, returning whether one was delivered.
fn step(session: &Session, adapter: &ScriptedAdapter) -> bool {
    match adapter.poll() {
        Some(event) => {
            session.handle_adapter_event(event);
            true
        }
        None => false,
    }
}

fn new_session(adapter: Arc<ScriptedAdapter>) -> Arc<Session> {
    Session::new(adapter, SessionConfig::default()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn handshake_reaches_ready_and_cancels_timeout() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let session = new_session(Arc::clone(&adapter));

    session.select_device(DeviceHandle::new("24:6F:28:AE:52:7C", None));
    session.connect().unwrap();
    pump(&session, &adapter);
    assert_eq!(session.state(), ConnectionState::Ready);

    // Well past the supervisory window: the cancelled timer must not fire.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(session.state(), ConnectionState::Ready);
    assert_eq!(adapter.closes(), 0);
}

#[tokio::test]
async fn handshake_states_are_strictly_ordered() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let session = new_session(Arc::clone(&adapter));

    session.select_device(DeviceHandle::new("24:6F:28:AE:52:7C", None));
    session.connect().unwrap();

    let mut observed = vec![session.state()];
    while step(&session, &adapter) {
        let state = session.state();
        if observed.last() != Some(&state) {
            observed.push(state);
        }
    }

    assert_eq!(
        observed,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::MtuNegotiated,
            ConnectionState::ServicesDiscovered,
            ConnectionState::Ready,
        ]
    );
}

#[tokio::test]
async fn mtu_failure_never_reaches_later_states() {
    let adapter = Arc::new(ScriptedAdapter {
        fail_mtu: true,
        ..ScriptedAdapter::default()
    });
    let session = new_session(Arc::clone(&adapter));

    session.select_device(DeviceHandle::new("24:6F:28:AE:52:7C", None));
    session.connect().unwrap();

    let mut observed = Vec::new();
    while step(&session, &adapter) {
        observed.push(session.state());
    }

    assert_eq!(
        session.state(),
        ConnectionState::Error("MTU failed".to_string())
    );
    assert!(!observed.contains(&ConnectionState::ServicesDiscovered));
    assert!(!observed.contains(&ConnectionState::Ready));
}

#[tokio::test]
async fn missing_command_characteristic_fails_discovery() {
    let adapter = Arc::new(ScriptedAdapter {
        omit_command_char: true,
        ..ScriptedAdapter::default()
    });
    let session = new_session(Arc::clone(&adapter));

    session.select_device(DeviceHandle::new("24:6F:28:AE:52:7C", None));
    session.connect().unwrap();
    pump(&session, &adapter);

    assert_eq!(
        session.state(),
        ConnectionState::Error("Command characteristic not found".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn supervisory_timeout_errors_and_closes_once() {
    let adapter = Arc::new(ScriptedAdapter {
        silent: true,
        ..ScriptedAdapter::default()
    });
    let session = new_session(Arc::clone(&adapter));
    let mut notices = session.subscribe_notices();

    session.select_device(DeviceHandle::new("24:6F:28:AE:52:7C", None));
    session.connect().unwrap();
    assert_eq!(session.state(), ConnectionState::Connecting);

    tokio::time::sleep(Duration::from_secs(16)).await;

    assert_eq!(
        session.state(),
        ConnectionState::Error("Connection timeout".to_string())
    );
    assert_eq!(adapter.closes(), 1);
    assert_eq!(notices.try_recv().unwrap(), "BLE error: Connection timeout");

    // Operator retry path: reset returns to Idle, a fresh connect is allowed.
    session.reset_session();
    assert_eq!(session.state(), ConnectionState::Idle);
    session.connect().unwrap();
    assert_eq!(session.state(), ConnectionState::Connecting);
}

#[tokio::test]
async fn full_sniff_workflow_end_to_end() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let session = new_session(Arc::clone(&adapter));

    // Discover and pick the peripheral.
    session.start_scan();
    pump(&session, &adapter);
    let devices = session.devices();
    assert_eq!(devices.len(), 2);
    session.select_device(devices[0].clone());
    session.stop_scan();

    // Handshake.
    session.connect().unwrap();
    pump(&session, &adapter);
    assert_eq!(session.state(), ConnectionState::Ready);

    // Pick a target and start sniffing it.
    let target = WifiNetwork::from_scan("Home", "AA:BB:CC:DD:EE:FF", -50, 2437);
    session.set_target_network(Some(target.clone()));
    session.send_command(Command::SniffStart {
        ssid: target.ssid.clone(),
        bssid: target.bssid.clone(),
        channel: target.channel,
    });
    pump(&session, &adapter);

    // Two unique stations; the duplicate kept its first-seen rssi and the
    // corrupted frame vanished without a trace.
    let macs = session.macs();
    assert_eq!(macs.len(), 2);
    assert_eq!(macs[0].mac, "AA:BB:CC:DD:EE:FF");
    assert_eq!(macs[0].rssi, -42);
    assert_eq!(macs[1].mac, "11:22:33:44:55:66");
    assert_eq!(session.sniffer_log(), vec!["locked to channel 6"]);
    assert_eq!(session.status(), Some("SNIFF:STARTED".to_string()));

    assert_eq!(
        adapter.writes(),
        vec![
            "MAC|CLEAR",
            "SNIFF|START|SSID=Home|BSSID=AA:BB:CC:DD:EE:FF|CHANNEL=6",
        ]
    );

    // Graceful teardown: stop the attacks, clear the peripheral, wipe local.
    session.handle_disconnect().await;
    assert_eq!(session.state(), ConnectionState::Idle);
    assert!(session.macs().is_empty());
    assert!(session.sniffer_log().is_empty());
    assert!(session.selected_device().is_none());

    let writes = adapter.writes();
    assert_eq!(
        &writes[2..],
        &[
            "SNIFF|STOP".to_string(),
            "DEAUTH|STOP".to_string(),
            "MAC|CLEAR".to_string(),
            "WIFI|CLEAR".to_string(),
        ]
    );
}

#[tokio::test]
async fn reset_from_ready_returns_to_idle_and_empties_collections() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let session = new_session(Arc::clone(&adapter));

    session.start_scan();
    pump(&session, &adapter);
    session.select_device(session.devices()[0].clone());
    session.connect().unwrap();
    pump(&session, &adapter);
    assert_eq!(session.state(), ConnectionState::Ready);

    session.send_command(Command::SniffStart {
        ssid: "Home".to_string(),
        bssid: "AA:BB:CC:DD:EE:FF".to_string(),
        channel: 6,
    });
    pump(&session, &adapter);
    assert!(!session.macs().is_empty());

    session.reset_session();
    assert_eq!(session.state(), ConnectionState::Idle);
    assert!(session.macs().is_empty());
    assert!(session.devices().is_empty());
}

#[tokio::test]
async fn peer_disconnect_surfaces_one_notice() {
    let adapter = Arc::new(ScriptedAdapter::default());
    let session = new_session(Arc::clone(&adapter));
    let mut notices = session.subscribe_notices();

    session.select_device(DeviceHandle::new("24:6F:28:AE:52:7C", None));
    session.connect().unwrap();
    pump(&session, &adapter);
    assert_eq!(session.state(), ConnectionState::Ready);

    session.handle_adapter_event(AdapterEvent::Disconnected {
        status: GattStatus::Success,
    });

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(notices.try_recv().unwrap(), "device disconnected");
    assert!(notices.try_recv().is_err());
    assert_eq!(adapter.closes(), 1);
}
