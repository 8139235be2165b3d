//! Session controller.
//!
//! One logical session per app instance: owns the discovered-device list,
//! the selected device, the connection machine, and every store the inbound
//! event stream feeds. The platform binding pushes its callbacks into
//! [`Session::handle_adapter_event`]; decoded events fan out from there into
//! the MAC registry, the per-channel logs, and the status cell. Everything
//! the presentation layer can observe hangs off this type as a watch or
//! broadcast channel.
//!
//! Command sends are fire-and-forget. There is no acknowledgement protocol
//! on the wire; a send either reaches the peripheral or it does not, and the
//! local state never depends on it having arrived.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, trace, warn};

use crate::ble::{
    AdapterEvent, BleAdapter, Characteristic, ConnectError, ConnectionConfig, ConnectionMachine,
    ConnectionState, DeviceHandle, WriteType,
};
use crate::protocol::{parse, Command, Event};
use crate::store::{LogStream, MacRegistry, MacSighting, StatusCell};
use crate::wifi::WifiNetwork;

/// Channel tag the sniffer emits on.
const CHANNEL_SNIFF: &str = "SNIFF";
/// Channel tag the deauther emits on.
const CHANNEL_DEAUTH: &str = "DEAUTH";

/// Settle delay between stop commands and clear commands during disconnect
/// cleanup, giving the firmware time to wind down its attack tasks.
const CLEANUP_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Session-level tunables.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub connection: ConnectionConfig,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no device selected")]
    NoDeviceSelected,
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// The session controller. Construct once per adapter, share via `Arc`.
pub struct Session {
    adapter: Arc<dyn BleAdapter>,
    machine: Arc<ConnectionMachine>,

    devices: RwLock<Vec<DeviceHandle>>,
    selected: RwLock<Option<DeviceHandle>>,
    target: RwLock<Option<WifiNetwork>>,
    macs: RwLock<MacRegistry>,
    sniffer_log: RwLock<LogStream>,
    deauth_log: RwLock<LogStream>,
    status: RwLock<StatusCell>,

    devices_tx: watch::Sender<Vec<DeviceHandle>>,
    macs_tx: watch::Sender<Vec<MacSighting>>,
    sniffer_tx: watch::Sender<Vec<String>>,
    deauth_tx: watch::Sender<Vec<String>>,
    status_tx: watch::Sender<Option<String>>,
    target_tx: watch::Sender<Option<WifiNetwork>>,

    /// Serializes outbound characteristic writes so command order is
    /// preserved even if a platform binding dispatches writes concurrently.
    write_gate: Mutex<()>,
}

impl Session {
    pub fn new(
        adapter: Arc<dyn BleAdapter>,
        config: SessionConfig,
    ) -> Result<Arc<Self>, ConnectError> {
        config.connection.validate()?;
        let machine = Arc::new(ConnectionMachine::new(
            Arc::clone(&adapter),
            config.connection,
        ));

        let (devices_tx, _) = watch::channel(Vec::new());
        let (macs_tx, _) = watch::channel(Vec::new());
        let (sniffer_tx, _) = watch::channel(Vec::new());
        let (deauth_tx, _) = watch::channel(Vec::new());
        let (status_tx, _) = watch::channel(None);
        let (target_tx, _) = watch::channel(None);

        Ok(Arc::new(Self {
            adapter,
            machine,
            devices: RwLock::new(Vec::new()),
            selected: RwLock::new(None),
            target: RwLock::new(None),
            macs: RwLock::new(MacRegistry::new()),
            sniffer_log: RwLock::new(LogStream::new()),
            deauth_log: RwLock::new(LogStream::new()),
            status: RwLock::new(StatusCell::new()),
            devices_tx,
            macs_tx,
            sniffer_tx,
            deauth_tx,
            status_tx,
            target_tx,
            write_gate: Mutex::new(()),
        }))
    }

    // ------------------------------------------------------------------
    // Device discovery & selection
    // ------------------------------------------------------------------

    /// Begin a BLE scan, dropping previous results. Permission denial is a
    /// logged no-op, not an error; the host owns that conversation.
    pub fn start_scan(&self) {
        self.devices.write().clear();
        self.devices_tx.send_replace(Vec::new());
        if let Err(e) = self.adapter.start_scan() {
            warn!(error = %e, "BLE scan refused");
            return;
        }
        info!("BLE scan started");
    }

    pub fn stop_scan(&self) {
        self.adapter.stop_scan();
        info!("BLE scan stopped");
    }

    /// Select a peripheral to work against. Any live session is torn down
    /// first so the next connect starts clean. At most one device is
    /// selected at a time.
    pub fn select_device(&self, device: DeviceHandle) {
        self.reset_session();
        info!(address = %device.address, name = %device.display_name(), "device selected");
        *self.selected.write() = Some(device);
    }

    pub fn clear_selection(&self) {
        *self.selected.write() = None;
    }

    pub fn selected_device(&self) -> Option<DeviceHandle> {
        self.selected.read().clone()
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Connect to the selected device. Resets the session first (device
    /// list and MAC registry from a previous attempt are stale). Completion
    /// is observed on the state stream.
    pub fn connect(&self) -> Result<(), SessionError> {
        let device = match self.selected_device() {
            Some(device) => device,
            None => {
                warn!("connect requested with no device selected");
                return Err(SessionError::NoDeviceSelected);
            }
        };
        self.reset_session();
        self.machine.connect(&device)?;
        Ok(())
    }

    /// Abandon any in-flight or live connection and clear the session-scoped
    /// collections (MAC registry, device list). Logs and status survive;
    /// the device selection survives so the operator can retry.
    pub fn reset_session(&self) {
        self.machine.reset();
        self.clear_macs();
        self.devices.write().clear();
        self.devices_tx.send_replace(Vec::new());
    }

    /// Graceful teardown: best-effort peripheral cleanup, then an
    /// unconditional local reset.
    ///
    /// Each send is its own failure boundary: the link may already be gone,
    /// and a failed stop must not block the clears that follow. Local state
    /// is wiped regardless of whether anything reached the peripheral.
    pub async fn handle_disconnect(&self) {
        info!("disconnect requested, sending best-effort cleanup");

        self.send_command(Command::SniffStop);
        self.send_command(Command::DeauthStop);

        tokio::time::sleep(CLEANUP_SETTLE_DELAY).await;

        self.send_command(Command::ClearMac);
        self.send_command(Command::ClearWifi);

        self.clear_sniffer_log();
        self.clear_selection();
        self.reset_session();
    }

    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.machine.watch_state()
    }

    /// Transient operator notices ("device disconnected", "BLE error: ...").
    /// Each error or disconnect transition produces exactly one notice; the
    /// session returns to `Idle` through [`Session::reset_session`], so it is
    /// never wedged in `Error` from the operator's perspective.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<String> {
        self.machine.subscribe_notices()
    }

    // ------------------------------------------------------------------
    // Adapter event ingestion
    // ------------------------------------------------------------------

    /// Single ingestion point for platform callbacks. Scan results update
    /// the device list, notifications are decoded and routed, and link
    /// events drive the connection machine.
    pub fn handle_adapter_event(&self, event: AdapterEvent) {
        match event {
            AdapterEvent::DeviceDiscovered(device) => self.on_device_discovered(device),
            AdapterEvent::ScanFailed { code } => warn!(code, "BLE scan failed"),
            AdapterEvent::Notification { value } => {
                let raw = String::from_utf8_lossy(&value);
                trace!(frame = %raw, "notification");
                self.route_event(parse(&raw));
            }
            link_event => self.machine.handle_event(link_event),
        }
    }

    fn on_device_discovered(&self, device: DeviceHandle) {
        let mut devices = self.devices.write();
        if devices.iter().any(|d| d.address == device.address) {
            return;
        }
        debug!(address = %device.address, name = %device.display_name(), "device discovered");
        devices.push(device);
        self.devices_tx.send_replace(devices.clone());
    }

    /// Route one decoded event. Channel-tag policy lives here: only the
    /// sniffer and deauth channels have local surfaces, and MAC sightings
    /// only count while sniffing. Unrecognized frames produce no visible
    /// side effect.
    fn route_event(&self, event: Event) {
        match event {
            Event::LogEntry { channel, message } => match channel.as_str() {
                CHANNEL_SNIFF => self.append_sniffer_line(message),
                CHANNEL_DEAUTH => self.append_deauth_line(message),
                other => debug!(channel = other, "log for unrouted channel dropped"),
            },
            Event::ErrorReport { channel, message } => match channel.as_str() {
                CHANNEL_SNIFF => self.append_sniffer_line(format!("[ERROR] {message}")),
                CHANNEL_DEAUTH => self.append_deauth_line(format!("[ERROR] {message}")),
                other => debug!(channel = other, "error for unrouted channel dropped"),
            },
            Event::MacSighting {
                channel,
                mac,
                rssi,
                channel_num,
            } => {
                if channel != CHANNEL_SNIFF {
                    debug!(channel = %channel, "MAC sighting outside sniff channel ignored");
                    return;
                }
                let inserted = self.macs.write().record(MacSighting {
                    mac,
                    rssi,
                    channel: channel_num,
                });
                if inserted {
                    self.publish_macs();
                }
            }
            Event::StatusUpdate { channel, value } => {
                self.status.write().set(&channel, &value);
                self.status_tx.send_replace(self.status.read().get());
            }
            Event::Unrecognized { raw } => {
                trace!(frame = %raw, "unrecognized frame dropped");
            }
        }
    }

    // ------------------------------------------------------------------
    // Command surface
    // ------------------------------------------------------------------

    /// Encode and send a command to the peripheral. Fire-and-forget: if the
    /// link is not up with the command characteristic resolved, the send is
    /// dropped with a warning, never an error. Writes are serialized
    /// through a single gate to preserve program order.
    pub fn send_command(&self, command: Command) {
        if !self.machine.is_link_up() {
            warn!(command = ?command, "link not up, command dropped");
            return;
        }
        if !self.adapter.has_characteristic(Characteristic::Command) {
            warn!(command = ?command, "command characteristic unresolved, command dropped");
            return;
        }

        let payload = command.encode();
        let _gate = self.write_gate.lock();
        match self.adapter.write_characteristic(
            Characteristic::Command,
            payload.as_bytes(),
            WriteType::Default,
        ) {
            Ok(()) => debug!(payload = %payload, "command sent"),
            Err(e) => warn!(payload = %payload, error = %e, "command send failed"),
        }
    }

    // ------------------------------------------------------------------
    // Target network
    // ------------------------------------------------------------------

    /// Change the sniff/deauth target. The local MAC registry is cleared and
    /// a peripheral-side clear is sent best-effort. The two are independent
    /// actions; no acknowledgement is assumed.
    pub fn set_target_network(&self, network: Option<WifiNetwork>) {
        match &network {
            Some(n) => info!(target = %n.display_name(), "target network changed"),
            None => info!("target network cleared"),
        }
        *self.target.write() = network.clone();
        self.target_tx.send_replace(network);
        self.clear_macs();
        self.send_command(Command::ClearMac);
    }

    pub fn target_network(&self) -> Option<WifiNetwork> {
        self.target.read().clone()
    }

    pub fn watch_target(&self) -> watch::Receiver<Option<WifiNetwork>> {
        self.target_tx.subscribe()
    }

    // ------------------------------------------------------------------
    // Stores: registries, logs, status
    // ------------------------------------------------------------------

    pub fn macs(&self) -> Vec<MacSighting> {
        self.macs.read().snapshot()
    }

    pub fn watch_macs(&self) -> watch::Receiver<Vec<MacSighting>> {
        self.macs_tx.subscribe()
    }

    /// Clear the locally displayed MAC table. Peripheral state is untouched;
    /// see [`Session::notify_peripheral_clear_macs`].
    pub fn clear_macs(&self) {
        self.macs.write().clear();
        self.publish_macs();
    }

    /// Ask the peripheral to clear its own MAC table. Independent of the
    /// local clear by design.
    pub fn notify_peripheral_clear_macs(&self) {
        self.send_command(Command::ClearMac);
    }

    /// Ask the peripheral to clear its Wi-Fi target state.
    pub fn notify_peripheral_clear_wifi(&self) {
        self.send_command(Command::ClearWifi);
    }

    pub fn sniffer_log(&self) -> Vec<String> {
        self.sniffer_log.read().snapshot()
    }

    pub fn deauth_log(&self) -> Vec<String> {
        self.deauth_log.read().snapshot()
    }

    pub fn watch_sniffer_log(&self) -> watch::Receiver<Vec<String>> {
        self.sniffer_tx.subscribe()
    }

    pub fn watch_deauth_log(&self) -> watch::Receiver<Vec<String>> {
        self.deauth_tx.subscribe()
    }

    /// Append an operator-side annotation to the sniffer log.
    pub fn push_local_sniffer_log(&self, line: impl Into<String>) {
        self.append_sniffer_line(line.into());
    }

    /// Append an operator-side annotation to the deauth log.
    pub fn push_local_deauth_log(&self, line: impl Into<String>) {
        self.append_deauth_line(line.into());
    }

    pub fn clear_sniffer_log(&self) {
        self.sniffer_log.write().clear();
        self.sniffer_tx.send_replace(Vec::new());
    }

    pub fn clear_deauth_log(&self) {
        self.deauth_log.write().clear();
        self.deauth_tx.send_replace(Vec::new());
    }

    pub fn status(&self) -> Option<String> {
        self.status.read().get()
    }

    pub fn watch_status(&self) -> watch::Receiver<Option<String>> {
        self.status_tx.subscribe()
    }

    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.devices.read().clone()
    }

    pub fn watch_devices(&self) -> watch::Receiver<Vec<DeviceHandle>> {
        self.devices_tx.subscribe()
    }

    fn append_sniffer_line(&self, line: String) {
        let mut log = self.sniffer_log.write();
        log.append(line);
        self.sniffer_tx.send_replace(log.snapshot());
    }

    fn append_deauth_line(&self, line: String) {
        let mut log = self.deauth_log.write();
        log.append(line);
        self.deauth_tx.send_replace(log.snapshot());
    }

    fn publish_macs(&self) {
        self.macs_tx.send_replace(self.macs.read().snapshot());
    }
}
