//! Connection state machine.
//!
//! Drives the multi-step GATT handshake against the peripheral:
//!
//! ```text
//! Idle -> Connecting -> Connected -> MtuNegotiated -> ServicesDiscovered -> Ready
//! ```
//!
//! The handshake is strictly sequential: BLE peripherals commonly reject
//! concurrent GATT operations, so each step is initiated only after the
//! adapter confirms the previous one. `Ready` is entered only when the CCCD
//! write is *acknowledged*, not merely requested: notifications are not
//! guaranteed to be delivered until the peripheral confirms the
//! subscription, and an earlier `Ready` would silently lose early frames.
//!
//! A single supervisory timer is armed per connect attempt and cancelled the
//! moment `Ready` is reached. If it fires first the attempt is forced into
//! `Error("Connection timeout")` and the link is torn down. There is no
//! automatic retry anywhere in this module; retry is an operator action
//! after `reset()` returns the machine to `Idle`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::adapter::{AdapterError, AdapterEvent, BleAdapter, DeviceHandle, GattStatus};
use super::Characteristic;

/// MTU requested after connecting (richer product variant).
pub const DEFAULT_MTU: u16 = 128;

/// Supervisory timeout for the whole handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Capacity of the transient operator-notice channel.
const NOTICE_CAPACITY: usize = 32;

/// Link phase of the BLE session. Exactly one value is active at a time;
/// only the connection machine mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    MtuNegotiated,
    ServicesDiscovered,
    Ready,
    Disconnected,
    Error(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::MtuNegotiated => write!(f, "MtuNegotiated"),
            ConnectionState::ServicesDiscovered => write!(f, "ServicesDiscovered"),
            ConnectionState::Ready => write!(f, "Ready"),
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Error(reason) => write!(f, "Error({reason})"),
        }
    }
}

/// Tunables for a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// MTU requested once the link is up.
    pub mtu: u16,
    /// Supervisory timeout covering connect through `Ready`.
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Validate the configuration. The MTU floor is the ATT minimum.
    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.mtu < 23 {
            return Err(ConnectError::InvalidConfig(format!(
                "MTU {} below ATT minimum of 23",
                self.mtu
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConnectError::InvalidConfig(
                "connect timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Errors from [`ConnectionMachine::connect`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("invalid connection config: {0}")]
    InvalidConfig(String),
    #[error("connect requires Idle state, currently {0}")]
    NotIdle(ConnectionState),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

struct MachineInner {
    state: ConnectionState,
    /// Mirrors the platform link flag: true from a successful connect until
    /// disconnect/teardown. Command sends are gated on it.
    link_up: bool,
    /// Connect-attempt generation. Bumped on every connect and reset so a
    /// supervisory timer from a previous attempt can never act on this one.
    attempt: u64,
    timer: Option<JoinHandle<()>>,
}

/// The connection state machine. Owns the GATT handle exclusively; nothing
/// else calls link-level adapter methods.
pub struct ConnectionMachine {
    adapter: Arc<dyn BleAdapter>,
    config: ConnectionConfig,
    state_tx: watch::Sender<ConnectionState>,
    notices_tx: broadcast::Sender<String>,
    inner: Mutex<MachineInner>,
}

impl ConnectionMachine {
    pub fn new(adapter: Arc<dyn BleAdapter>, config: ConnectionConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (notices_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            adapter,
            config,
            state_tx,
            notices_tx,
            inner: Mutex::new(MachineInner {
                state: ConnectionState::Idle,
                link_up: false,
                attempt: 0,
                timer: None,
            }),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state.clone()
    }

    /// Whether the link flag is set (successful connect, not yet torn down).
    pub fn is_link_up(&self) -> bool {
        self.inner.lock().link_up
    }

    /// Subscribe to state transitions. Receivers observe the current value
    /// plus subsequent updates.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to transient operator notices (disconnect/error banners).
    pub fn subscribe_notices(&self) -> broadcast::Receiver<String> {
        self.notices_tx.subscribe()
    }

    /// Begin a connection attempt. Asynchronous: completion or failure is
    /// observed on the state stream. Must be called from within a tokio
    /// runtime (the supervisory timer is a spawned task).
    pub fn connect(self: &Arc<Self>, device: &DeviceHandle) -> Result<(), ConnectError> {
        self.config.validate()?;

        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Idle {
            return Err(ConnectError::NotIdle(inner.state.clone()));
        }

        // Permission denial surfaces here and leaves the machine in Idle,
        // a precondition failure rather than a session transition.
        self.adapter.connect_gatt(device)?;

        inner.attempt += 1;
        let attempt = inner.attempt;
        self.set_state(&mut inner, ConnectionState::Connecting);

        let machine = Arc::clone(self);
        let timeout = self.config.connect_timeout;
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            machine.on_timeout(attempt);
        }));

        info!(device = %device.address, "connecting");
        Ok(())
    }

    /// Feed one adapter callback into the machine. Non-link events (scan
    /// results, notifications) are ignored here; the session controller
    /// consumes those before forwarding.
    pub fn handle_event(&self, event: AdapterEvent) {
        match event {
            AdapterEvent::Connected { status } => self.on_connected(status),
            AdapterEvent::Disconnected { status } => self.on_disconnected(status),
            AdapterEvent::MtuChanged { mtu, status } => self.on_mtu_changed(mtu, status),
            AdapterEvent::ServicesDiscovered { status } => self.on_services_discovered(status),
            AdapterEvent::DescriptorWrite { status } => self.on_descriptor_write(status),
            AdapterEvent::CharacteristicWrite { status } => {
                if !status.is_success() {
                    warn!(?status, "characteristic write failed");
                }
            }
            AdapterEvent::DeviceDiscovered(_)
            | AdapterEvent::ScanFailed { .. }
            | AdapterEvent::Notification { .. } => {
                debug!("non-link adapter event ignored by connection machine");
            }
        }
    }

    /// Abandon any in-flight handshake and return to `Idle`. Tears the link
    /// down if still attached. Never fails.
    pub fn reset(&self) {
        let prior = {
            let mut inner = self.inner.lock();
            Self::cancel_timer(&mut inner);
            inner.attempt += 1;
            inner.link_up = false;
            let prior = inner.state.clone();
            if prior != ConnectionState::Idle {
                self.set_state(&mut inner, ConnectionState::Idle);
            }
            prior
        };

        // Disconnected already closed the handle; Idle never had one.
        if !matches!(
            prior,
            ConnectionState::Idle | ConnectionState::Disconnected
        ) {
            self.adapter.disconnect();
            self.adapter.close();
        }

        if prior != ConnectionState::Idle {
            debug!(%prior, "connection machine reset");
        }
    }

    fn on_connected(&self, status: GattStatus) {
        match status {
            GattStatus::Failure(code) => {
                error!(code, "connect failed");
                {
                    let mut inner = self.inner.lock();
                    Self::cancel_timer(&mut inner);
                    inner.link_up = false;
                    self.set_state(
                        &mut inner,
                        ConnectionState::Error(format!("Connection failed (status={code})")),
                    );
                }
                self.adapter.close();
            }
            GattStatus::Success => {
                {
                    let mut inner = self.inner.lock();
                    if inner.state != ConnectionState::Connecting {
                        debug!(state = %inner.state, "connect result outside an attempt, ignoring");
                        return;
                    }
                    inner.link_up = true;
                    self.set_state(&mut inner, ConnectionState::Connected);
                }
                debug!(mtu = self.config.mtu, "link up, requesting MTU");
                self.adapter.request_mtu(self.config.mtu);
            }
        }
    }

    fn on_disconnected(&self, status: GattStatus) {
        {
            let mut inner = self.inner.lock();
            if matches!(
                inner.state,
                ConnectionState::Idle | ConnectionState::Disconnected
            ) {
                // No session attached, so this is a stale report from a torn-down link.
                debug!(?status, "disconnect report with no live session, ignoring");
                return;
            }
            Self::cancel_timer(&mut inner);
            inner.link_up = false;
            self.set_state(&mut inner, ConnectionState::Disconnected);
        }
        info!(?status, "disconnected");
        self.adapter.close();
    }

    fn on_mtu_changed(&self, mtu: u16, status: GattStatus) {
        {
            let inner = self.inner.lock();
            if inner.state != ConnectionState::Connected {
                debug!(state = %inner.state, "MTU result out of sequence, ignoring");
                return;
            }
        }
        if !status.is_success() {
            error!("MTU request failed");
            self.fail("MTU failed");
            return;
        }
        {
            let mut inner = self.inner.lock();
            self.set_state(&mut inner, ConnectionState::MtuNegotiated);
        }
        debug!(mtu, "MTU negotiated, discovering services");
        self.adapter.discover_services();
    }

    fn on_services_discovered(&self, status: GattStatus) {
        {
            let inner = self.inner.lock();
            if inner.state != ConnectionState::MtuNegotiated {
                debug!(state = %inner.state, "discovery result out of sequence, ignoring");
                return;
            }
        }
        if !status.is_success() {
            error!(?status, "service discovery failed");
            self.fail("Service discovery failed");
            return;
        }

        // The firmware contract requires the control service, both
        // characteristics, and the CCCD. Anything missing fails the session
        // with a reason naming the missing piece.
        if !self.adapter.has_service() {
            self.fail("Service not found");
            return;
        }
        if !self.adapter.has_characteristic(Characteristic::Status) {
            self.fail("Status characteristic not found");
            return;
        }
        if !self.adapter.has_characteristic(Characteristic::Command) {
            self.fail("Command characteristic not found");
            return;
        }
        if !self.adapter.has_cccd() {
            self.fail("CCCD descriptor not found");
            return;
        }

        {
            let mut inner = self.inner.lock();
            self.set_state(&mut inner, ConnectionState::ServicesDiscovered);
        }
        debug!("services discovered, enabling notifications");
        self.adapter.set_notifications(Characteristic::Status, true);
        if !self.adapter.write_cccd(true) {
            self.fail("Descriptor write failed");
        }
    }

    fn on_descriptor_write(&self, status: GattStatus) {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::ServicesDiscovered {
            debug!(state = %inner.state, "descriptor ack out of sequence, ignoring");
            return;
        }
        if status.is_success() {
            Self::cancel_timer(&mut inner);
            self.set_state(&mut inner, ConnectionState::Ready);
            info!("subscription acknowledged, session ready");
        } else {
            Self::cancel_timer(&mut inner);
            self.set_state(
                &mut inner,
                ConnectionState::Error("Descriptor write failed".to_string()),
            );
        }
    }

    fn on_timeout(&self, attempt: u64) {
        {
            let mut inner = self.inner.lock();
            if inner.attempt != attempt {
                return; // a later attempt or reset superseded this timer
            }
            if !matches!(
                inner.state,
                ConnectionState::Connecting
                    | ConnectionState::Connected
                    | ConnectionState::MtuNegotiated
                    | ConnectionState::ServicesDiscovered
            ) {
                return;
            }
            warn!(state = %inner.state, "supervisory timeout, tearing down");
            inner.link_up = false;
            inner.timer = None;
            self.set_state(
                &mut inner,
                ConnectionState::Error("Connection timeout".to_string()),
            );
        }
        self.adapter.close();
    }

    /// Enter `Error(reason)` without touching the link. Side effects beyond
    /// the transition (close, link flag) belong to the specific handlers.
    fn fail(&self, reason: &str) {
        let mut inner = self.inner.lock();
        Self::cancel_timer(&mut inner);
        self.set_state(&mut inner, ConnectionState::Error(reason.to_string()));
    }

    fn set_state(&self, inner: &mut MachineInner, next: ConnectionState) {
        debug!(from = %inner.state, to = %next, "transition");
        inner.state = next.clone();
        self.state_tx.send_replace(next.clone());
        match next {
            ConnectionState::Disconnected => self.notify("device disconnected"),
            ConnectionState::Error(reason) => self.notify(&format!("BLE error: {reason}")),
            _ => {}
        }
    }

    fn notify(&self, message: &str) {
        // No receivers is fine; notices are best-effort.
        let _ = self.notices_tx.send(message.to_string());
    }

    fn cancel_timer(inner: &mut MachineInner) {
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
    }
}
