//! BLE session with one Loop Tracks indicator
//!
//! The session owns the central-role lifecycle: scan for the Loop Tracks
//! service, connect to the first device that answers, resolve the TX/RX
//! characteristics, then write text commands until the link drops. A dropped
//! link puts it back into scanning, after the rescan backoff if one is set.
//!
//! ```text
//!  Idle ──adapter on──► Scanning ──discovered──► Connecting ──TX+RX ready──► Connected
//!                          ▲                         │                           │
//!                          └──────connect failed─────┘                           │
//!                          └──────────────────────disconnected───────────────────┘
//!  any ──adapter off/unauthorized/unsupported──► Idle
//! ```

use std::time::Duration;

use looptracks_proto::{Acknowledgement, Command};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::central::{
    AdapterState, Central, CharacteristicInfo, PeripheralHandle, SERVICE_UUID, SessionEvent,
};
use crate::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    Connected,
    Disconnected,
}

/// Read-only view of the session for observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Name of the connected (or connecting) device
    pub peripheral: Option<String>,
    /// Last state the adapter reported
    pub adapter: AdapterState,
}

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay before scanning again after a failed connect or a dropped link.
    /// Zero rescans immediately.
    pub rescan_backoff: Duration,
    /// Upper bound for the doubling backoff
    pub max_rescan_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rescan_backoff: Duration::ZERO,
            max_rescan_backoff: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    /// Delay before the next scan after `failures` consecutive failures
    pub fn rescan_delay(&self, failures: u32) -> Duration {
        if self.rescan_backoff.is_zero() {
            return Duration::ZERO;
        }
        self.rescan_backoff
            .saturating_mul(1u32 << failures.min(16))
            .min(self.max_rescan_backoff)
    }
}

#[derive(Debug, Clone, Copy)]
struct CharacteristicPair {
    tx: CharacteristicInfo,
    rx: CharacteristicInfo,
}

impl CharacteristicPair {
    fn resolve(found: &[CharacteristicInfo]) -> Option<Self> {
        let tx = found.iter().find(|c| **c == CharacteristicInfo::TX)?;
        let rx = found.iter().find(|c| **c == CharacteristicInfo::RX)?;
        Some(Self { tx: *tx, rx: *rx })
    }
}

/// Session state machine over some `Central`
pub struct Session<C: Central> {
    central: C,
    config: SessionConfig,
    state: SessionState,
    peripheral: Option<PeripheralHandle<C::PeripheralId>>,
    characteristics: Option<CharacteristicPair>,
    /// Last command written, only used to give acknowledgement logs context
    last_command: Option<String>,
    failures: u32,
    adapter: AdapterState,
    /// When a delayed rescan is due
    rescan_at: Option<Instant>,
    status: watch::Sender<SessionStatus>,
    acks: broadcast::Sender<Acknowledgement>,
}

impl<C: Central> Session<C> {
    pub fn new(central: C, config: SessionConfig) -> Self {
        let (status, _) = watch::channel(SessionStatus {
            state: SessionState::Idle,
            peripheral: None,
            adapter: AdapterState::Unknown,
        });
        let (acks, _) = broadcast::channel(16);

        Self {
            central,
            config,
            state: SessionState::Idle,
            peripheral: None,
            characteristics: None,
            last_command: None,
            failures: 0,
            adapter: AdapterState::Unknown,
            rescan_at: None,
            status,
            acks,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peripheral(&self) -> Option<&PeripheralHandle<C::PeripheralId>> {
        self.peripheral.as_ref()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn acknowledgements(&self) -> broadcast::Receiver<Acknowledgement> {
        self.acks.subscribe()
    }

    /// Apply one adapter/peripheral event
    pub async fn handle_event(&mut self, event: SessionEvent<C::PeripheralId>) {
        match event {
            SessionEvent::Adapter(AdapterState::PoweredOn) => {
                log::info!("Bluetooth is on");
                self.adapter = AdapterState::PoweredOn;
                if self.state == SessionState::Idle {
                    self.start_scanning().await;
                } else {
                    self.publish();
                }
            }
            SessionEvent::Adapter(other) => {
                log::warn!("Bluetooth unavailable: {other:?}");
                self.adapter = other;
                self.rescan_at = None;
                if self.peripheral.is_some() {
                    self.central.stop_notifications().await;
                }
                self.clear_peripheral();
                self.set_state(SessionState::Idle);
            }
            SessionEvent::Discovered(handle) => {
                if self.state != SessionState::Scanning {
                    log::debug!("Ignoring {} while {:?}", handle.name, self.state);
                    return;
                }
                log::info!("Discovered peripheral {}", handle.name);
                self.peripheral = Some(handle);
                self.set_state(SessionState::Connecting);
                if let Err(e) = self.central.stop_scan().await {
                    log::warn!("Failed to stop scan: {e}");
                }
                self.establish().await;
            }
            SessionEvent::Disconnected(id) => {
                let Some(peripheral) = &self.peripheral else {
                    return;
                };
                if peripheral.id != id {
                    return;
                }
                log::info!("Disconnected from peripheral {}", peripheral.name);
                self.clear_peripheral();
                self.set_state(SessionState::Disconnected);
                self.rescan().await;
            }
            SessionEvent::Notification {
                characteristic,
                value,
            } => {
                let from_rx = self
                    .characteristics
                    .is_some_and(|pair| pair.rx.uuid == characteristic);
                if from_rx {
                    self.on_notification(&value);
                }
            }
        }
    }

    /// Connect, resolve TX/RX and enable notifications. Falls back to
    /// scanning on any failure.
    async fn establish(&mut self) {
        let Some(peripheral) = self.peripheral.clone() else {
            return;
        };

        if let Err(e) = self.central.connect(&peripheral.id).await {
            log::warn!("Failed to connect to peripheral {}: {e}", peripheral.name);
            self.clear_peripheral();
            self.rescan().await;
            return;
        }
        log::info!("Connected to peripheral {}", peripheral.name);

        match self.resolve(&peripheral.id).await {
            Ok((pair, current)) => {
                log::debug!("TX characteristic: {}", pair.tx.uuid);
                log::debug!("RX characteristic: {}", pair.rx.uuid);
                self.characteristics = Some(pair);
                self.failures = 0;
                // Left over from before this link, so it goes out ahead of
                // Connected and is never taken for the answer to a command
                if let Some(value) = current {
                    self.on_notification(&value);
                }
                self.set_state(SessionState::Connected);
            }
            Err(e) => {
                log::warn!("Dropping peripheral {}: {e}", peripheral.name);
                if let Err(e) = self.central.disconnect(&peripheral.id).await {
                    log::debug!("Disconnect after failed discovery: {e}");
                }
                self.clear_peripheral();
                self.rescan().await;
            }
        }
    }

    async fn resolve(
        &mut self,
        id: &C::PeripheralId,
    ) -> Result<(CharacteristicPair, Option<Vec<u8>>), TransportError> {
        let found = self.central.discover_characteristics(id).await?;
        log::debug!("Found {} characteristics", found.len());

        let pair = CharacteristicPair::resolve(&found).ok_or_else(|| {
            TransportError::Discovery("TX or RX characteristic missing".to_string())
        })?;
        let current = self.central.subscribe(id, &pair.rx).await?;
        Ok((pair, current))
    }

    async fn start_scanning(&mut self) {
        self.rescan_at = None;
        self.set_state(SessionState::Scanning);
        match self.central.start_scan(SERVICE_UUID).await {
            Ok(()) => log::info!("Started scanning"),
            Err(e) => {
                log::warn!("Failed to start scanning: {e}");
                self.set_state(SessionState::Idle);
            }
        }
    }

    /// Scan again now, or schedule it after the backoff. A scheduled rescan
    /// leaves the session `Disconnected` until `resume_scan` runs.
    async fn rescan(&mut self) {
        let delay = self.config.rescan_delay(self.failures);
        self.failures = self.failures.saturating_add(1);
        if delay.is_zero() {
            self.start_scanning().await;
            return;
        }
        log::info!("Scanning again in {delay:?}");
        self.rescan_at = Some(Instant::now() + delay);
        self.set_state(SessionState::Disconnected);
    }

    /// When the pending rescan is due, if one is scheduled
    pub fn rescan_deadline(&self) -> Option<Instant> {
        self.rescan_at
    }

    /// Start the scan a delayed rescan was waiting for
    pub async fn resume_scan(&mut self) {
        if self.rescan_at.take().is_some() && self.state == SessionState::Disconnected {
            self.start_scanning().await;
        }
    }

    /// Write `command` to TX without waiting for the device to answer
    pub async fn send_command(&mut self, command: &Command) -> Result<(), TransportError> {
        let (Some(peripheral), Some(pair)) = (&self.peripheral, self.characteristics) else {
            return Err(TransportError::NotConnected);
        };
        if self.state != SessionState::Connected {
            return Err(TransportError::NotConnected);
        }

        let id = peripheral.id.clone();
        log::info!("Sending {}", command.redacted());
        self.central.write(&id, &pair.tx, &command.to_bytes()).await?;
        self.last_command = Some(command.redacted());
        Ok(())
    }

    /// Ask the device to forget its transit/color setup. Local state is left
    /// alone; the device drops the link itself when it restarts.
    pub async fn reset(&mut self) -> Result<(), TransportError> {
        self.send_command(&Command::Reset).await
    }

    /// Drop the current link, if any, and go back to scanning
    pub async fn disconnect(&mut self) -> Result<(), TransportError> {
        let Some(peripheral) = self.peripheral.clone() else {
            return Ok(());
        };
        log::info!("Disconnecting from peripheral {}", peripheral.name);
        let result = self.central.disconnect(&peripheral.id).await;
        self.clear_peripheral();
        self.set_state(SessionState::Disconnected);
        self.rescan().await;
        result
    }

    /// Decode and classify a value from RX. Only logged and broadcast:
    /// nothing ties it back to the command that caused it.
    pub fn on_notification(&mut self, value: &[u8]) -> Option<Acknowledgement> {
        let Some(ack) = Acknowledgement::from_bytes(value) else {
            log::debug!("Dropping {} undecodable bytes", value.len());
            return None;
        };

        let last = self.last_command.as_deref().unwrap_or("nothing");
        match &ack {
            Acknowledgement::Ok => log::info!("Device acknowledged (last sent: {last})"),
            Acknowledgement::KnownError(e) => {
                log::warn!("Device rejected: {e} (last sent: {last})")
            }
            Acknowledgement::Unknown(s) => log::info!("Value received: {s}"),
        }

        let _ = self.acks.send(ack.clone());
        Some(ack)
    }

    fn clear_peripheral(&mut self) {
        self.peripheral = None;
        self.characteristics = None;
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            log::debug!("Session {:?} -> {:?}", self.state, state);
        }
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(SessionStatus {
            state: self.state,
            peripheral: self.peripheral.as_ref().map(|p| p.name.clone()),
            adapter: self.adapter,
        });
    }
}

enum Request {
    Send(Command, oneshot::Sender<Result<(), TransportError>>),
    Disconnect(oneshot::Sender<Result<(), TransportError>>),
}

impl<C: Central + Send + 'static> Session<C> {
    /// Move the session onto its own task. Events from `events`, requests
    /// from the returned handle and a due rescan are handled one at a time.
    pub fn spawn(
        mut self,
        mut events: mpsc::UnboundedReceiver<SessionEvent<C::PeripheralId>>,
    ) -> SessionHandle {
        let (requests, mut incoming) = mpsc::channel(16);
        let handle = SessionHandle {
            requests,
            status: self.status.subscribe(),
            acks: self.acks.clone(),
        };

        tokio::spawn(async move {
            loop {
                let rescan_at = self.rescan_at;
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            log::debug!("Event source closed, stopping session");
                            break;
                        }
                    },
                    request = incoming.recv() => match request {
                        Some(Request::Send(command, reply)) => {
                            let _ = reply.send(self.send_command(&command).await);
                        }
                        Some(Request::Disconnect(reply)) => {
                            let _ = reply.send(self.disconnect().await);
                        }
                        None => break,
                    },
                    _ = tokio::time::sleep_until(rescan_at.unwrap_or_else(Instant::now)),
                        if rescan_at.is_some() =>
                    {
                        self.resume_scan().await;
                    }
                }
            }
        });

        handle
    }
}

/// Cloneable handle to a spawned session
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<SessionStatus>,
    acks: broadcast::Sender<Acknowledgement>,
}

impl SessionHandle {
    pub async fn send_command(&self, command: Command) -> Result<(), TransportError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Send(command, reply))
            .await
            .map_err(|_| TransportError::SessionClosed)?;
        response.await.map_err(|_| TransportError::SessionClosed)?
    }

    pub async fn reset(&self) -> Result<(), TransportError> {
        self.send_command(Command::Reset).await
    }

    pub async fn disconnect(&self) -> Result<(), TransportError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Disconnect(reply))
            .await
            .map_err(|_| TransportError::SessionClosed)?;
        response.await.map_err(|_| TransportError::SessionClosed)?
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn acknowledgements(&self) -> broadcast::Receiver<Acknowledgement> {
        self.acks.subscribe()
    }

    /// Wait until the session reaches `state`. Gives up with
    /// `AdapterUnavailable` if the adapter is off, unauthorized or unsupported.
    pub async fn wait_for(&self, state: SessionState) -> Result<SessionStatus, TransportError> {
        let mut status = self.status.clone();
        let reached = status
            .wait_for(|s| s.state == state || s.adapter.is_unavailable())
            .await
            .map_err(|_| TransportError::SessionClosed)?
            .clone();
        if reached.state != state {
            return Err(TransportError::AdapterUnavailable);
        }
        Ok(reached)
    }
}
