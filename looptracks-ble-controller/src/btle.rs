//! btleplug backend for the session
//!
//! `BtleCentral` carries out the session's requests against a platform
//! adapter, and `pump_events` turns the adapter's event stream into
//! `SessionEvent`s. Only peripherals advertising the Loop Tracks service are
//! ever forwarded.

use std::time::Duration;

use btleplug::api::{
    Central as _, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::central::{
    AdapterState, Central, CharacteristicInfo, PeripheralHandle, SERVICE_UUID, SessionEvent,
};
use crate::session::{Session, SessionConfig, SessionHandle};
use crate::TransportError;

pub type EventSender = mpsc::UnboundedSender<SessionEvent<PeripheralId>>;

/// A discovered Loop Tracks device
#[derive(Debug, Clone)]
pub struct LoopTracksDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
}

/// Get the default Bluetooth adapter
pub async fn first_adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters
        .into_iter()
        .next()
        .ok_or(TransportError::AdapterUnavailable)
}

/// Open a session on the default adapter and start following its events
pub async fn start(config: SessionConfig) -> Result<SessionHandle, TransportError> {
    let adapter = first_adapter().await?;
    let (events, receiver) = mpsc::unbounded_channel();

    let central = BtleCentral::new(adapter.clone(), events.clone());
    tokio::spawn(async move {
        if let Err(e) = pump_events(adapter, events).await {
            log::error!("Adapter event stream failed: {e}");
        }
    });

    Ok(Session::new(central, config).spawn(receiver))
}

/// Scan for Loop Tracks devices for `duration`
pub async fn scan(
    adapter: &Adapter,
    duration: Duration,
) -> Result<Vec<LoopTracksDevice>, TransportError> {
    adapter
        .start_scan(ScanFilter {
            services: vec![SERVICE_UUID],
        })
        .await?;
    tokio::time::sleep(duration).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            if !props.services.contains(&SERVICE_UUID) {
                continue;
            }
            devices.push(LoopTracksDevice {
                name: props.local_name.unwrap_or_else(|| "Unknown Device".to_string()),
                address: peripheral.address().to_string(),
                rssi: props.rssi,
            });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Forward adapter events to the session until either side goes away
pub async fn pump_events(adapter: Adapter, events: EventSender) -> Result<(), TransportError> {
    let mut stream = adapter.events().await?;

    let initial = adapter_state(adapter.adapter_state().await?);
    if events.send(SessionEvent::Adapter(initial)).is_err() {
        return Ok(());
    }

    while let Some(event) = stream.next().await {
        let forward = match event {
            CentralEvent::StateUpdate(state) => Some(SessionEvent::Adapter(adapter_state(state))),
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ServicesAdvertisement { id, .. } => {
                advertised_device(&adapter, &id).await.map(SessionEvent::Discovered)
            }
            CentralEvent::DeviceDisconnected(id) => Some(SessionEvent::Disconnected(id)),
            _ => None,
        };

        if let Some(event) = forward {
            if events.send(event).is_err() {
                break;
            }
        }
    }

    Ok(())
}

#[allow(unreachable_patterns)]
fn adapter_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

/// Handle for `id` if it advertises the Loop Tracks service
async fn advertised_device(
    adapter: &Adapter,
    id: &PeripheralId,
) -> Option<PeripheralHandle<PeripheralId>> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let props = peripheral.properties().await.ok()??;
    if !props.services.contains(&SERVICE_UUID) {
        return None;
    }

    let name = props
        .local_name
        .unwrap_or_else(|| peripheral.address().to_string());
    Some(PeripheralHandle {
        id: id.clone(),
        name,
    })
}

/// `Central` over a btleplug adapter
pub struct BtleCentral {
    adapter: Adapter,
    events: EventSender,
    notifications: Option<JoinHandle<()>>,
}

impl BtleCentral {
    pub fn new(adapter: Adapter, events: EventSender) -> Self {
        Self {
            adapter,
            events,
            notifications: None,
        }
    }

    async fn peripheral(&self, id: &PeripheralId) -> Result<Peripheral, TransportError> {
        Ok(self.adapter.peripheral(id).await?)
    }

    fn abort_forwarder(&mut self) {
        if let Some(task) = self.notifications.take() {
            task.abort();
        }
    }
}

fn find_characteristic(
    peripheral: &Peripheral,
    wanted: &CharacteristicInfo,
) -> Result<Characteristic, TransportError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == wanted.uuid && c.service_uuid == wanted.service)
        .ok_or_else(|| {
            TransportError::Discovery(format!("characteristic {} not found", wanted.uuid))
        })
}

impl Central for BtleCentral {
    type PeripheralId = PeripheralId;

    async fn start_scan(&mut self, service: Uuid) -> Result<(), TransportError> {
        self.adapter
            .start_scan(ScanFilter {
                services: vec![service],
            })
            .await?;
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<(), TransportError> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&mut self, id: &PeripheralId) -> Result<(), TransportError> {
        let peripheral = self.peripheral(id).await?;
        peripheral
            .connect()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))
    }

    async fn discover_characteristics(
        &mut self,
        id: &PeripheralId,
    ) -> Result<Vec<CharacteristicInfo>, TransportError> {
        let peripheral = self.peripheral(id).await?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::Discovery(e.to_string()))?;

        Ok(peripheral
            .characteristics()
            .into_iter()
            .map(|c| CharacteristicInfo {
                service: c.service_uuid,
                uuid: c.uuid,
            })
            .collect())
    }

    async fn subscribe(
        &mut self,
        id: &PeripheralId,
        characteristic: &CharacteristicInfo,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let peripheral = self.peripheral(id).await?;
        let rx = find_characteristic(&peripheral, characteristic)?;
        peripheral.subscribe(&rx).await?;

        let mut notifications = peripheral.notifications().await?;
        let events = self.events.clone();
        let wanted = characteristic.uuid;

        self.abort_forwarder();
        self.notifications = Some(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != wanted {
                    continue;
                }
                let event = SessionEvent::Notification {
                    characteristic: notification.uuid,
                    value: notification.value,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        }));

        // A value the device may have set before we subscribed
        match peripheral.read(&rx).await {
            Ok(value) if !value.is_empty() => Ok(Some(value)),
            Ok(_) => Ok(None),
            Err(e) => {
                log::debug!("Initial RX read failed: {e}");
                Ok(None)
            }
        }
    }

    async fn stop_notifications(&mut self) {
        self.abort_forwarder();
    }

    async fn write(
        &mut self,
        id: &PeripheralId,
        characteristic: &CharacteristicInfo,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let peripheral = self.peripheral(id).await?;
        let tx = find_characteristic(&peripheral, characteristic)?;
        peripheral
            .write(&tx, data, WriteType::WithoutResponse)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn disconnect(&mut self, id: &PeripheralId) -> Result<(), TransportError> {
        self.abort_forwarder();
        let peripheral = self.peripheral(id).await?;
        peripheral.disconnect().await?;
        Ok(())
    }
}
