//! The seam between the session state machine and a BLE central stack

use std::fmt;
use std::future::Future;

use uuid::Uuid;

use crate::TransportError;

// Same values as looptracks_proto::ble, as typed UUIDs
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xa73ba101_8192_4a51_b42d_ae9cd14b14a5);
pub const TX_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
pub const RX_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Power/authorization state reported by the local adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    PoweredOn,
    PoweredOff,
    Unauthorized,
    Unsupported,
    Unknown,
}

impl AdapterState {
    /// Off, unauthorized or unsupported. `Unknown` is usually transient and
    /// does not count.
    pub fn is_unavailable(self) -> bool {
        matches!(
            self,
            AdapterState::PoweredOff | AdapterState::Unauthorized | AdapterState::Unsupported
        )
    }
}

/// A discovered peripheral: platform id plus something printable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralHandle<Id> {
    pub id: Id,
    pub name: String,
}

/// A characteristic found during discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub service: Uuid,
    pub uuid: Uuid,
}

impl CharacteristicInfo {
    pub const TX: CharacteristicInfo = CharacteristicInfo {
        service: SERVICE_UUID,
        uuid: TX_UUID,
    };

    pub const RX: CharacteristicInfo = CharacteristicInfo {
        service: SERVICE_UUID,
        uuid: RX_UUID,
    };
}

/// Something the adapter or a peripheral reported.
///
/// Events reach the session through one channel and are handled one at a
/// time, in order.
#[derive(Debug, Clone)]
pub enum SessionEvent<Id> {
    Adapter(AdapterState),
    /// A peripheral advertising the Loop Tracks service was seen
    Discovered(PeripheralHandle<Id>),
    Disconnected(Id),
    Notification { characteristic: Uuid, value: Vec<u8> },
}

/// Central-role operations the session needs from a BLE stack.
///
/// Implemented over btleplug for real hardware and by an in-memory recorder
/// in tests.
pub trait Central {
    type PeripheralId: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;

    /// Scan for peripherals advertising `service`
    fn start_scan(&mut self, service: Uuid)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    fn stop_scan(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn connect(
        &mut self,
        id: &Self::PeripheralId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Discover services and return every characteristic found on them
    fn discover_characteristics(
        &mut self,
        id: &Self::PeripheralId,
    ) -> impl Future<Output = Result<Vec<CharacteristicInfo>, TransportError>> + Send;

    /// Enable notifications and return the characteristic's current value, if
    /// it has one. Later values arrive as `SessionEvent::Notification`.
    fn subscribe(
        &mut self,
        id: &Self::PeripheralId,
        characteristic: &CharacteristicInfo,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Stop delivering notifications for a link the session has given up on
    fn stop_notifications(&mut self) -> impl Future<Output = ()> + Send;

    /// Write without response
    fn write(
        &mut self,
        id: &Self::PeripheralId,
        characteristic: &CharacteristicInfo,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn disconnect(
        &mut self,
        id: &Self::PeripheralId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use looptracks_proto::ble;

    #[test]
    fn uuids_match_protocol_constants() {
        assert_eq!(SERVICE_UUID.to_string(), ble::SERVICE_UUID);
        assert_eq!(TX_UUID.to_string(), ble::TX_UUID);
        assert_eq!(RX_UUID.to_string(), ble::RX_UUID);
    }
}
