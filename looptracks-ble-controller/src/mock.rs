use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::central::{Central, CharacteristicInfo};
use crate::TransportError;

/// Everything the session asked the mock central to do
#[derive(Clone, Debug, Default)]
pub struct Recorded {
    pub scans: Vec<Uuid>,
    pub scans_stopped: usize,
    pub connects: Vec<String>,
    pub subscribed: Vec<Uuid>,
    pub notifications_stopped: usize,
    pub writes: Vec<(String, Uuid, Vec<u8>)>,
    pub disconnects: Vec<String>,
}

#[derive(Debug, Default)]
struct MockState {
    recorded: Recorded,
    characteristics: Vec<CharacteristicInfo>,
    rx_value: Option<Vec<u8>>,
    fail_scan: bool,
    fail_connect: bool,
    fail_write: bool,
}

/// In-memory central that records calls. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct MockCentral {
    inner: Arc<Mutex<MockState>>,
}

impl MockCentral {
    /// A central whose devices expose both Loop Tracks characteristics
    pub fn new() -> Self {
        Self::with_characteristics(vec![CharacteristicInfo::TX, CharacteristicInfo::RX])
    }

    pub fn with_characteristics(characteristics: Vec<CharacteristicInfo>) -> Self {
        let central = Self::default();
        central.lock().characteristics = characteristics;
        central
    }

    /// Value RX holds when the session subscribes
    pub fn set_rx_value(&self, value: &[u8]) {
        self.lock().rx_value = Some(value.to_vec());
    }

    pub fn fail_scan(&self, fail: bool) {
        self.lock().fail_scan = fail;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    pub fn fail_write(&self, fail: bool) {
        self.lock().fail_write = fail;
    }

    pub fn recorded(&self) -> Recorded {
        self.lock().recorded.clone()
    }

    /// Written payloads decoded as text
    pub fn written_lines(&self) -> Vec<String> {
        self.lock()
            .recorded
            .writes
            .iter()
            .map(|(_, _, data)| String::from_utf8_lossy(data).into_owned())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap()
    }
}

impl Central for MockCentral {
    type PeripheralId = String;

    async fn start_scan(&mut self, service: Uuid) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.fail_scan {
            return Err(TransportError::AdapterUnavailable);
        }
        state.recorded.scans.push(service);
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<(), TransportError> {
        self.lock().recorded.scans_stopped += 1;
        Ok(())
    }

    async fn connect(&mut self, id: &String) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.fail_connect {
            return Err(TransportError::Connect("peer refused".to_string()));
        }
        state.recorded.connects.push(id.clone());
        Ok(())
    }

    async fn discover_characteristics(
        &mut self,
        _id: &String,
    ) -> Result<Vec<CharacteristicInfo>, TransportError> {
        Ok(self.lock().characteristics.clone())
    }

    async fn subscribe(
        &mut self,
        _id: &String,
        characteristic: &CharacteristicInfo,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let mut state = self.lock();
        state.recorded.subscribed.push(characteristic.uuid);
        Ok(state.rx_value.clone())
    }

    async fn stop_notifications(&mut self) {
        self.lock().recorded.notifications_stopped += 1;
    }

    async fn write(
        &mut self,
        id: &String,
        characteristic: &CharacteristicInfo,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.fail_write {
            return Err(TransportError::Write("gatt error".to_string()));
        }
        state
            .recorded
            .writes
            .push((id.clone(), characteristic.uuid, data.to_vec()));
        Ok(())
    }

    async fn disconnect(&mut self, id: &String) -> Result<(), TransportError> {
        self.lock().recorded.disconnects.push(id.clone());
        Ok(())
    }
}
