//! Test utilities & fixtures.
//! Provides a transport that records every request and helpers to build registries around it.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use amberlink::names::MemoryNameStore;
use amberlink::registry::{DeviceId, DeviceRegistry, RegistrySettings};
use amberlink::transport::{Advertisement, Transport, TransportHandle, UART_SERVICE_UUID};
use bytes::Bytes;
use uuid::Uuid;

pub const HANDLE: TransportHandle = TransportHandle(7);

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect(DeviceId),
    Disconnect(DeviceId),
    Write(DeviceId, Uuid, Bytes),
    Subscribe(DeviceId, Uuid),
}

/// Transport that only records what the registry asked of it.
#[derive(Debug, Clone)]
pub struct RecordingTransport {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub max_write_len: usize,
}

impl RecordingTransport {
    pub fn new(max_write_len: usize) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            max_write_len,
        }
    }

    pub fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

impl Transport for RecordingTransport {
    fn handle(&self) -> TransportHandle {
        HANDLE
    }

    fn connect(&mut self, id: DeviceId) {
        self.calls.lock().unwrap().push(Call::Connect(id));
    }

    fn disconnect(&mut self, id: DeviceId) {
        self.calls.lock().unwrap().push(Call::Disconnect(id));
    }

    fn write(&mut self, id: DeviceId, characteristic: Uuid, value: Bytes) {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Write(id, characteristic, value));
    }

    fn subscribe(&mut self, id: DeviceId, characteristic: Uuid) {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Subscribe(id, characteristic));
    }

    fn maximum_write_length(&self, _id: DeviceId) -> usize {
        self.max_write_len
    }
}

pub fn settings(max_selected: usize) -> RegistrySettings {
    RegistrySettings {
        max_selected,
        advertisement_timeout: Duration::from_secs(10),
        debounce: Duration::from_millis(100),
        ..RegistrySettings::default()
    }
}

pub fn registry(max_selected: usize) -> (DeviceRegistry<RecordingTransport>, RecordingTransport) {
    let transport = RecordingTransport::new(64);
    let registry = DeviceRegistry::new(
        settings(max_selected),
        transport.clone(),
        Box::new(MemoryNameStore::new()),
    );
    (registry, transport)
}

pub fn amber_adv(name: &str) -> Advertisement {
    Advertisement {
        local_name: Some(name.to_string()),
        service_uuids: vec![UART_SERVICE_UUID],
    }
}

/// Notification payload: header byte followed by raw frames.
pub fn notification(frames: &[[u8; 5]]) -> Bytes {
    let mut out = vec![0x01];
    for f in frames {
        out.extend_from_slice(f);
    }
    Bytes::from(out)
}
