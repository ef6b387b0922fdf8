//! Boundary to the host BLE stack.
//!
//! The registry drives the radio only through [`Transport`]; the radio reports
//! back through [`TransportEvent`]s delivered on the event loop. Requests are
//! fire-and-forget, their outcome arrives later as an event.
use std::fmt;

use bytes::Bytes;
use uuid::Uuid;

use crate::registry::DeviceId;

/// UART service advertised by the Amber family.
pub const UART_SERVICE_UUID: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);
/// Characteristic the central writes to.
pub const UART_WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E);
/// Characteristic the peripheral notifies on.
pub const UART_NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);

/// ATT default MTU (23) minus the 3-byte ATT header.
pub const DEFAULT_MAX_WRITE_LEN: usize = 20;

/// Identity of one transport instance. Events carrying another handle are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportHandle(pub u64);

impl fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport#{}", self.0)
    }
}

/// Advertisement payload fields the registry cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub local_name: Option<String>,
    pub service_uuids: Vec<Uuid>,
}

impl Advertisement {
    pub fn advertises(&self, service: &Uuid) -> bool {
        self.service_uuids.iter().any(|s| s == service)
    }
}

pub trait Transport {
    fn handle(&self) -> TransportHandle;
    fn connect(&mut self, id: DeviceId);
    fn disconnect(&mut self, id: DeviceId);
    fn write(&mut self, id: DeviceId, characteristic: Uuid, value: Bytes);
    fn subscribe(&mut self, id: DeviceId, characteristic: Uuid);
    /// Negotiated maximum write length for `id`.
    fn maximum_write_length(&self, id: DeviceId) -> usize;
}

/// Callbacks from the radio, serialized onto the event loop.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Discovered {
        handle: TransportHandle,
        id: DeviceId,
        rssi: i16,
        advertisement: Advertisement,
    },
    Connected {
        handle: TransportHandle,
        id: DeviceId,
    },
    Disconnected {
        handle: TransportHandle,
        id: DeviceId,
        error: Option<String>,
    },
    ConnectFailed {
        handle: TransportHandle,
        id: DeviceId,
        error: Option<String>,
    },
    CharacteristicUpdated {
        handle: TransportHandle,
        id: DeviceId,
        characteristic: Uuid,
        value: Bytes,
        error: Option<String>,
    },
    /// The radio was switched off; every link is gone.
    PoweredOff { handle: TransportHandle },
}

impl TransportEvent {
    pub fn handle(&self) -> TransportHandle {
        match self {
            TransportEvent::Discovered { handle, .. }
            | TransportEvent::Connected { handle, .. }
            | TransportEvent::Disconnected { handle, .. }
            | TransportEvent::ConnectFailed { handle, .. }
            | TransportEvent::CharacteristicUpdated { handle, .. }
            | TransportEvent::PoweredOff { handle } => *handle,
        }
    }
}

/// Transport with no radio behind it. Used for demo-only sessions.
#[derive(Debug, Clone)]
pub struct NullTransport {
    handle: TransportHandle,
}

impl NullTransport {
    pub fn new(handle: TransportHandle) -> Self {
        Self { handle }
    }
}

impl Transport for NullTransport {
    fn handle(&self) -> TransportHandle {
        self.handle
    }

    fn connect(&mut self, id: DeviceId) {
        log::debug!("{}: connect {} dropped (no radio)", self.handle, id);
    }

    fn disconnect(&mut self, id: DeviceId) {
        log::debug!("{}: disconnect {} dropped (no radio)", self.handle, id);
    }

    fn write(&mut self, id: DeviceId, _characteristic: Uuid, value: Bytes) {
        log::debug!(
            "{}: write of {} bytes to {} dropped (no radio)",
            self.handle,
            value.len(),
            id
        );
    }

    fn subscribe(&mut self, _id: DeviceId, _characteristic: Uuid) {}

    fn maximum_write_length(&self, _id: DeviceId) -> usize {
        DEFAULT_MAX_WRITE_LEN
    }
}
