use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::policy::DeviceKind;
use crate::uart::coalescer::{CommandCoalescer, CHANNEL_COUNT};

use super::TimerKey;

/// Platform-assigned peripheral identity. Stable for the life of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Uuid);

impl DeviceId {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Fresh identity for a synthetic (demo) device.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// First eight hex digits, for labels.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for DeviceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Per-device state owned by the registry.
///
/// The advertisement deadline lives in the registry's scheduler under
/// [`TimerKey::Advertisement`]; the channel driver exists only while an
/// Amber device is connected.
#[derive(Debug)]
pub struct DeviceRecord {
    pub(crate) id: DeviceId,
    pub(crate) kind: DeviceKind,
    pub(crate) state: ConnectionState,
    pub(crate) rssi: i16,
    pub(crate) bad_rssi_count: u32,
    pub(crate) should_reconnect: bool,
    pub(crate) is_demo: bool,
    pub(crate) advertised_name: Option<String>,
    pub(crate) driver: Option<CommandCoalescer<TimerKey>>,
}

impl DeviceRecord {
    pub(crate) fn discovered(
        id: DeviceId,
        kind: DeviceKind,
        rssi: i16,
        advertised_name: Option<String>,
    ) -> Self {
        Self {
            id,
            kind,
            state: ConnectionState::Disconnected,
            rssi,
            bad_rssi_count: 0,
            should_reconnect: false,
            is_demo: false,
            advertised_name,
            driver: None,
        }
    }

    pub(crate) fn demo(id: DeviceId, kind: DeviceKind, name: String) -> Self {
        Self {
            is_demo: true,
            ..Self::discovered(id, kind, 0, Some(name))
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn rssi(&self) -> i16 {
        self.rssi
    }

    pub fn bad_rssi_count(&self) -> u32 {
        self.bad_rssi_count
    }

    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    pub fn is_demo(&self) -> bool {
        self.is_demo
    }

    pub fn advertised_name(&self) -> Option<&str> {
        self.advertised_name.as_deref()
    }

    pub fn driver(&self) -> Option<&CommandCoalescer<TimerKey>> {
        self.driver.as_ref()
    }
}

/// Serializable view of a record, handed across the event-loop boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub name: String,
    pub kind: DeviceKind,
    pub state: ConnectionState,
    pub rssi: i16,
    pub bad_rssi_count: u32,
    pub should_reconnect: bool,
    pub is_demo: bool,
    pub channels: Option<[f32; CHANNEL_COUNT]>,
}
