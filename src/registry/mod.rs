//! # Device Registry
//!
//! Tracks every peripheral the radio has reported and drives each one through
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──connected──▶ Connected
//!      ▲                        │                         │
//!      └──── connect failed ────┘◀──── disconnected ──────┘
//! ```
//!
//! Demo devices have no radio behind them and jump straight between
//! Disconnected and Connected.
//!
//! ## Policies
//!
//! - **Admission**: a new device is only recorded if its family's policy
//!   admits the reported RSSI. Rejected newcomers leave no trace.
//! - **RSSI eviction**: a recorded device that keeps failing the policy is
//!   dropped after the family's bad-reading limit.
//! - **Advertisement timeout**: a device that stops advertising is dropped,
//!   unless it is connected or selected for reconnection.
//! - **Selection bound**: at most `max_selected` devices are selected for
//!   automatic reconnection; selecting another disconnects the oldest.
//!
//! Transport callbacks carrying a foreign [`TransportHandle`] are ignored, as
//! are callbacks for devices the registry no longer knows.

pub mod device;
pub mod policy;
pub mod selection;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, info, trace, warn};
use tokio::sync::mpsc;

pub use device::{ConnectionState, DeviceId, DeviceRecord, DeviceSnapshot};
pub use policy::{DeviceKind, RssiPolicy};
pub use selection::SelectedSet;

use crate::error::RuntimeError;
use crate::events::{DeviceEvent, EventBus};
use crate::logutil::escape_log;
use crate::message_log::MessageLog;
use crate::metrics;
use crate::names::NameStore;
use crate::scheduler::DeadlineScheduler;
use crate::transport::{
    Advertisement, Transport, TransportEvent, TransportHandle, UART_NOTIFY_CHAR_UUID,
    UART_WRITE_CHAR_UUID,
};
use crate::uart::coalescer::DEFAULT_DEBOUNCE;
use crate::uart::{frame, CommandCoalescer, SerialChannel, CHANNEL_COUNT};

/// Timers owned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    Advertisement(DeviceId),
    Debounce(DeviceId),
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub max_selected: usize,
    pub advertisement_timeout: Duration,
    pub amber: RssiPolicy,
    pub debounce: Duration,
    pub message_log_capacity: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_selected: 1,
            advertisement_timeout: Duration::from_secs(10),
            amber: RssiPolicy::default(),
            debounce: DEFAULT_DEBOUNCE,
            message_log_capacity: 500,
        }
    }
}

pub struct DeviceRegistry<T> {
    settings: RegistrySettings,
    transport: T,
    devices: HashMap<DeviceId, DeviceRecord>,
    selected: SelectedSet,
    timers: DeadlineScheduler<TimerKey>,
    events: EventBus,
    log: MessageLog,
    names: Box<dyn NameStore + Send>,
}

impl<T: Transport> DeviceRegistry<T> {
    pub fn new(settings: RegistrySettings, transport: T, names: Box<dyn NameStore + Send>) -> Self {
        let selected = SelectedSet::new(settings.max_selected);
        let log = MessageLog::new(settings.message_log_capacity);
        Self {
            settings,
            transport,
            devices: HashMap::new(),
            selected,
            timers: DeadlineScheduler::new(),
            events: EventBus::new(),
            log,
            names,
        }
    }

    // ---- accessors -------------------------------------------------------

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn device(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.devices.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Selected devices, oldest first.
    pub fn selected(&self) -> Vec<DeviceId> {
        self.selected.iter().copied().collect()
    }

    pub fn message_log(&self) -> &MessageLog {
        &self.log
    }

    pub fn advertisement_deadline(&self, id: &DeviceId) -> Option<Instant> {
        self.timers.due_at(&TimerKey::Advertisement(*id))
    }

    pub fn channels(&self, id: &DeviceId) -> Option<[f32; CHANNEL_COUNT]> {
        self.devices.get(id)?.driver.as_ref().map(|d| d.values())
    }

    /// Custom name, else advertised name, else a label built from the id.
    pub fn display_name(&self, id: &DeviceId) -> Option<String> {
        let record = self.devices.get(id)?;
        Some(
            self.names
                .name_for(id)
                .or_else(|| record.advertised_name.clone())
                .unwrap_or_else(|| format!("Device {}", id.short())),
        )
    }

    pub fn rename(&mut self, id: DeviceId, name: Option<String>) -> anyhow::Result<()> {
        let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self.names.set_name(id, name)
    }

    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        let mut out: Vec<DeviceSnapshot> = self
            .devices
            .values()
            .map(|r| DeviceSnapshot {
                id: r.id,
                name: self.display_name(&r.id).unwrap_or_default(),
                kind: r.kind,
                state: r.state,
                rssi: r.rssi,
                bad_rssi_count: r.bad_rssi_count,
                should_reconnect: r.should_reconnect,
                is_demo: r.is_demo,
                channels: r.driver.as_ref().map(|d| d.values()),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    // ---- timers ----------------------------------------------------------

    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.timers.next_due()
    }

    /// Fire every timer that is due at `now`.
    pub fn fire_due(&mut self, now: Instant) {
        while let Some(key) = self.timers.pop_due(now) {
            match key {
                TimerKey::Advertisement(id) => self.on_advertisement_timeout(id, now),
                TimerKey::Debounce(id) => self.flush_driver(id),
            }
        }
    }

    fn arm_advertisement(&mut self, id: DeviceId, now: Instant) {
        self.timers.schedule(
            TimerKey::Advertisement(id),
            now + self.settings.advertisement_timeout,
        );
    }

    // ---- transport events ------------------------------------------------

    /// Route one transport callback. Events from a foreign transport are dropped.
    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        if !self.owns(event.handle()) {
            return;
        }
        match event {
            TransportEvent::Discovered {
                id,
                rssi,
                advertisement,
                ..
            } => self.on_discovered(id, rssi, &advertisement, now),
            TransportEvent::Connected { handle, id } => self.on_transport_connected(handle, id, now),
            TransportEvent::Disconnected { handle, id, error } => {
                self.on_transport_disconnected(handle, id, error, now)
            }
            TransportEvent::ConnectFailed { handle, id, error } => {
                self.on_transport_connect_failed(handle, id, error, now)
            }
            TransportEvent::CharacteristicUpdated {
                handle,
                id,
                characteristic,
                value,
                error,
            } => self.on_characteristic_updated(handle, id, characteristic, value, error, now),
            TransportEvent::PoweredOff { handle } => self.on_powered_off(handle, now),
        }
    }

    fn owns(&self, handle: TransportHandle) -> bool {
        let ours = self.transport.handle();
        if handle != ours {
            warn!("ignoring callback from {} (registry uses {})", handle, ours);
            metrics::inc_transport_mismatches();
            return false;
        }
        true
    }

    // ---- discovery -------------------------------------------------------

    /// Advertisement from the radio. Unknown devices go through admission,
    /// known ones through [`Self::on_re_discovered`].
    pub fn on_discovered(
        &mut self,
        id: DeviceId,
        rssi: i16,
        advertisement: &Advertisement,
        now: Instant,
    ) {
        if self.devices.contains_key(&id) {
            self.on_re_discovered(id, rssi, now);
            return;
        }
        let kind = DeviceKind::classify(advertisement);
        if !kind.admits(rssi, &self.settings.amber) {
            trace!("not admitting {} ({:?}, rssi {})", id, kind, rssi);
            return;
        }
        let name = advertisement.local_name.clone();
        info!(
            "discovered {} {:?} '{}' rssi {}",
            id,
            kind,
            escape_log(name.as_deref().unwrap_or("")),
            rssi
        );
        self.devices
            .insert(id, DeviceRecord::discovered(id, kind, rssi, name.clone()));
        self.events.publish(DeviceEvent::Discovered {
            id,
            kind,
            rssi,
            name,
        });
        self.arm_advertisement(id, now);
    }

    /// Fresh RSSI for a known device.
    pub fn on_re_discovered(&mut self, id: DeviceId, rssi: i16, now: Instant) {
        let policy = self.settings.amber;
        let Some(record) = self.devices.get_mut(&id) else {
            debug!("re-discovery of unknown device {}", id);
            return;
        };
        if record.kind.admits(rssi, &policy) {
            record.rssi = rssi;
            record.bad_rssi_count = 0;
            self.events.publish(DeviceEvent::Updated { id, rssi });
        } else {
            record.bad_rssi_count += 1;
            trace!(
                "{} bad rssi {} ({} in a row)",
                id,
                rssi,
                record.bad_rssi_count
            );
            if record.kind.should_evict(record.bad_rssi_count, &policy) {
                info!("{} evicted after {} bad readings", id, record.bad_rssi_count);
                self.evict(id);
                return;
            }
        }
        if !record.is_connected() {
            self.arm_advertisement(id, now);
        }
    }

    /// Advertisement deadline expired.
    pub fn on_advertisement_timeout(&mut self, id: DeviceId, _now: Instant) {
        let Some(record) = self.devices.get(&id) else {
            return;
        };
        if record.is_connected() || record.should_reconnect {
            trace!("{} quiet but still wanted; keeping", id);
            return;
        }
        debug!("{} stopped advertising", id);
        self.evict(id);
    }

    /// Insert a synthetic device with no radio behind it.
    pub fn add_demo_device(&mut self, name: &str, kind: DeviceKind) -> DeviceId {
        let id = DeviceId::new_random();
        info!("adding demo device '{}' ({})", escape_log(name), id);
        self.devices
            .insert(id, DeviceRecord::demo(id, kind, name.to_string()));
        self.events.publish(DeviceEvent::Discovered {
            id,
            kind,
            rssi: 0,
            name: Some(name.to_string()),
        });
        id
    }

    // ---- connection control ----------------------------------------------

    /// Select `id` for reconnection and start connecting.
    pub fn connect(&mut self, id: DeviceId, now: Instant) {
        let Some(record) = self.devices.get(&id) else {
            debug!("connect: unknown device {}", id);
            return;
        };
        if record.state != ConnectionState::Disconnected {
            trace!("connect: {} already {:?}", id, record.state);
            return;
        }
        let is_demo = record.is_demo;
        self.select(id, now);

        // Enforcing the bound may have cascaded; re-check the record.
        let Some(record) = self.devices.get_mut(&id) else {
            return;
        };
        if is_demo {
            self.mark_connected(id, now);
        } else {
            record.state = ConnectionState::Connecting;
            info!("connecting to {}", id);
            self.transport.connect(id);
        }
    }

    /// Deselect `id` and drop its link. A device that is not connected is removed outright.
    pub fn disconnect(&mut self, id: DeviceId, now: Instant) {
        let Some(record) = self.devices.get_mut(&id) else {
            debug!("disconnect: unknown device {}", id);
            return;
        };
        record.should_reconnect = false;
        self.selected.remove(&id);
        match (record.state, record.is_demo) {
            (ConnectionState::Connected, true) => self.mark_disconnected(id, None, now),
            (ConnectionState::Connected, false) => {
                info!("disconnecting {}", id);
                self.transport.disconnect(id);
            }
            _ => self.evict(id),
        }
    }

    /// Explicit removal; a live link is torn down first.
    pub fn remove(&mut self, id: DeviceId) {
        self.evict(id);
    }

    pub fn set_channel(
        &mut self,
        id: DeviceId,
        index: usize,
        value: f32,
        now: Instant,
    ) -> Result<(), RuntimeError> {
        let record = self
            .devices
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownDevice(id))?;
        let driver = record.driver.as_mut().ok_or(RuntimeError::NoDriver(id))?;
        driver.set_channel(index, value, &mut self.timers, now)?;
        Ok(())
    }

    fn select(&mut self, id: DeviceId, now: Instant) {
        if let Some(record) = self.devices.get_mut(&id) {
            record.should_reconnect = true;
        }
        self.selected.insert(id);
        while let Some(oldest) = self.selected.pop_overflow() {
            info!("selection full; releasing {}", oldest);
            self.disconnect(oldest, now);
        }
    }

    fn mark_connected(&mut self, id: DeviceId, now: Instant) {
        let debounce = self.settings.debounce;
        let max_write = self.transport.maximum_write_length(id);
        let Some(record) = self.devices.get_mut(&id) else {
            return;
        };
        record.state = ConnectionState::Connected;
        let is_demo = record.is_demo;
        let wants_driver = record.kind.has_channel_driver();
        let newly_selected = !record.should_reconnect;
        if wants_driver {
            record.driver = Some(CommandCoalescer::new(
                TimerKey::Debounce(id),
                debounce,
                SerialChannel::new(max_write),
            ));
        }
        self.timers.cancel(&TimerKey::Advertisement(id));
        if newly_selected {
            self.select(id, now);
        }
        if wants_driver && !is_demo {
            self.transport.subscribe(id, UART_NOTIFY_CHAR_UUID);
        }
        info!("connected to {}", id);
        self.log.info(Some(id), "connected");
        self.events.publish(DeviceEvent::Connected { id });
    }

    fn mark_disconnected(&mut self, id: DeviceId, error: Option<String>, now: Instant) {
        let Some(record) = self.devices.get_mut(&id) else {
            return;
        };
        record.state = ConnectionState::Disconnected;
        record.driver = None;
        let is_demo = record.is_demo;
        let reconnect = record.should_reconnect && !is_demo;
        self.timers.cancel(&TimerKey::Debounce(id));
        match &error {
            Some(e) => {
                warn!("{} disconnected: {}", id, e);
                self.log.info(Some(id), format!("disconnected: {}", e));
            }
            None => {
                info!("{} disconnected", id);
                self.log.info(Some(id), "disconnected");
            }
        }
        self.events.publish(DeviceEvent::Disconnected { id, error });

        if reconnect {
            if let Some(record) = self.devices.get_mut(&id) {
                record.state = ConnectionState::Connecting;
            }
            info!("reconnecting to {}", id);
            self.transport.connect(id);
        } else if !is_demo {
            self.arm_advertisement(id, now);
        }
    }

    /// Drop `id` from the registry, disconnecting it first if needed.
    fn evict(&mut self, id: DeviceId) {
        let Some(record) = self.devices.remove(&id) else {
            return;
        };
        self.timers.cancel(&TimerKey::Advertisement(id));
        self.timers.cancel(&TimerKey::Debounce(id));
        self.selected.remove(&id);
        if record.state != ConnectionState::Disconnected && !record.is_demo {
            self.transport.disconnect(id);
        }
        if record.is_connected() {
            self.events
                .publish(DeviceEvent::Disconnected { id, error: None });
        }
        metrics::inc_devices_evicted();
        debug!("lost {}", id);
        self.events.publish(DeviceEvent::Lost { id });
    }

    // ---- transport-driven transitions ------------------------------------

    pub fn on_transport_connected(&mut self, handle: TransportHandle, id: DeviceId, now: Instant) {
        if !self.owns(handle) {
            return;
        }
        if !self.devices.contains_key(&id) {
            debug!("connected callback for unknown device {}", id);
            return;
        }
        self.mark_connected(id, now);
    }

    pub fn on_transport_disconnected(
        &mut self,
        handle: TransportHandle,
        id: DeviceId,
        error: Option<String>,
        now: Instant,
    ) {
        if !self.owns(handle) {
            return;
        }
        if !self.devices.contains_key(&id) {
            debug!("disconnected callback for unknown device {}", id);
            return;
        }
        self.mark_disconnected(id, error, now);
    }

    pub fn on_transport_connect_failed(
        &mut self,
        handle: TransportHandle,
        id: DeviceId,
        error: Option<String>,
        now: Instant,
    ) {
        if !self.owns(handle) {
            return;
        }
        let Some(record) = self.devices.get_mut(&id) else {
            debug!("connect-failed callback for unknown device {}", id);
            return;
        };
        if record.state != ConnectionState::Connecting {
            debug!("stale connect-failed for {} ({:?})", id, record.state);
            return;
        }
        record.state = ConnectionState::Disconnected;
        warn!(
            "connect to {} failed: {}",
            id,
            error.as_deref().unwrap_or("unknown error")
        );
        self.log.info(
            Some(id),
            format!(
                "connect failed: {}",
                error.as_deref().unwrap_or("unknown error")
            ),
        );
        self.events.publish(DeviceEvent::ConnectFailed { id, error });
        self.arm_advertisement(id, now);
    }

    pub fn on_characteristic_updated(
        &mut self,
        handle: TransportHandle,
        id: DeviceId,
        characteristic: uuid::Uuid,
        value: Bytes,
        error: Option<String>,
        now: Instant,
    ) {
        if !self.owns(handle) {
            return;
        }
        if let Some(e) = error {
            warn!("read error from {}: {}", id, e);
            self.log.info(Some(id), format!("read error: {}", e));
            return;
        }
        if characteristic != UART_NOTIFY_CHAR_UUID {
            trace!("ignoring update of {} from {}", characteristic, id);
            return;
        }
        let Some(record) = self.devices.get_mut(&id) else {
            debug!("notification from unknown device {}", id);
            return;
        };
        self.log.incoming(id, &value);
        let Some(driver) = record.driver.as_mut() else {
            debug!("notification from {} with no driver", id);
            return;
        };
        let Some(payload) = driver.serial().unwrap_inbound(&value) else {
            debug!("{} sent a non user-data payload", id);
            return;
        };
        let frames = frame::decode_all(payload);
        let rejected = payload.len() / frame::FRAME_LEN - frames.len();
        if rejected > 0 {
            self.log
                .info(Some(id), format!("rejected {} malformed frames", rejected));
        }
        let trailing = payload.len() % frame::FRAME_LEN;
        if trailing > 0 {
            self.log
                .info(Some(id), format!("dropped {} trailing bytes", trailing));
        }
        let outcome = driver.on_inbound(&frames, &mut self.timers, now);
        let values = driver.values();
        let is_demo = record.is_demo;

        self.transmit(id, is_demo, outcome.flushed);
        if !outcome.changed.is_empty() {
            self.events
                .publish(DeviceEvent::ChannelsUpdated { id, values });
        }
    }

    /// The radio went away: every transport-backed device is dropped.
    pub fn on_powered_off(&mut self, handle: TransportHandle, _now: Instant) {
        if !self.owns(handle) {
            return;
        }
        let ids: Vec<DeviceId> = self
            .devices
            .values()
            .filter(|r| !r.is_demo)
            .map(|r| r.id)
            .collect();
        info!("radio powered off; dropping {} devices", ids.len());
        self.log.info(None, "radio powered off");
        for id in ids {
            self.evict(id);
        }
    }

    // ---- outbound --------------------------------------------------------

    fn flush_driver(&mut self, id: DeviceId) {
        let Some(record) = self.devices.get_mut(&id) else {
            return;
        };
        let Some(driver) = record.driver.as_mut() else {
            return;
        };
        let writes = driver.flush(&mut self.timers);
        let is_demo = record.is_demo;
        self.transmit(id, is_demo, writes);
    }

    fn transmit(&mut self, id: DeviceId, is_demo: bool, writes: Vec<Bytes>) {
        for write in writes {
            self.log.outgoing(id, &write);
            metrics::inc_writes_sent();
            if is_demo {
                trace!("demo write to {} ({} bytes)", id, write.len());
            } else {
                self.transport.write(id, UART_WRITE_CHAR_UUID, write);
            }
        }
    }
}
