//! Device lifecycle events and their fan-out to subscribers.
use serde::Serialize;
use tokio::sync::mpsc;

use crate::registry::{DeviceId, DeviceKind};
use crate::uart::CHANNEL_COUNT;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    Discovered {
        id: DeviceId,
        kind: DeviceKind,
        rssi: i16,
        name: Option<String>,
    },
    Updated {
        id: DeviceId,
        rssi: i16,
    },
    Lost {
        id: DeviceId,
    },
    Connected {
        id: DeviceId,
    },
    Disconnected {
        id: DeviceId,
        error: Option<String>,
    },
    ConnectFailed {
        id: DeviceId,
        error: Option<String>,
    },
    /// The device reported channel values that differ from ours.
    ChannelsUpdated {
        id: DeviceId,
        values: [f32; CHANNEL_COUNT],
    },
}

impl DeviceEvent {
    pub fn device(&self) -> DeviceId {
        match self {
            DeviceEvent::Discovered { id, .. }
            | DeviceEvent::Updated { id, .. }
            | DeviceEvent::Lost { id }
            | DeviceEvent::Connected { id }
            | DeviceEvent::Disconnected { id, .. }
            | DeviceEvent::ConnectFailed { id, .. }
            | DeviceEvent::ChannelsUpdated { id, .. } => *id,
        }
    }
}

/// Broadcasts events to any number of independent subscribers.
///
/// Subscribers whose receiver was dropped are pruned on the next publish.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<DeviceEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<DeviceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: DeviceEvent) {
        log::debug!("event: {:?}", event);
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fans_out_and_prunes_closed_subscribers() {
        let mut bus = EventBus::new();
        let mut a = bus.subscribe();
        let b = bus.subscribe();
        drop(b);
        let id = DeviceId::new_random();
        bus.publish(DeviceEvent::Lost { id });
        assert_eq!(a.try_recv().unwrap(), DeviceEvent::Lost { id });
        assert_eq!(bus.subscriber_count(), 1);
    }
}
