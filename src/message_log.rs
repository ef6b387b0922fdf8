//! Timestamped record of traffic and notable link events, for the application to display.
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::logutil::hex_snippet;
use crate::registry::DeviceId;

/// Longest hex preview kept per traffic entry (bytes).
const MAX_HEX_BYTES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
    Info,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub device: Option<DeviceId>,
    pub text: String,
}

/// Bounded ring of [`LogEntry`]s; the oldest entry is dropped when full.
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, direction: Direction, device: Option<DeviceId>, text: String) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            timestamp: Utc::now(),
            direction,
            device,
            text,
        });
    }

    pub fn incoming(&mut self, device: DeviceId, bytes: &[u8]) {
        self.push(
            Direction::Incoming,
            Some(device),
            hex_snippet(bytes, MAX_HEX_BYTES),
        );
    }

    pub fn outgoing(&mut self, device: DeviceId, bytes: &[u8]) {
        self.push(
            Direction::Outgoing,
            Some(device),
            hex_snippet(bytes, MAX_HEX_BYTES),
        );
    }

    pub fn info(&mut self, device: Option<DeviceId>, text: impl Into<String>) {
        self.push(Direction::Info, device, text.into());
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_oldest_when_full() {
        let mut log = MessageLog::new(2);
        let id = DeviceId::new_random();
        log.info(None, "one");
        log.outgoing(id, &[0x01, 0xAB]);
        log.incoming(id, &[0x01]);
        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].direction, Direction::Outgoing);
        assert_eq!(entries[0].text, "01ab");
        assert_eq!(entries[1].direction, Direction::Incoming);
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut log = MessageLog::new(0);
        log.info(None, "ignored");
        assert!(log.is_empty());
    }
}
