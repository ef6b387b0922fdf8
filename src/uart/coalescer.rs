//! Debounced multi-channel writes for the Amber light driver.
//!
//! Local writes mark a channel dirty and (re)arm a debounce timer. When the
//! timer fires, all five channels go out as one batch of frames and the dirty
//! flags clear. Inbound state reports never overwrite a channel that was dirty
//! when the report arrived: pending local values are flushed first and then
//! win over the echo.
use std::hash::Hash;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use super::frame::{self, Frame, FRAME_LEN};
use super::serial::SerialChannel;
use crate::error::CoalescerError;
use crate::scheduler::DeadlineScheduler;

pub const CHANNEL_COUNT: usize = 5;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Channel indices of the Amber driver.
pub const BRIGHTNESS: usize = 0;
pub const RED: usize = 1;
pub const GREEN: usize = 2;
pub const BLUE: usize = 3;
pub const WHITE: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelState {
    pub value: f32,
    /// A local write is waiting to be transmitted.
    pub dirty: bool,
}

/// Result of applying one inbound batch.
#[derive(Debug, Default)]
pub struct InboundOutcome {
    /// Writes produced by flushing pending local values before the batch was applied.
    pub flushed: Vec<Bytes>,
    /// Channels whose value changed because of the batch.
    pub changed: Vec<usize>,
}

pub fn to_wire(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn from_wire(value: u8) -> f32 {
    f32::from(value) / 255.0
}

/// Channel state plus debounce discipline for one connected device.
///
/// `K` is the scheduler key under which this driver's debounce timer is armed.
#[derive(Debug)]
pub struct CommandCoalescer<K> {
    key: K,
    interval: Duration,
    serial: SerialChannel,
    channels: [ChannelState; CHANNEL_COUNT],
    applying_inbound: bool,
}

impl<K: Eq + Hash + Clone> CommandCoalescer<K> {
    pub fn new(key: K, interval: Duration, serial: SerialChannel) -> Self {
        Self {
            key,
            interval,
            serial,
            channels: [ChannelState::default(); CHANNEL_COUNT],
            applying_inbound: false,
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn serial(&self) -> &SerialChannel {
        &self.serial
    }

    pub fn channel(&self, index: usize) -> Option<f32> {
        self.channels.get(index).map(|c| c.value)
    }

    pub fn is_dirty(&self, index: usize) -> bool {
        self.channels.get(index).is_some_and(|c| c.dirty)
    }

    pub fn has_pending(&self) -> bool {
        self.channels.iter().any(|c| c.dirty)
    }

    pub fn values(&self) -> [f32; CHANNEL_COUNT] {
        self.channels.map(|c| c.value)
    }

    /// Local write: clamp, mark dirty and restart the debounce timer.
    pub fn set_channel(
        &mut self,
        index: usize,
        value: f32,
        timers: &mut DeadlineScheduler<K>,
        now: Instant,
    ) -> Result<(), CoalescerError> {
        if index >= CHANNEL_COUNT {
            return Err(CoalescerError::UnknownChannel(index));
        }
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        self.assign(index, value, timers, now);
        Ok(())
    }

    fn assign(&mut self, index: usize, value: f32, timers: &mut DeadlineScheduler<K>, now: Instant) {
        self.channels[index].value = value;
        if self.applying_inbound {
            return;
        }
        self.channels[index].dirty = true;
        timers.schedule(self.key.clone(), now + self.interval);
    }

    /// Debounce expiry: clear dirty flags and emit all channels as one batch.
    ///
    /// The batch is split on frame boundaries so every write fits the
    /// transport's maximum write length once the header is added.
    pub fn flush(&mut self, timers: &mut DeadlineScheduler<K>) -> Vec<Bytes> {
        timers.cancel(&self.key);
        for ch in self.channels.iter_mut() {
            ch.dirty = false;
        }
        let frames: Vec<Frame> = self
            .channels
            .iter()
            .enumerate()
            .map(|(i, ch)| Frame::set_channel(i as u8, to_wire(ch.value)))
            .collect();

        let per_write = (self.serial.max_payload() / FRAME_LEN).max(1);
        frames
            .chunks(per_write)
            .map(|chunk| {
                let mut payload = BytesMut::new();
                frame::encode_into(chunk, &mut payload);
                self.serial.wrap_outbound(&payload)
            })
            .collect()
    }

    /// Apply one inbound batch of frames.
    pub fn on_inbound(
        &mut self,
        frames: &[Frame],
        timers: &mut DeadlineScheduler<K>,
        now: Instant,
    ) -> InboundOutcome {
        let pending = self.channels.map(|c| c.dirty);
        let mut outcome = InboundOutcome::default();
        if pending.iter().any(|d| *d) {
            outcome.flushed = self.flush(timers);
        }

        self.applying_inbound = true;
        for f in frames {
            let index = usize::from(f.channel);
            if index >= CHANNEL_COUNT {
                log::debug!("ignoring frame for unknown channel {}", index);
                continue;
            }
            if pending[index] {
                continue;
            }
            let value = from_wire(f.value);
            if self.channels[index].value != value {
                self.assign(index, value, timers, now);
                if !outcome.changed.contains(&index) {
                    outcome.changed.push(index);
                }
            }
        }
        self.applying_inbound = false;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uart::serial::HEADER_USER_DATA;

    fn driver(max_write: usize) -> CommandCoalescer<u8> {
        CommandCoalescer::new(0, DEFAULT_DEBOUNCE, SerialChannel::new(max_write))
    }

    #[test]
    fn set_channel_clamps_and_arms_timer() {
        let mut timers = DeadlineScheduler::new();
        let mut c = driver(64);
        let now = Instant::now();
        c.set_channel(RED, 3.0, &mut timers, now).unwrap();
        assert_eq!(c.channel(RED), Some(1.0));
        assert!(c.is_dirty(RED));
        assert_eq!(timers.due_at(&0), Some(now + DEFAULT_DEBOUNCE));
        assert_eq!(
            c.set_channel(CHANNEL_COUNT, 0.5, &mut timers, now),
            Err(CoalescerError::UnknownChannel(CHANNEL_COUNT))
        );
    }

    #[test]
    fn flush_emits_all_channels_and_clears_dirty() {
        let mut timers = DeadlineScheduler::new();
        let mut c = driver(64);
        c.set_channel(GREEN, 1.0, &mut timers, Instant::now()).unwrap();
        let writes = c.flush(&mut timers);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 1 + CHANNEL_COUNT * FRAME_LEN);
        assert_eq!(writes[0][0], HEADER_USER_DATA);
        let frames = frame::decode_all(&writes[0][1..]);
        assert_eq!(frames.len(), CHANNEL_COUNT);
        assert_eq!(frames[GREEN], Frame::set_channel(GREEN as u8, 255));
        assert!(!c.has_pending());
        assert!(timers.is_empty());
    }

    #[test]
    fn flush_splits_on_frame_boundaries() {
        let mut timers = DeadlineScheduler::new();
        let mut c = driver(20); // 19 payload bytes -> 3 frames per write
        let writes = c.flush(&mut timers);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].len(), 1 + 3 * FRAME_LEN);
        assert_eq!(writes[1].len(), 1 + 2 * FRAME_LEN);
    }

    #[test]
    fn inbound_does_not_mark_dirty_or_arm() {
        let mut timers = DeadlineScheduler::new();
        let mut c = driver(64);
        let out = c.on_inbound(&[Frame::set_channel(2, 255)], &mut timers, Instant::now());
        assert!(out.flushed.is_empty());
        assert_eq!(out.changed, vec![2]);
        assert_eq!(c.channel(2), Some(1.0));
        assert!(!c.has_pending());
        assert!(timers.is_empty());
    }

    #[test]
    fn unknown_inbound_channel_is_ignored() {
        let mut timers = DeadlineScheduler::new();
        let mut c = driver(64);
        let out = c.on_inbound(&[Frame::set_channel(9, 10)], &mut timers, Instant::now());
        assert!(out.changed.is_empty());
        assert_eq!(c.values(), [0.0; CHANNEL_COUNT]);
    }

    #[test]
    fn wire_conversion() {
        assert_eq!(to_wire(0.5), 128);
        assert_eq!(to_wire(f32::NAN), 0);
        assert_eq!(to_wire(-1.0), 0);
        assert_eq!(from_wire(255), 1.0);
    }
}
