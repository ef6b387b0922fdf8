//! Process-wide link counters.
use std::sync::atomic::{AtomicU64, Ordering};

static FRAMES_DECODED: AtomicU64 = AtomicU64::new(0);
static FRAMES_REJECTED: AtomicU64 = AtomicU64::new(0);
static WRITES_SENT: AtomicU64 = AtomicU64::new(0);
static DEVICES_EVICTED: AtomicU64 = AtomicU64::new(0);
static TRANSPORT_MISMATCHES: AtomicU64 = AtomicU64::new(0);

pub fn inc_frames_decoded() {
    FRAMES_DECODED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_frames_rejected() {
    FRAMES_REJECTED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_writes_sent() {
    WRITES_SENT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_devices_evicted() {
    DEVICES_EVICTED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_transport_mismatches() {
    TRANSPORT_MISMATCHES.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Snapshot {
    pub frames_decoded: u64,
    pub frames_rejected: u64,
    pub writes_sent: u64,
    pub devices_evicted: u64,
    pub transport_mismatches: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        frames_decoded: FRAMES_DECODED.load(Ordering::Relaxed),
        frames_rejected: FRAMES_REJECTED.load(Ordering::Relaxed),
        writes_sent: WRITES_SENT.load(Ordering::Relaxed),
        devices_evicted: DEVICES_EVICTED.load(Ordering::Relaxed),
        transport_mismatches: TRANSPORT_MISMATCHES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are shared with every other test in the process, so only
    // monotonic growth is asserted.
    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        inc_frames_rejected();
        inc_devices_evicted();
        let after = snapshot();
        assert!(after.frames_rejected > before.frames_rejected);
        assert!(after.devices_evicted > before.devices_evicted);
        assert!(after.frames_decoded >= before.frames_decoded);
    }
}
