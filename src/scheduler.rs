//! Single-shot deadline scheduler driven by the event loop.
//!
//! Timers are keyed; arming a key that is already armed replaces the old
//! deadline (cancel-then-schedule). Cancellation is lazy: stale heap entries
//! are skipped when they surface. Cancelling a timer that already fired is a
//! no-op.
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;
use std::time::Instant;

#[derive(Debug)]
struct Entry<K> {
    due: Instant,
    seq: u64,
    key: K,
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<K> Eq for Entry<K> {}

impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap yields the earliest deadline first; seq keeps
// equal deadlines in arming order.
impl<K> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug)]
pub struct DeadlineScheduler<K> {
    heap: BinaryHeap<Entry<K>>,
    armed: HashMap<K, (u64, Instant)>,
    next_seq: u64,
}

impl<K: Eq + Hash + Clone> DeadlineScheduler<K> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            armed: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Arm `key` to fire at `due`, replacing any earlier arming of the same key.
    pub fn schedule(&mut self, key: K, due: Instant) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.armed.insert(key.clone(), (seq, due));
        self.heap.push(Entry { due, seq, key });
    }

    /// Disarm `key`. Returns whether it was armed.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.armed.remove(key).is_some()
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.armed.contains_key(key)
    }

    pub fn due_at(&self, key: &K) -> Option<Instant> {
        self.armed.get(key).map(|(_, due)| *due)
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    /// Earliest armed deadline, if any.
    pub fn next_due(&mut self) -> Option<Instant> {
        self.discard_stale();
        self.heap.peek().map(|e| e.due)
    }

    /// Pop one timer whose deadline is `<= now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<K> {
        self.discard_stale();
        if self.heap.peek().is_some_and(|e| e.due <= now) {
            let entry = self.heap.pop()?;
            self.armed.remove(&entry.key);
            self.discard_stale();
            return Some(entry.key);
        }
        None
    }

    fn discard_stale(&mut self) {
        while let Some(top) = self.heap.peek() {
            match self.armed.get(&top.key) {
                Some((seq, _)) if *seq == top.seq => break,
                _ => {
                    self.heap.pop();
                }
            }
        }
    }
}

impl<K: Eq + Hash + Clone> Default for DeadlineScheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fires_in_deadline_order() {
        let t0 = Instant::now();
        let mut s = DeadlineScheduler::new();
        s.schedule("b", t0 + Duration::from_millis(20));
        s.schedule("a", t0 + Duration::from_millis(10));
        assert_eq!(s.next_due(), Some(t0 + Duration::from_millis(10)));
        assert_eq!(s.pop_due(t0), None);
        let later = t0 + Duration::from_millis(25);
        assert_eq!(s.pop_due(later), Some("a"));
        assert_eq!(s.pop_due(later), Some("b"));
        assert_eq!(s.pop_due(later), None);
        assert!(s.is_empty());
    }

    #[test]
    fn rearm_replaces_previous_deadline() {
        let t0 = Instant::now();
        let mut s = DeadlineScheduler::new();
        s.schedule(1u8, t0 + Duration::from_millis(10));
        s.schedule(1u8, t0 + Duration::from_millis(50));
        assert_eq!(s.len(), 1);
        assert_eq!(s.pop_due(t0 + Duration::from_millis(20)), None);
        assert_eq!(s.pop_due(t0 + Duration::from_millis(50)), Some(1));
    }

    #[test]
    fn cancel_after_fire_is_noop() {
        let t0 = Instant::now();
        let mut s = DeadlineScheduler::new();
        s.schedule(7u8, t0);
        assert_eq!(s.pop_due(t0), Some(7));
        assert!(!s.cancel(&7));
        assert_eq!(s.next_due(), None);
    }
}
