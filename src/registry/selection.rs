use std::collections::VecDeque;

use super::DeviceId;

/// Devices marked for automatic reconnection, oldest first.
///
/// Overflow is resolved FIFO: the device selected earliest goes first,
/// regardless of how recently it was used.
#[derive(Debug, Clone)]
pub struct SelectedSet {
    order: VecDeque<DeviceId>,
    max: usize,
}

impl SelectedSet {
    /// `max` is raised to 1; an empty bound would evict every new selection.
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            order: VecDeque::with_capacity(max + 1),
            max,
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Append `id`. Returns false when it was already selected (order unchanged).
    pub fn insert(&mut self, id: DeviceId) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.order.push_back(id);
        true
    }

    pub fn remove(&mut self, id: &DeviceId) -> bool {
        match self.order.iter().position(|d| d == id) {
            Some(pos) => {
                self.order.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.order.contains(id)
    }

    /// Pop the oldest entry while the set is over its bound.
    pub fn pop_overflow(&mut self) -> Option<DeviceId> {
        if self.order.len() > self.max {
            self.order.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceId> {
        self.order.iter()
    }
}
