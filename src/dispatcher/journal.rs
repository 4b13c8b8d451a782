use std::collections::VecDeque;

use parking_lot::Mutex;

/// Bounded in-memory log; the oldest entry is dropped when full.
#[derive(Debug)]
pub struct Journal<T> {
    capacity: usize,
    entries: Mutex<VecDeque<T>>,
}

impl<T: Clone> Journal<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, entry: T) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<T> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
