//! Ring Buffer Implementation

use std::collections::VecDeque;

/// Single-owner ring buffer that overwrites its oldest entry when full
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Stored items, oldest at the front
    storage: VecDeque<T>,
    /// Capacity of the buffer
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an item into the buffer (overwrites oldest if full)
    pub fn push(&mut self, item: T) {
        if self.storage.len() >= self.capacity {
            self.storage.pop_front();
        }
        self.storage.push_back(item);
    }

    /// Get the number of items currently in the buffer
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.storage.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy out the contents, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.storage.iter().cloned().collect()
    }
}

impl RingBuffer<f64> {
    /// Arithmetic mean of the buffered values, `None` when empty
    pub fn mean(&self) -> Option<f64> {
        if self.storage.is_empty() {
            return None;
        }
        Some(self.storage.iter().sum::<f64>() / self.storage.len() as f64)
    }
}
