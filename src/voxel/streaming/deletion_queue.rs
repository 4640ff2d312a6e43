//! Epoch-tagged deferred destruction
//!
//! Resources replaced while the GPU may still read them are retired with
//! the timeline value that must complete before they can be reused.

use std::collections::VecDeque;

/// FIFO of resources waiting for an epoch to complete
#[derive(Debug)]
pub struct DeletionQueue<T> {
    pending: VecDeque<(u64, T)>,
}

impl<T> DeletionQueue<T> {
    pub fn new() -> Self {
        Self { pending: VecDeque::new() }
    }

    /// Retire `item` until `epoch` has completed. Epochs are retired in
    /// non-decreasing order.
    pub fn retire(&mut self, item: T, epoch: u64) {
        debug_assert!(
            self.pending.back().is_none_or(|(last, _)| *last <= epoch),
            "deletion epochs must not decrease"
        );
        self.pending.push_back((epoch, item));
    }

    /// Remove and return every item whose epoch is `<= completed`
    pub fn collect(&mut self, completed: u64) -> Vec<T> {
        let mut ready = Vec::new();
        while self.pending.front().is_some_and(|(epoch, _)| *epoch <= completed) {
            if let Some((_, item)) = self.pending.pop_front() {
                ready.push(item);
            }
        }
        ready
    }

    /// Drain everything regardless of epoch (teardown after the device is idle)
    pub fn flush(&mut self) -> Vec<T> {
        self.pending.drain(..).map(|(_, item)| item).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for DeletionQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
