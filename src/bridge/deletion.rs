//! Processed-index tracking and paced deletion.
//!
//! Every storage index that has been published (or found redundant) is queued
//! for `AT+CMGD` and remembered so a re-listing before the delete lands does
//! not publish it twice. Deletes leave one at a time, at most one per
//! interval, so two mutating commands never overlap on the serial line.
use std::collections::VecDeque;

use log::{debug, warn};
use tokio::time::{Duration, Instant};

use super::assembly::StorageIndex;

pub const DEFAULT_PROCESSED_CAPACITY: usize = 32;
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;
pub const DEFAULT_DELETE_INTERVAL: Duration = Duration::from_millis(500);

pub struct DeletionCoordinator {
    processed: VecDeque<StorageIndex>,
    processed_capacity: usize,
    queue: VecDeque<StorageIndex>,
    queue_capacity: usize,
    interval: Duration,
    last_delete: Option<Instant>,
}

impl Default for DeletionCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESSED_CAPACITY, DEFAULT_QUEUE_CAPACITY, DEFAULT_DELETE_INTERVAL)
    }
}

impl DeletionCoordinator {
    pub fn new(processed_capacity: usize, queue_capacity: usize, interval: Duration) -> Self {
        Self {
            processed: VecDeque::with_capacity(processed_capacity),
            processed_capacity: processed_capacity.max(1),
            queue: VecDeque::with_capacity(queue_capacity),
            queue_capacity: queue_capacity.max(1),
            interval,
            last_delete: None,
        }
    }

    /// True when this index was already handled and its delete may still be in flight.
    pub fn should_skip(&self, index: StorageIndex) -> bool {
        self.processed.contains(&index)
    }

    /// Queue `index` for deletion and mark it processed.
    ///
    /// Returns `false` only when the queue is full; the index is still marked
    /// processed so it is not republished before the next notice frees it.
    pub fn enqueue_delete(&mut self, index: StorageIndex) -> bool {
        self.mark_processed(index);
        if self.queue.contains(&index) {
            return true;
        }
        if self.queue.len() >= self.queue_capacity {
            warn!("Deletion queue full ({}), not queuing index {}", self.queue_capacity, index);
            return false;
        }
        debug!("Queued delete of index {}", index);
        self.queue.push_back(index);
        true
    }

    /// Pop the next index to delete if the pacing interval has passed.
    pub fn drain_one(&mut self, now: Instant) -> Option<StorageIndex> {
        if !self.interval_elapsed(now) {
            return None;
        }
        let index = self.queue.pop_front()?;
        self.last_delete = Some(now);
        Some(index)
    }

    /// Drop `index` from the processed set; the modem has reused that slot.
    pub fn forget(&mut self, index: StorageIndex) {
        self.processed.retain(|i| *i != index);
    }

    pub fn has_pending(&self) -> bool { !self.queue.is_empty() }

    pub fn pending(&self) -> impl Iterator<Item = StorageIndex> + '_ {
        self.queue.iter().copied()
    }

    /// Queue empty and the last delete had a full interval to complete.
    pub fn settled(&self, now: Instant) -> bool {
        self.queue.is_empty() && self.interval_elapsed(now)
    }

    fn interval_elapsed(&self, now: Instant) -> bool {
        self.last_delete
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    fn mark_processed(&mut self, index: StorageIndex) {
        if self.processed.contains(&index) {
            return;
        }
        if self.processed.len() >= self.processed_capacity {
            self.processed.pop_front();
        }
        self.processed.push_back(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_ring_evicts_oldest() {
        let mut d = DeletionCoordinator::new(2, 8, Duration::ZERO);
        d.enqueue_delete(StorageIndex(1));
        d.enqueue_delete(StorageIndex(2));
        d.enqueue_delete(StorageIndex(3));
        assert!(!d.should_skip(StorageIndex(1)));
        assert!(d.should_skip(StorageIndex(2)));
        assert!(d.should_skip(StorageIndex(3)));
    }

    #[test]
    fn forget_clears_processed_mark() {
        let mut d = DeletionCoordinator::default();
        d.enqueue_delete(StorageIndex(5));
        d.forget(StorageIndex(5));
        assert!(!d.should_skip(StorageIndex(5)));
        assert!(d.has_pending());
    }
}
