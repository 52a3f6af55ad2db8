use crate::record::CanonicalRecord;
use serde::Serialize;
use std::collections::VecDeque;

/// Bounded FIFO of records waiting for one consumer.
///
/// Producers never block: on overflow the oldest records are evicted so the
/// newest always fit.
pub struct DeliveryQueue {
    capacity: usize,
    records: VecDeque<CanonicalRecord>,
    bytes: usize,
    dropped_total: u64,
}

impl DeliveryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: VecDeque::new(),
            bytes: 0,
            dropped_total: 0,
        }
    }

    /// Appends records in order, evicting from the front as needed.
    /// Returns the number of records dropped.
    pub fn push_many(&mut self, records: Vec<CanonicalRecord>) -> usize {
        for record in records {
            self.bytes += record.estimated_bytes();
            self.records.push_back(record);
        }
        self.evict_overflow()
    }

    /// Puts a batch back at the front, ahead of anything queued since.
    /// Returns the number of records dropped to respect capacity; those are
    /// still taken from the front, so the oldest lose out.
    pub fn prepend(&mut self, records: Vec<CanonicalRecord>) -> usize {
        for record in records.into_iter().rev() {
            self.bytes += record.estimated_bytes();
            self.records.push_front(record);
        }
        self.evict_overflow()
    }

    /// Takes up to `max` records from the front.
    pub fn drain(&mut self, max: usize) -> Vec<CanonicalRecord> {
        let count = max.min(self.records.len());
        let batch: Vec<CanonicalRecord> = self.records.drain(..count).collect();
        let removed: usize = batch.iter().map(CanonicalRecord::estimated_bytes).sum();
        self.bytes = self.bytes.saturating_sub(removed);
        batch
    }

    /// Changes the maximum length, evicting overflow immediately.
    pub fn set_capacity(&mut self, capacity: usize) -> usize {
        self.capacity = capacity.max(1);
        self.evict_overflow()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.records.len(),
            capacity: self.capacity,
            bytes: self.bytes,
            dropped_total: self.dropped_total,
        }
    }

    fn evict_overflow(&mut self) -> usize {
        let mut dropped = 0;
        while self.records.len() > self.capacity {
            if let Some(record) = self.records.pop_front() {
                self.bytes = self.bytes.saturating_sub(record.estimated_bytes());
                dropped += 1;
            }
        }

        if dropped > 0 {
            self.dropped_total += dropped as u64;
            tracing::warn!(
                dropped = dropped,
                capacity = self.capacity,
                "Dropping oldest records due to queue full"
            );
        }
        dropped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub len: usize,
    pub capacity: usize,
    pub bytes: usize,
    pub dropped_total: u64,
}
