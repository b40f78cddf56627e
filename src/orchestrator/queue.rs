//! Bounded priority queue ordering inbound signals `P3 > P2 > P1`, FIFO by
//! arrival within a phase, ties broken lexicographically by `signal_id`.
//!
//! Built on a `BinaryHeap` rather than a plain `VecDeque` so overflow
//! always drops the *lowest*-priority entry instead of the oldest.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

use crate::domain::IntentSignal;

#[derive(Debug, Clone)]
struct QueueEntry {
    signal: IntentSignal,
    arrival_ts: DateTime<Utc>,
}

impl QueueEntry {
    fn priority_key(&self) -> (u8, std::cmp::Reverse<DateTime<Utc>>, std::cmp::Reverse<String>) {
        (
            self.signal.phase_id.rank(),
            std::cmp::Reverse(self.arrival_ts),
            std::cmp::Reverse(self.signal.signal_id.clone()),
        )
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority_key() == other.priority_key()
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority_key().cmp(&other.priority_key())
    }
}

/// A bounded max-heap: `pop()` always returns the highest-priority signal
/// (highest phase rank, earliest arrival, lowest signal_id).
pub struct PriorityQueue {
    heap: BinaryHeap<QueueEntry>,
    max_size: usize,
    pub drop_count: u64,
}

impl PriorityQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            max_size,
            drop_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Pushes a signal. If at capacity, drops whichever of the new entry or
    /// the current lowest-priority entry ranks lower, incrementing `drop_count`.
    pub fn push(&mut self, signal: IntentSignal, arrival_ts: DateTime<Utc>) {
        let entry = QueueEntry { signal, arrival_ts };

        if self.heap.len() < self.max_size {
            self.heap.push(entry);
            return;
        }

        let min_key = self.heap.iter().map(|e| e.priority_key()).min();
        match min_key {
            Some(min_key) if entry.priority_key() > min_key => {
                self.remove_one_matching(&min_key);
                self.heap.push(entry);
                self.drop_count += 1;
            }
            _ => {
                self.drop_count += 1;
            }
        }
    }

    fn remove_one_matching(&mut self, key: &(u8, std::cmp::Reverse<DateTime<Utc>>, std::cmp::Reverse<String>)) {
        let items: Vec<QueueEntry> = std::mem::take(&mut self.heap).into_vec();
        let mut removed = false;
        for item in items {
            if !removed && &item.priority_key() == key {
                removed = true;
                continue;
            }
            self.heap.push(item);
        }
    }

    pub fn pop(&mut self) -> Option<IntentSignal> {
        self.heap.pop().map(|e| e.signal)
    }
}
