//! Per-partition event queue ordered by scheduled time.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::events::Event;
use crate::clock::Timestamp;

/// Wrapper for priority queue ordering (earliest first)
struct Scheduled {
    at: Timestamp,
    seq: u64,
    event: Box<dyn Event>,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest first)
        match other.at.cmp(&self.at) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

/// Binary min-heap of events keyed by timestamp.
///
/// The insertion sequence only keeps `Ord` total; callers must not rely on
/// any order among events sharing a timestamp.
pub struct EventQueue {
    heap: BinaryHeap<Scheduled>,
    seq_counter: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq_counter: 0,
        }
    }

    pub fn push(&mut self, event: Box<dyn Event>) {
        let at = event.time();
        self.seq_counter += 1;
        self.heap.push(Scheduled {
            at,
            seq: self.seq_counter,
            event,
        });
    }

    /// Remove the earliest event, `None` when empty.
    pub fn pop(&mut self) -> Option<Box<dyn Event>> {
        self.heap.pop().map(|s| s.event)
    }

    pub fn peek(&self) -> Option<&dyn Event> {
        self.heap.peek().map(|s| s.event.as_ref())
    }

    pub fn peek_time(&self) -> Option<Timestamp> {
        self.heap.peek().map(|s| s.at)
    }

    /// Pop the head only if it is due at or before `limit`.
    pub fn pop_due(&mut self, limit: Timestamp) -> Option<Box<dyn Event>> {
        match self.peek_time() {
            Some(at) if at <= limit => self.pop(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
