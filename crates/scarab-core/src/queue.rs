//! Time-ordered event queue with FIFO ordering inside a tick.
//!
//! A min-heap keyed by `(sim_time, enqueue sequence)`. The sequence is a
//! 64-bit counter assigned under the queue's own lock, so two events
//! enqueued in order for the same simulation time are always returned in
//! that order. The queue is internally synchronized; it is the only
//! kernel object that may be shared across the dispatch/network boundary.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, PoisonError};

use scarab_events::{Event, SimTime};

/// Errors raised by the event queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The 64-bit enqueue sequence counter was exhausted. Treated as a
    /// fatal invariant violation; 2^64 events per run is unreachable in
    /// any sane simulation.
    #[error("event queue sequence counter overflow")]
    SequenceOverflow,
}

/// A queued event together with its heap key.
#[derive(Debug)]
struct QueuedEvent {
    time: SimTime,
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so that BinaryHeap pops the earliest (time, seq) first.
        (other.time, other.seq).cmp(&(self.time, self.seq))
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    heap: BinaryHeap<QueuedEvent>,
    next_seq: u64,
}

/// Time-ordered, FIFO-within-same-time event queue.
#[derive(Debug, Default)]
pub struct EventQueue {
    inner: Mutex<QueueInner>,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an event at its declared `sim_time`. O(log n).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::SequenceOverflow`] if the enqueue sequence
    /// counter is exhausted.
    pub fn push(&self, event: Event) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq = seq.checked_add(1).ok_or(QueueError::SequenceOverflow)?;
        inner.heap.push(QueuedEvent {
            time: event.sim_time,
            seq,
            event,
        });
        Ok(())
    }

    /// Remove and return every event with `sim_time <= now`, ordered by
    /// time and then by enqueue order within a time.
    pub fn drain_due(&self, now: SimTime) -> Vec<Event> {
        let mut inner = self.lock();
        let mut due = Vec::new();
        while inner.heap.peek().is_some_and(|q| q.time <= now) {
            if let Some(queued) = inner.heap.pop() {
                due.push(queued.event);
            }
        }
        due
    }

    /// Simulation time of the earliest queued event, if any. Used for
    /// idle pacing checks.
    pub fn peek_next_time(&self) -> Option<SimTime> {
        self.lock().heap.peek().map(|q| q.time)
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        // A poisoned lock means a panic elsewhere while the guard was
        // held; the queue state itself is still structurally valid.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
