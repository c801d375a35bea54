/// Deterministic event scheduler.
///
/// Uses a `BinaryHeap` with reversed `Ord` on `Event` to act as a
/// min-heap keyed by `(fire_at, event_id)`. Event IDs are strictly
/// increasing, so equal timestamps always pop in insertion order.

use std::collections::BinaryHeap;

use crate::event::{Event, EventId, EventIdGen, EventKind};
use crate::time::VirtualTime;

/// Owns the pending-event heap and the ID generator.
///
/// The scheduler does not know the current time; causality is checked
/// one level up, by `Simulation`.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Event>,
    id_gen: EventIdGen,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            id_gen: EventIdGen::new(),
        }
    }

    /// Insert an event and return its assigned ID.
    pub fn schedule(&mut self, at: VirtualTime, kind: EventKind) -> EventId {
        let id = self.id_gen.next_id();
        self.queue.push(Event::new(id, at, kind));
        id
    }

    /// Remove the earliest event; ties go to the lowest id.
    pub fn pop_next(&mut self) -> Option<Event> {
        self.queue.pop()
    }

    /// The event `pop_next` would return.
    pub fn peek_next(&self) -> Option<&Event> {
        self.queue.peek()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Id the next `schedule` call will assign.
    pub fn next_event_id(&self) -> EventId {
        self.id_gen.peek()
    }

    /// Drop every pending event. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.queue.len();
        self.queue.clear();
        n
    }

    /// Drain all events in dispatch order.
    pub fn drain_ordered(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.queue.len());
        while let Some(e) = self.queue.pop() {
            events.push(e);
        }
        events
    }
}
