/// Event system for the flood simulation.
///
/// Every effect is modeled as an `Event`: an immutable record placed on
/// the scheduler's priority queue and dispatched in deterministic order.
/// Actions are tagged variants carrying plain data rather than closures,
/// so a queue can be cloned, logged and compared between runs.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::delivery::Packet;
use crate::generator::GeneratorId;
use crate::time::VirtualTime;
use crate::topology::{LinkId, NodeId};

// ── Event ID ──────────────────────────────────────────────────────────

/// A strictly-increasing event sequence number.
///
/// Two events scheduled at the same `VirtualTime` are ordered by their
/// `EventId`, which corresponds to insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

// ── Event ID Generator ───────────────────────────────────────────────

/// Deterministic, strictly-increasing event-ID generator.
///
/// Each scheduler owns exactly one of these.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    /// Hand out the next id.
    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// The id `next_id` will return next.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Event Kind ────────────────────────────────────────────────────────

/// What happens when an event fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A traffic generator wakes up to (maybe) send its next packet.
    GeneratorTick { generator: GeneratorId },

    /// A packet has finished crossing `link` and is now at `node`.
    PacketArrival {
        packet: Packet,
        node: NodeId,
        link: LinkId,
    },
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::GeneratorTick { generator } => write!(f, "Tick({})", generator),
            EventKind::PacketArrival { packet, node, link } => {
                write!(f, "Arrive({} at {} via {}, {}B)", packet.flow, node, link, packet.size)
            }
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────

/// A single simulation event, ordered by `(fire_at, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number (insertion order).
    pub id: EventId,

    /// The virtual time at which this event fires.
    pub fire_at: VirtualTime,

    /// The action to perform.
    pub kind: EventKind,
}

impl Event {
    pub fn new(id: EventId, fire_at: VirtualTime, kind: EventKind) -> Self {
        Event { id, fire_at, kind }
    }
}

/// Ordering: smallest `(fire_at, id)` first.
///
/// `BinaryHeap` is a max-heap, so the natural ordering is reversed here.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(id: u64, at_ms: u64, generator: u32) -> Event {
        Event::new(
            EventId::new(id),
            VirtualTime::from_millis(at_ms),
            EventKind::GeneratorTick {
                generator: GeneratorId::new(generator),
            },
        )
    }

    #[test]
    fn test_ids_increase_from_zero() {
        let mut gen = EventIdGen::new();
        let a = gen.next_id();
        let b = gen.next_id();
        assert_eq!(a.raw(), 0);
        assert_eq!(b.raw(), 1);
        assert_eq!(gen.peek().raw(), 2);
        assert!(a < b);
    }

    #[test]
    fn test_earlier_arrival_outranks_lower_id() {
        let e1 = tick(5, 10, 0);
        let e2 = tick(0, 20, 0);
        // e1 fires first (earlier time) even with a larger id.
        assert!(e1 > e2);
    }

    #[test]
    fn test_same_time_breaks_tie_on_id() {
        let e1 = tick(0, 10, 1);
        let e2 = tick(1, 10, 0);
        assert!(e1 > e2);
    }

    #[test]
    fn test_tick_display() {
        let e = tick(42, 100, 3);
        assert_eq!(e.id.to_string(), "E#42");
        assert_eq!(e.kind.to_string(), "Tick(G3)");
    }
}
