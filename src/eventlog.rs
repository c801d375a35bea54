/// Dispatch log and replay verification.
///
/// Records every dispatched event into an append-only log, reduces it to
/// a single deterministic hash, and exports it as text. Two runs of the
/// same scenario must produce byte-identical exports and equal hashes.

use std::io::{self, Write};

use crate::event::{Event, EventKind};
use crate::flow::FlowKey;

// ── Hash utility ──────────────────────────────────────────────────────

/// Combine two u64 hashes deterministically.
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

/// Hash a byte slice deterministically (FNV-1a).
pub fn hash_bytes(data: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn flow_hash(flow: &FlowKey) -> u64 {
    let mut h = hash_bytes(&flow.src.octets());
    h = hash_combine(h, hash_bytes(&flow.dst.octets()));
    h = hash_combine(h, flow.src_port as u64);
    h = hash_combine(h, flow.dst_port as u64);
    hash_combine(h, flow.protocol.number() as u64)
}

fn event_kind_hash(kind: &EventKind) -> u64 {
    match kind {
        EventKind::GeneratorTick { generator } => hash_combine(1, generator.raw() as u64),
        EventKind::PacketArrival { packet, node, link } => {
            let mut h = hash_combine(2, flow_hash(&packet.flow));
            h = hash_combine(h, packet.size as u64);
            h = hash_combine(h, packet.sent_at.as_nanos());
            h = hash_combine(h, node.raw() as u64);
            hash_combine(h, link.raw() as u64)
        }
    }
}

// ── Event Log ─────────────────────────────────────────────────────────

/// Append-only log of dispatched events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog { events: Vec::new() }
    }

    /// Record a dispatched event.
    pub fn record(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Deterministic hash of the entire log.
    pub fn log_hash(&self) -> u64 {
        let mut h: u64 = 0;
        for event in &self.events {
            h = hash_combine(h, event.id.raw());
            h = hash_combine(h, event.fire_at.as_nanos());
            h = hash_combine(h, event_kind_hash(&event.kind));
        }
        h
    }

    /// Export the log in a line-oriented text format.
    pub fn export<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "# FLOODSIM EVENT LOG v1")?;
        writeln!(w, "# events: {}", self.events.len())?;
        writeln!(w, "# hash: {:016x}", self.log_hash())?;

        for event in &self.events {
            write!(w, "E {} {} ", event.id.raw(), event.fire_at.as_nanos())?;
            match &event.kind {
                EventKind::GeneratorTick { generator } => {
                    writeln!(w, "Tick {}", generator.raw())?;
                }
                EventKind::PacketArrival { packet, node, link } => {
                    let f = &packet.flow;
                    writeln!(
                        w,
                        "Arrive {} {} {}:{} {}:{} {} {} {}",
                        node.raw(),
                        link.raw(),
                        f.src,
                        f.src_port,
                        f.dst,
                        f.dst_port,
                        f.protocol,
                        packet.size,
                        packet.sent_at.as_nanos()
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Compare two logs for identical event ordering and payloads.
pub fn logs_match(a: &EventLog, b: &EventLog) -> bool {
    a.events.len() == b.events.len()
        && a.events.iter().zip(b.events.iter()).all(|(ea, eb)| {
            ea.id == eb.id && ea.fire_at == eb.fire_at && ea.kind == eb.kind
        })
}
