//! Per-hop packet transmission.
//!
//! A packet crossing a link arrives `size * 8 / rate` (serialization)
//! plus the link's propagation delay after it was handed to the link.
//! Intermediate nodes forward immediately (store-and-forward, zero
//! processing time).
//!
//! There is no queue in front of a link: packets from different flows
//! that share a link do not wait for each other, and nothing is ever
//! dropped. Offered load above a link's rate is therefore carried in
//! full. A loss or queueing model would have to replace `transmit`, not
//! sit beside it.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{SimError, SimResult};
use crate::event::EventKind;
use crate::flow::FlowKey;
use crate::simulation::SimulationContext;
use crate::time::VirtualTime;
use crate::topology::{Link, NodeId, Topology};

/// A packet in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub flow: FlowKey,
    /// Size in bytes, headers included.
    pub size: u32,
    /// When the source handed the packet to its first link.
    pub sent_at: VirtualTime,
    pub source: NodeId,
    pub destination: NodeId,
}

/// One packet reaching its destination, as handed to trace sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub flow: FlowKey,
    pub size: u32,
    pub sent_at: VirtualTime,
    pub arrived_at: VirtualTime,
}

/// When a packet of `size` bytes handed to `link` at `at` reaches the
/// far end. `None` on clock overflow.
pub fn arrival_time(link: &Link, size: u32, at: VirtualTime) -> Option<VirtualTime> {
    at.checked_add(link.rate.tx_time(size))?.checked_add(link.delay)
}

/// Counters for the delivery layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    /// Packets handed to a first-hop link by their source.
    pub packets_sent: u64,
    /// Intermediate-node forwards.
    pub hops_forwarded: u64,
    /// Packets that reached their destination.
    pub packets_delivered: u64,
}

/// Moves packets across the topology by scheduling arrival events.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    stats: DeliveryStats,
}

impl Delivery {
    pub fn new() -> Self {
        Delivery::default()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    /// Inject a packet at its source at the current time.
    ///
    /// Returns the time it reaches the first hop.
    pub fn send(
        &mut self,
        ctx: &mut SimulationContext,
        topology: &Topology,
        packet: Packet,
    ) -> SimResult<VirtualTime> {
        self.stats.packets_sent += 1;
        let from = packet.source;
        self.transmit(ctx, topology, packet, from)
    }

    /// Handle a packet that just arrived at `node`.
    ///
    /// Returns the delivery record when `node` is the destination;
    /// otherwise forwards the packet and returns `None`.
    pub fn on_arrival(
        &mut self,
        ctx: &mut SimulationContext,
        topology: &Topology,
        packet: &Packet,
        node: NodeId,
    ) -> SimResult<Option<DeliveryRecord>> {
        if node == packet.destination {
            self.stats.packets_delivered += 1;
            return Ok(Some(DeliveryRecord {
                flow: packet.flow,
                size: packet.size,
                sent_at: packet.sent_at,
                arrived_at: ctx.now(),
            }));
        }

        self.stats.hops_forwarded += 1;
        self.transmit(ctx, topology, packet.clone(), node)?;
        Ok(None)
    }

    fn transmit(
        &mut self,
        ctx: &mut SimulationContext,
        topology: &Topology,
        packet: Packet,
        from: NodeId,
    ) -> SimResult<VirtualTime> {
        let (link, next) = topology.next_hop(from, packet.destination).ok_or_else(|| {
            SimError::Invariant(format!(
                "no route from {} to {} for {}",
                from, packet.destination, packet.flow
            ))
        })?;
        if link.other_end(from) != Some(next) {
            return Err(SimError::Invariant(format!(
                "route from {} uses {}, which does not end at {}",
                from, link.id, next
            )));
        }

        let now = ctx.now();
        let arrive = arrival_time(link, packet.size, now)
            .ok_or_else(|| SimError::Invariant(format!("virtual time overflow on {}", link.id)))?;

        trace!(flow = %packet.flow, %from, to = %next, sent = %now, arrive = %arrive, "transmit");

        let link_id = link.id;
        ctx.schedule_at(
            arrive,
            EventKind::PacketArrival {
                packet,
                node: next,
                link: link_id,
            },
        )?;
        Ok(arrive)
    }
}
