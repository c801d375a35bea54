/// Constant-rate traffic sources.
///
/// A generator emits fixed-size packets at `size * 8 / rate` intervals
/// while its window `[start, stop)` is open. It drives itself through
/// `GeneratorTick` events: every tick sends one packet and schedules the
/// next tick, and the first tick at or after `stop` ends the chain.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::delivery::{Delivery, Packet};
use crate::error::{SimError, SimResult};
use crate::event::EventKind;
use crate::flow::FlowKey;
use crate::rate::DataRate;
use crate::simulation::SimulationContext;
use crate::time::VirtualTime;
use crate::topology::{NodeId, Topology};

/// Index of a generator within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeneratorId(u32);

impl GeneratorId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        GeneratorId(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for GeneratorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "G{}", self.0)
    }
}

/// Whether a generator models the flood or legitimate traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficKind {
    Attack,
    Background,
}

impl std::fmt::Display for TrafficKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrafficKind::Attack => f.write_str("attack"),
            TrafficKind::Background => f.write_str("background"),
        }
    }
}

/// Everything needed to construct a generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSpec {
    pub name: String,
    pub kind: TrafficKind,
    pub source: NodeId,
    pub destination: NodeId,
    pub src_port: u16,
    pub dst_port: u16,
    pub packet_size: u32,
    pub rate: DataRate,
    pub start: VirtualTime,
    pub stop: VirtualTime,
}

/// A constant-rate UDP source.
#[derive(Debug, Clone)]
pub struct TrafficGenerator {
    id: GeneratorId,
    name: String,
    kind: TrafficKind,
    source: NodeId,
    destination: NodeId,
    flow: FlowKey,
    packet_size: u32,
    rate: DataRate,
    interval: VirtualTime,
    start: VirtualTime,
    stop: VirtualTime,
    packets_sent: u64,
    active: bool,
}

impl TrafficGenerator {
    /// Resolve addresses against `topology` and derive the send interval.
    ///
    /// Fails when either endpoint is unknown or unreachable, the packet
    /// size is zero, or the rate is so high the interval rounds to zero.
    pub fn new(id: GeneratorId, spec: GeneratorSpec, topology: &Topology) -> SimResult<Self> {
        if spec.packet_size == 0 {
            return Err(SimError::config(format!(
                "generator '{}': packet size must be positive",
                spec.name
            )));
        }
        let src = topology.address_of(spec.source).ok_or_else(|| {
            SimError::config(format!("generator '{}': unknown source {}", spec.name, spec.source))
        })?;
        let dst = topology.address_of(spec.destination).ok_or_else(|| {
            SimError::config(format!(
                "generator '{}': unknown destination {}",
                spec.name, spec.destination
            ))
        })?;
        if !topology.is_reachable(spec.source, spec.destination) {
            return Err(SimError::config(format!(
                "generator '{}': {} cannot reach {}",
                spec.name, src, dst
            )));
        }

        let interval = spec.rate.tx_time(spec.packet_size);
        if interval == VirtualTime::ZERO {
            return Err(SimError::config(format!(
                "generator '{}': {} at {} gives a zero send interval",
                spec.name, spec.packet_size, spec.rate
            )));
        }

        Ok(TrafficGenerator {
            id,
            name: spec.name,
            kind: spec.kind,
            source: spec.source,
            destination: spec.destination,
            flow: FlowKey::udp(src, spec.src_port, dst, spec.dst_port),
            packet_size: spec.packet_size,
            rate: spec.rate,
            interval,
            start: spec.start,
            stop: spec.stop,
            packets_sent: 0,
            active: false,
        })
    }

    pub fn id(&self) -> GeneratorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TrafficKind {
        self.kind
    }

    pub fn flow(&self) -> FlowKey {
        self.flow
    }

    /// Time between consecutive sends.
    pub fn interval(&self) -> VirtualTime {
        self.interval
    }

    pub fn window(&self) -> (VirtualTime, VirtualTime) {
        (self.start, self.stop)
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Schedule the first tick at the window start. An empty window
    /// leaves the generator inert.
    pub fn start(&mut self, ctx: &mut SimulationContext) -> SimResult<()> {
        if self.start >= self.stop {
            debug!(generator = %self.name, start = %self.start, stop = %self.stop, "empty window, not starting");
            return Ok(());
        }
        ctx.schedule_at(self.start, EventKind::GeneratorTick { generator: self.id })?;
        self.active = true;
        debug!(
            generator = %self.name,
            kind = %self.kind,
            flow = %self.flow,
            rate = %self.rate,
            start = %self.start,
            stop = %self.stop,
            "generator scheduled"
        );
        Ok(())
    }

    /// Handle one tick: send a packet and reschedule while the window is
    /// open, otherwise deactivate.
    pub fn on_tick(
        &mut self,
        ctx: &mut SimulationContext,
        topology: &Topology,
        delivery: &mut Delivery,
    ) -> SimResult<()> {
        let now = ctx.now();
        if now >= self.stop {
            self.active = false;
            debug!(generator = %self.name, sent = self.packets_sent, at = %now, "generator stopped");
            return Ok(());
        }

        let packet = Packet {
            flow: self.flow,
            size: self.packet_size,
            sent_at: now,
            source: self.source,
            destination: self.destination,
        };
        delivery.send(ctx, topology, packet)?;
        self.packets_sent += 1;

        ctx.schedule_after(self.interval, EventKind::GeneratorTick { generator: self.id })?;
        Ok(())
    }
}

/// Number of packets a generator sends over `[start, stop)` at
/// `interval`: `ceil((stop - start) / interval)`, zero for an empty
/// window.
pub fn expected_packets(start: VirtualTime, stop: VirtualTime, interval: VirtualTime) -> u64 {
    match stop.duration_since(start) {
        Some(span) if interval > VirtualTime::ZERO => span.as_nanos().div_ceil(interval.as_nanos()),
        _ => 0,
    }
}
