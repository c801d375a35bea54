//! # floodsim: discrete-event flood simulator and flow detector
//!
//! Replays a volumetric UDP flood against a victim over a small
//! point-to-point network, records per-flow statistics at the victim and
//! flags flows whose measured throughput exceeds a threshold. Everything
//! runs on a virtual clock: no threads, no wall-clock time, identical
//! output for identical input.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        Orchestrator           │ ← config → run → report
//! │  ┌─────────────────────────┐ │
//! │  │       Simulation         │ │ ← execution loop
//! │  │  ┌───────────────────┐  │ │
//! │  │  │     Scheduler     │  │ │ ← deterministic min-heap
//! │  │  └───────────────────┘  │ │
//! │  └─────────────────────────┘ │
//! │  Generators → Delivery ──────│─→ FlowRecorder → Detector
//! │               (Topology)     │
//! └──────────────────────────────┘
//! ```

pub mod config;
pub mod delivery;
pub mod detector;
pub mod dsl;
pub mod error;
pub mod event;
pub mod eventlog;
pub mod flow;
pub mod generator;
pub mod orchestrator;
pub mod rate;
pub mod report;
pub mod scheduler;
pub mod simulation;
pub mod sink;
pub mod time;
pub mod topology;

// Re-exports for convenience.
pub use config::{GeneratorConfig, RunParameters, ScenarioConfig, TopologyConfig};
pub use delivery::{Delivery, DeliveryRecord, DeliveryStats, Packet};
pub use detector::{Detector, FlowThroughput, SuspiciousFlow};
pub use error::{SimError, SimResult, SinkError, TopologyError};
pub use event::{Event, EventId, EventIdGen, EventKind};
pub use eventlog::EventLog;
pub use flow::{FlowKey, FlowRecord, FlowRecorder, FlowSnapshot, Protocol};
pub use generator::{GeneratorId, GeneratorSpec, TrafficGenerator, TrafficKind};
pub use orchestrator::{verify_replay, Orchestrator};
pub use rate::DataRate;
pub use report::{Report, RunSummary};
pub use scheduler::Scheduler;
pub use simulation::{EventHandler, Simulation, SimulationContext};
pub use sink::{
    JsonLinesTraceSink, JsonReportSink, MemoryReportSink, MemoryTraceSink, ReportSink,
    TextReportSink, TraceSink,
};
pub use time::VirtualTime;
pub use topology::{Link, LinkId, Node, NodeId, NodeRole, Topology};
