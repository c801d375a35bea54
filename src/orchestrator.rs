//! Wires a scenario into a runnable simulation.
//!
//! The orchestrator owns the `Simulation` and a `World` holding
//! everything events act on: topology, generators, the delivery layer,
//! the flow recorder and the optional trace sink. A run starts every
//! generator, executes events up to the horizon, drops whatever is still
//! pending, then hands the flow table to the detector and publishes the
//! report.

use tracing::{debug, info, warn};

use crate::config::ScenarioConfig;
use crate::delivery::Delivery;
use crate::detector::Detector;
use crate::error::{SimError, SimResult};
use crate::event::{Event, EventKind};
use crate::eventlog::EventLog;
use crate::flow::{FlowRecorder, FlowSnapshot};
use crate::generator::{GeneratorId, TrafficGenerator};
use crate::report::{Report, RunSummary};
use crate::simulation::{EventHandler, Simulation, SimulationContext};
use crate::sink::{ReportSink, TraceSink};
use crate::time::VirtualTime;
use crate::topology::Topology;

/// State mutated by event dispatch.
struct World {
    topology: Topology,
    generators: Vec<TrafficGenerator>,
    delivery: Delivery,
    flows: FlowRecorder,
    trace: Option<Box<dyn TraceSink>>,
    trace_failures: u64,
}

impl World {
    fn record_trace(&mut self, record: &crate::delivery::DeliveryRecord) {
        let Some(sink) = self.trace.as_mut() else {
            return;
        };
        if let Err(e) = sink.record(record) {
            if self.trace_failures == 0 {
                warn!(error = %e, flow = %record.flow, "trace sink rejected record, continuing");
            }
            self.trace_failures += 1;
        }
    }
}

impl EventHandler for World {
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) -> SimResult<()> {
        match &event.kind {
            EventKind::GeneratorTick { generator } => {
                let g = self
                    .generators
                    .get_mut(generator.raw() as usize)
                    .ok_or_else(|| SimError::Invariant(format!("tick for unknown generator {}", generator)))?;
                g.on_tick(ctx, &self.topology, &mut self.delivery)
            }
            EventKind::PacketArrival { packet, node, .. } => {
                let delivered = self.delivery.on_arrival(ctx, &self.topology, packet, *node)?;
                if let Some(record) = delivered {
                    self.flows
                        .record_arrival(record.flow, record.size, record.arrived_at)?;
                    self.record_trace(&record);
                }
                Ok(())
            }
        }
    }
}

/// A configured scenario, ready to run once.
pub struct Orchestrator {
    sim: Simulation,
    world: World,
    horizon: VirtualTime,
    detector: Detector,
    report_sinks: Vec<Box<dyn ReportSink>>,
    finished: bool,
}

impl Orchestrator {
    /// Validate `config`, build the topology and generators.
    ///
    /// Every configuration problem surfaces here, before any event is
    /// scheduled.
    pub fn new(config: &ScenarioConfig) -> SimResult<Self> {
        config.validate()?;
        let horizon = config.run.horizon()?;
        let topology = config.build_topology()?;

        let mut generators: Vec<TrafficGenerator> = Vec::new();
        for (idx, spec) in config.generator_specs(&topology)?.into_iter().enumerate() {
            let g = TrafficGenerator::new(GeneratorId::new(idx as u32), spec, &topology)?;
            if let Some(other) = generators.iter().find(|o| o.flow() == g.flow()) {
                return Err(SimError::config(format!(
                    "generators '{}' and '{}' share flow {}",
                    other.name(),
                    g.name(),
                    g.flow()
                )));
            }
            generators.push(g);
        }

        Ok(Orchestrator {
            sim: Simulation::new(),
            world: World {
                topology,
                generators,
                delivery: Delivery::new(),
                flows: FlowRecorder::new(),
                trace: None,
                trace_failures: 0,
            },
            horizon,
            detector: Detector::new(config.run.threshold_mbps),
            report_sinks: Vec::new(),
            finished: false,
        })
    }

    /// Receive a record for every delivered packet.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.world.trace = Some(sink);
    }

    /// Receive the final report. Sinks publish in insertion order.
    pub fn add_report_sink(&mut self, sink: Box<dyn ReportSink>) {
        self.report_sinks.push(sink);
    }

    /// Record every dispatched event for replay comparison.
    pub fn enable_event_log(&mut self) {
        self.sim.enable_logging();
    }

    pub fn topology(&self) -> &Topology {
        &self.world.topology
    }

    pub fn generators(&self) -> &[TrafficGenerator] {
        &self.world.generators
    }

    pub fn horizon(&self) -> VirtualTime {
        self.horizon
    }

    pub fn event_log(&self) -> Option<&EventLog> {
        self.sim.event_log()
    }

    /// Current flow table.
    pub fn flow_snapshot(&self) -> FlowSnapshot {
        self.world.flows.snapshot()
    }

    /// Trace records the sink refused.
    pub fn trace_failures(&self) -> u64 {
        self.world.trace_failures
    }

    /// Take back the trace sink, e.g. to inspect a memory sink.
    pub fn take_trace_sink(&mut self) -> Option<Box<dyn TraceSink>> {
        self.world.trace.take()
    }

    /// Execute the scenario and publish the report.
    ///
    /// A scenario runs once; a second call is an invariant error.
    pub fn run(&mut self) -> SimResult<Report> {
        if self.finished {
            return Err(SimError::Invariant("scenario already ran".into()));
        }
        self.finished = true;

        info!(
            generators = self.world.generators.len(),
            nodes = self.world.topology.node_count(),
            horizon = %self.horizon,
            "starting run"
        );
        for node in self.world.topology.nodes() {
            info!(node = %node.name, role = %node.role, address = %node.address, "topology node");
        }

        {
            let mut ctx = self.sim.context();
            for g in &mut self.world.generators {
                g.start(&mut ctx)?;
            }
        }

        self.sim.run(self.horizon, &mut self.world)?;
        let discarded = self.sim.discard_pending();
        debug!(discarded, horizon = %self.horizon, "dropped events past the horizon");

        if let Some(sink) = self.world.trace.as_mut() {
            if let Err(e) = sink.flush() {
                warn!(error = %e, "trace sink flush failed");
            }
        }
        if self.world.trace_failures > 0 {
            warn!(failures = self.world.trace_failures, "trace sink dropped records");
        }

        let report = self.build_report(discarded as u64);
        for s in &report.suspicious {
            info!(flow = %s.flow, throughput_mbps = s.throughput_mbps, "suspicious flow");
        }

        for sink in &mut self.report_sinks {
            if let Err(e) = sink.publish(&report) {
                warn!(error = %e, "report sink failed, continuing");
            }
        }

        info!(
            events = report.summary.events_processed,
            flows = report.flows.len(),
            suspicious = report.suspicious.len(),
            end = %report.summary.end_time,
            "run finished"
        );
        Ok(report)
    }

    fn build_report(&self, events_discarded: u64) -> Report {
        let flows = self.world.flows.snapshot();
        Report {
            threshold_mbps: self.detector.threshold_mbps(),
            suspicious: self.detector.evaluate(&flows),
            throughputs: self.detector.throughputs(&flows),
            summary: RunSummary {
                sim_time: self.horizon,
                end_time: self.sim.current_time(),
                events_processed: self.sim.events_processed(),
                events_discarded,
                generators: self.world.generators.len(),
                delivery: self.world.delivery.stats(),
                log_hash: self.sim.event_log().map(EventLog::log_hash),
            },
            flows,
        }
    }
}

/// Run `config` twice with event logging and compare dispatch logs.
///
/// Returns the common log hash, or an invariant error when the runs
/// diverge.
pub fn verify_replay(config: &ScenarioConfig) -> SimResult<u64> {
    let run_once = || -> SimResult<(u64, Report)> {
        let mut o = Orchestrator::new(config)?;
        o.enable_event_log();
        let report = o.run()?;
        let hash = o
            .event_log()
            .map(EventLog::log_hash)
            .ok_or_else(|| SimError::Invariant("event log missing after run".into()))?;
        Ok((hash, report))
    };

    let (first_hash, first) = run_once()?;
    let (second_hash, second) = run_once()?;
    if first_hash != second_hash || first != second {
        return Err(SimError::Invariant(format!(
            "replay diverged: {:016x} vs {:016x}",
            first_hash, second_hash
        )));
    }
    info!(hash = %format!("{:016x}", first_hash), "replay verified");
    Ok(first_hash)
}
