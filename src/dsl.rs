/// Fluent builder for scenarios.
///
/// Produces the same `ScenarioConfig` a TOML file would, so anything
/// built here can be printed, saved and replayed from disk.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::config::{GeneratorConfig, LinkConfig, NodeConfig, ScenarioConfig, TopologyConfig};
use crate::error::SimResult;
use crate::generator::TrafficKind;
use crate::orchestrator::Orchestrator;
use crate::rate::DataRate;
use crate::topology::NodeRole;

// ── ScenarioBuilder ───────────────────────────────────────────────────

/// Fluent builder for a `ScenarioConfig` and its `Orchestrator`.
///
/// # Example
/// ```rust
/// use std::net::Ipv4Addr;
/// use std::time::Duration;
/// use floodsim::dsl::ScenarioBuilder;
/// use floodsim::{DataRate, NodeRole};
///
/// let report = ScenarioBuilder::new()
///     .sim_time(4.0)
///     .attack_window(1.0, 3.0)
///     .node("flooder", NodeRole::Attacker, Ipv4Addr::new(10, 0, 1, 1))
///     .node("target", NodeRole::Victim, Ipv4Addr::new(10, 0, 4, 1))
///     .link("flooder", "target", DataRate::MBPS_10, Duration::from_millis(2))
///     .build()
///     .unwrap()
///     .run()
///     .unwrap();
/// assert_eq!(report.suspicious.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScenarioBuilder {
    config: ScenarioConfig,
    event_log: bool,
}

impl ScenarioBuilder {
    /// Start from the default experiment parameters with the built-in
    /// topology.
    pub fn new() -> Self {
        ScenarioBuilder::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ScenarioConfig) -> Self {
        ScenarioBuilder {
            config,
            event_log: false,
        }
    }

    // ── Run parameters ────────────────────────────────────────

    pub fn sim_time(mut self, secs: f64) -> Self {
        self.config.run.sim_time = secs;
        self
    }

    pub fn attack_window(mut self, start: f64, stop: f64) -> Self {
        self.config.run.attack_start = start;
        self.config.run.attack_stop = stop;
        self
    }

    pub fn background_window(mut self, start: f64, stop: f64) -> Self {
        self.config.run.background_start = start;
        self.config.run.background_stop = stop;
        self
    }

    pub fn attack_rate(mut self, rate: DataRate) -> Self {
        self.config.run.data_rate = rate;
        self
    }

    pub fn background_rate(mut self, rate: DataRate) -> Self {
        self.config.run.background_rate = rate;
        self
    }

    pub fn packet_size(mut self, bytes: u32) -> Self {
        self.config.run.packet_size = bytes;
        self
    }

    pub fn threshold_mbps(mut self, mbps: f64) -> Self {
        self.config.run.threshold_mbps = mbps;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.run.port = port;
        self
    }

    // ── Topology ──────────────────────────────────────────────

    /// Add a node. The first call replaces the built-in topology.
    pub fn node(mut self, name: &str, role: NodeRole, address: Ipv4Addr) -> Self {
        self.topology().nodes.push(NodeConfig {
            name: name.to_string(),
            role,
            address: address.to_string(),
        });
        self
    }

    /// Add a link between two named nodes.
    pub fn link(mut self, a: &str, b: &str, rate: DataRate, delay: Duration) -> Self {
        self.topology().links.push(LinkConfig {
            a: a.to_string(),
            b: b.to_string(),
            rate: rate.to_string(),
            delay: humantime::format_duration(delay).to_string(),
        });
        self
    }

    fn topology(&mut self) -> &mut TopologyConfig {
        self.config.topology.get_or_insert_with(TopologyConfig::default)
    }

    // ── Generators ────────────────────────────────────────────

    /// Add an explicit generator. The first call replaces the
    /// role-derived set.
    pub fn generator(mut self, generator: GeneratorConfig) -> Self {
        self.config.generators.get_or_insert_with(Vec::new).push(generator);
        self
    }

    /// Flood from `source` using the run's attack settings.
    pub fn attack(self, source: &str) -> Self {
        self.generator(GeneratorConfig::new(TrafficKind::Attack, source))
    }

    /// Legitimate traffic from `source` using the run's background
    /// settings.
    pub fn background(self, source: &str) -> Self {
        self.generator(GeneratorConfig::new(TrafficKind::Background, source))
    }

    // ── Output ────────────────────────────────────────────────

    /// Record every dispatched event.
    pub fn with_event_log(mut self) -> Self {
        self.event_log = true;
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn build_config(self) -> ScenarioConfig {
        self.config
    }

    /// Validate and build a runnable orchestrator.
    pub fn build(self) -> SimResult<Orchestrator> {
        let mut orchestrator = Orchestrator::new(&self.config)?;
        if self.event_log {
            orchestrator.enable_event_log();
        }
        Ok(orchestrator)
    }
}
