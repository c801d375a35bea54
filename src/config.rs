//! Scenario configuration.
//!
//! A scenario is a TOML file with three optional sections:
//!
//! ```toml
//! [run]
//! sim_time = 20.0
//! attack_start = 5.0
//! attack_stop = 15.0
//! data_rate = "10Mbps"
//!
//! [[topology.nodes]]
//! name = "victim"
//! role = "victim"
//! address = "10.0.4.1"
//!
//! [[topology.links]]
//! a = "victim"
//! b = "router"
//! rate = "10Mbps"
//! delay = "5ms"
//!
//! [[generators]]
//! kind = "attack"
//! source = "attacker1"
//! destination = "victim"
//! ```
//!
//! Every field has a default; an empty file reproduces the five-node
//! flood experiment. Without a `generators` list, one generator is
//! derived per attacker and background node, all aimed at the single
//! victim.

use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult, TopologyError};
use crate::generator::{GeneratorSpec, TrafficKind};
use crate::rate::DataRate;
use crate::time::VirtualTime;
use crate::topology::{LinkSpec, NodeRole, NodeSpec, Topology};

/// First ephemeral port handed to generators without an explicit one.
pub const FIRST_SOURCE_PORT: u16 = 49153;

// ── Run parameters ────────────────────────────────────────────────────

/// Timing, rate and detector settings. Times are seconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunParameters {
    /// Horizon; events after it are discarded.
    pub sim_time: f64,
    pub attack_start: f64,
    pub attack_stop: f64,
    pub background_start: f64,
    pub background_stop: f64,
    /// Attack generator rate.
    pub data_rate: DataRate,
    pub background_rate: DataRate,
    /// Bytes per packet, for every generator without its own size.
    pub packet_size: u32,
    pub threshold_mbps: f64,
    /// Victim UDP port.
    pub port: u16,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            sim_time: 20.0,
            attack_start: 5.0,
            attack_stop: 15.0,
            background_start: 1.0,
            background_stop: 19.0,
            data_rate: DataRate::MBPS_10,
            background_rate: DataRate::MBPS_1,
            packet_size: 512,
            threshold_mbps: 2.0,
            port: 5000,
        }
    }
}

impl RunParameters {
    pub fn validate(&self) -> SimResult<()> {
        for (name, value) in [
            ("sim_time", self.sim_time),
            ("attack_start", self.attack_start),
            ("attack_stop", self.attack_stop),
            ("background_start", self.background_start),
            ("background_stop", self.background_stop),
        ] {
            seconds(name, value)?;
        }
        if self.attack_start >= self.attack_stop {
            return Err(SimError::config(format!(
                "attack_start ({}) must be before attack_stop ({})",
                self.attack_start, self.attack_stop
            )));
        }
        if self.attack_stop > self.sim_time {
            return Err(SimError::config(format!(
                "attack_stop ({}) must not exceed sim_time ({})",
                self.attack_stop, self.sim_time
            )));
        }
        if self.packet_size == 0 {
            return Err(SimError::config("packet_size must be positive"));
        }
        if !self.threshold_mbps.is_finite() || self.threshold_mbps < 0.0 {
            return Err(SimError::config(format!(
                "threshold_mbps must be finite and non-negative, got {}",
                self.threshold_mbps
            )));
        }
        Ok(())
    }

    /// The horizon as virtual time.
    pub fn horizon(&self) -> SimResult<VirtualTime> {
        seconds("sim_time", self.sim_time)
    }

    fn window(&self, kind: TrafficKind) -> (f64, f64) {
        match kind {
            TrafficKind::Attack => (self.attack_start, self.attack_stop),
            TrafficKind::Background => (self.background_start, self.background_stop),
        }
    }

    fn rate(&self, kind: TrafficKind) -> DataRate {
        match kind {
            TrafficKind::Attack => self.data_rate,
            TrafficKind::Background => self.background_rate,
        }
    }
}

fn seconds(name: &str, value: f64) -> SimResult<VirtualTime> {
    VirtualTime::from_secs_f64(value).ok_or_else(|| {
        SimError::config(format!("{} must be finite and non-negative, got {}", name, value))
    })
}

// ── Topology ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeConfig {
    pub name: String,
    pub role: NodeRole,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LinkConfig {
    pub a: String,
    pub b: String,
    #[serde(default = "default_link_rate")]
    pub rate: String,
    /// Propagation delay as a human duration, e.g. `"5ms"`.
    #[serde(default = "default_link_delay")]
    pub delay: String,
}

fn default_link_rate() -> String {
    "10Mbps".to_string()
}

fn default_link_delay() -> String {
    "5ms".to_string()
}

/// Explicit node/link description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub nodes: Vec<NodeConfig>,
    pub links: Vec<LinkConfig>,
}

impl TopologyConfig {
    /// The five-node star written out explicitly.
    pub fn ddos_star() -> Self {
        let node = |name: &str, role, address: &str| NodeConfig {
            name: name.to_string(),
            role,
            address: address.to_string(),
        };
        let nodes = vec![
            node("attacker1", NodeRole::Attacker, "10.0.1.1"),
            node("attacker2", NodeRole::Attacker, "10.0.2.1"),
            node("background", NodeRole::Background, "10.0.3.1"),
            node("victim", NodeRole::Victim, "10.0.4.1"),
            node("router", NodeRole::Router, "10.0.0.254"),
        ];
        let links = nodes[..4]
            .iter()
            .map(|leaf| LinkConfig {
                a: leaf.name.clone(),
                b: "router".to_string(),
                rate: default_link_rate(),
                delay: default_link_delay(),
            })
            .collect();
        TopologyConfig { nodes, links }
    }

    /// Parse addresses, rates and delays, then validate the graph.
    pub fn build(&self) -> Result<Topology, TopologyError> {
        let nodes = self
            .nodes
            .iter()
            .map(|n| {
                let address: Ipv4Addr =
                    n.address.parse().map_err(|_| TopologyError::InvalidAddress {
                        name: n.name.clone(),
                        address: n.address.clone(),
                    })?;
                Ok(NodeSpec::new(n.name.clone(), n.role, address))
            })
            .collect::<Result<Vec<_>, TopologyError>>()?;

        let links = self
            .links
            .iter()
            .enumerate()
            .map(|(idx, l)| {
                let rate: DataRate = l.rate.parse().map_err(|e: crate::rate::RateParseError| {
                    TopologyError::InvalidLink {
                        link: idx,
                        field: "rate",
                        reason: e.to_string(),
                    }
                })?;
                let delay = humantime::parse_duration(&l.delay)
                    .map_err(|e| TopologyError::InvalidLink {
                        link: idx,
                        field: "delay",
                        reason: e.to_string(),
                    })
                    .and_then(|d| {
                        VirtualTime::from_duration(d).ok_or_else(|| TopologyError::InvalidLink {
                            link: idx,
                            field: "delay",
                            reason: "out of range".to_string(),
                        })
                    })?;
                Ok(LinkSpec::new(l.a.clone(), l.b.clone(), rate, delay))
            })
            .collect::<Result<Vec<_>, TopologyError>>()?;

        Topology::new(nodes, links)
    }
}

// ── Generators ────────────────────────────────────────────────────────

/// One traffic source. Unset fields fall back to the run parameters
/// for the generator's kind.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GeneratorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: TrafficKind,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<DataRate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<u16>,
}

impl GeneratorConfig {
    /// A generator of `kind` from `source` with every other field
    /// defaulted.
    pub fn new(kind: TrafficKind, source: impl Into<String>) -> Self {
        GeneratorConfig {
            name: None,
            kind,
            source: source.into(),
            destination: None,
            rate: None,
            packet_size: None,
            start: None,
            stop: None,
            src_port: None,
            dst_port: None,
        }
    }
}

// ── Scenario ──────────────────────────────────────────────────────────

/// A complete, serializable scenario.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub run: RunParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<TopologyConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generators: Option<Vec<GeneratorConfig>>,
}

impl ScenarioConfig {
    /// Read and parse a scenario file.
    pub fn load(path: &Path) -> SimResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> SimResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The default scenario with its topology spelled out, as TOML.
    pub fn default_toml() -> String {
        let config = ScenarioConfig {
            topology: Some(TopologyConfig::ddos_star()),
            ..ScenarioConfig::default()
        };
        toml::to_string_pretty(&config).unwrap_or_else(|_| "# failed to generate config".to_string())
    }

    /// Check run parameters and per-generator overrides.
    pub fn validate(&self) -> SimResult<()> {
        self.run.validate()?;
        for (idx, g) in self.generators.iter().flatten().enumerate() {
            let label = g.name.clone().unwrap_or_else(|| format!("#{}", idx));
            if g.packet_size == Some(0) {
                return Err(SimError::config(format!(
                    "generator {}: packet_size must be positive",
                    label
                )));
            }
            if let Some(start) = g.start {
                seconds(&format!("generator {} start", label), start)?;
            }
            if let Some(stop) = g.stop {
                seconds(&format!("generator {} stop", label), stop)?;
            }
        }
        Ok(())
    }

    /// The configured topology, or the built-in star.
    pub fn build_topology(&self) -> SimResult<Topology> {
        match &self.topology {
            Some(t) => Ok(t.build()?),
            None => Ok(Topology::ddos_star()),
        }
    }

    /// The generator list, explicit or derived from node roles.
    pub fn generator_configs(&self, topology: &Topology) -> Vec<GeneratorConfig> {
        if let Some(list) = &self.generators {
            return list.clone();
        }
        let mut derived = Vec::new();
        for (role, kind) in [
            (NodeRole::Attacker, TrafficKind::Attack),
            (NodeRole::Background, TrafficKind::Background),
        ] {
            for id in topology.nodes_with_role(role) {
                if let Some(node) = topology.node(id) {
                    derived.push(GeneratorConfig::new(kind, node.name.clone()));
                }
            }
        }
        derived
    }

    /// Resolve node names and fill defaults, assigning source ports
    /// from `FIRST_SOURCE_PORT` to generators without one.
    pub fn generator_specs(&self, topology: &Topology) -> SimResult<Vec<GeneratorSpec>> {
        let configs = self.generator_configs(topology);
        let needs_victim = configs.iter().any(|g| g.destination.is_none());
        let victim = if needs_victim {
            Some(single_victim(topology)?)
        } else {
            None
        };

        let mut next_port = FIRST_SOURCE_PORT;
        let mut specs = Vec::with_capacity(configs.len());
        for g in configs {
            let source = topology.node_by_name(&g.source).ok_or_else(|| {
                SimError::config(format!("generator source '{}' is not a node", g.source))
            })?;
            let destination = match &g.destination {
                Some(name) => topology.node_by_name(name).ok_or_else(|| {
                    SimError::config(format!("generator destination '{}' is not a node", name))
                })?,
                None => victim.ok_or_else(|| SimError::config("no victim node"))?,
            };

            let (default_start, default_stop) = self.run.window(g.kind);
            let src_port = match g.src_port {
                Some(p) => p,
                None => {
                    let p = next_port;
                    next_port = next_port.checked_add(1).ok_or_else(|| {
                        SimError::config("ran out of source ports")
                    })?;
                    p
                }
            };

            specs.push(GeneratorSpec {
                name: g.name.clone().unwrap_or_else(|| g.source.clone()),
                kind: g.kind,
                source,
                destination,
                src_port,
                dst_port: g.dst_port.unwrap_or(self.run.port),
                packet_size: g.packet_size.unwrap_or(self.run.packet_size),
                rate: g.rate.unwrap_or_else(|| self.run.rate(g.kind)),
                start: seconds("generator start", g.start.unwrap_or(default_start))?,
                stop: seconds("generator stop", g.stop.unwrap_or(default_stop))?,
            });
        }
        Ok(specs)
    }
}

fn single_victim(topology: &Topology) -> SimResult<crate::topology::NodeId> {
    match topology.nodes_with_role(NodeRole::Victim).as_slice() {
        [one] => Ok(*one),
        [] => Err(SimError::config(
            "generators without a destination need a node with role 'victim'",
        )),
        many => Err(SimError::config(format!(
            "generators without a destination need exactly one victim, found {}",
            many.len()
        ))),
    }
}
