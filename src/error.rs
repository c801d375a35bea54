//! Structured error types for floodsim.
//!
//! All fallible public APIs return `Result<T, SimError>`. Configuration
//! problems surface before any event is scheduled; scheduling and
//! bookkeeping violations are internal defects and abort the run. Sink
//! failures have their own type because they are logged and ignored,
//! never propagated.

use thiserror::Error;

use crate::time::VirtualTime;

/// The top-level error type for the simulation core.
#[derive(Debug, Error)]
pub enum SimError {
    // ── Configuration errors ──────────────────────────────

    /// Invalid run parameters or generator setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The topology failed validation.
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    /// A scenario file could not be read.
    #[error("cannot read scenario file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A scenario file could not be parsed.
    #[error("cannot parse scenario: {0}")]
    Parse(#[from] toml::de::Error),

    // ── Scheduling errors ─────────────────────────────────

    /// Attempted to schedule an event in the past.
    #[error("cannot schedule event at {requested} when current time is {current}")]
    InvalidTime {
        requested: VirtualTime,
        current: VirtualTime,
    },

    // ── Invariant violations ──────────────────────────────

    /// Internal bookkeeping broke one of its invariants.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

impl SimError {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        SimError::Configuration(msg.into())
    }

    /// Whether this error was caused by bad input rather than a defect.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SimError::Configuration(_)
                | SimError::Topology(_)
                | SimError::Io { .. }
                | SimError::Parse(_)
        )
    }
}

/// Topology misconfiguration, detected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("topology has no nodes")]
    Empty,

    #[error("duplicate node name '{0}'")]
    DuplicateName(String),

    #[error("duplicate address {0}")]
    DuplicateAddress(std::net::Ipv4Addr),

    #[error("link {link} references unknown node '{endpoint}'")]
    DanglingEndpoint { link: usize, endpoint: String },

    #[error("link {link} connects node '{node}' to itself")]
    SelfLoop { link: usize, node: String },

    #[error("more than one link between '{a}' and '{b}'")]
    DuplicateLink { a: String, b: String },

    #[error("node '{name}' has invalid address '{address}'")]
    InvalidAddress { name: String, address: String },

    #[error("link {link} has invalid {field}: {reason}")]
    InvalidLink {
        link: usize,
        field: &'static str,
        reason: String,
    },
}

/// A trace or report sink refused a record.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("sink closed")]
    Closed,
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_time() {
        let e = SimError::InvalidTime {
            requested: VirtualTime::from_secs(3),
            current: VirtualTime::from_secs(10),
        };
        let s = e.to_string();
        assert!(s.contains("T=3.000000000s"));
        assert!(s.contains("T=10.000000000s"));
    }

    #[test]
    fn test_topology_error_converts() {
        let e: SimError = TopologyError::DuplicateName("router".into()).into();
        assert!(e.is_configuration());
        assert_eq!(
            e.to_string(),
            "topology error: duplicate node name 'router'"
        );
    }

    #[test]
    fn test_invariant_is_not_configuration() {
        let e = SimError::Invariant("time regressed".into());
        assert!(!e.is_configuration());
    }

    #[test]
    fn test_error_is_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(SimError::config("bad window"));
        assert_eq!(e.to_string(), "configuration error: bad window");
    }
}
