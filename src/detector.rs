//! Threshold detector over a finished run's flow table.

use serde::{Deserialize, Serialize};

use crate::flow::{FlowKey, FlowRecord, FlowSnapshot};

/// A flow whose measured throughput exceeded the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousFlow {
    pub flow: FlowKey,
    pub throughput_mbps: f64,
}

/// Measured throughput of one flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowThroughput {
    pub flow: FlowKey,
    pub rx_bytes: u64,
    pub duration_secs: f64,
    pub throughput_mbps: f64,
}

/// Flags flows sending faster than a fixed rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detector {
    threshold_mbps: f64,
}

impl Detector {
    pub fn new(threshold_mbps: f64) -> Self {
        Detector { threshold_mbps }
    }

    pub fn threshold_mbps(&self) -> f64 {
        self.threshold_mbps
    }

    /// `rx_bytes * 8 / (last_rx - first_tx) / 1e6`, or `None` when the
    /// flow has no measurable span.
    pub fn throughput_mbps(record: &FlowRecord) -> Option<f64> {
        let duration = record.duration()?.as_secs_f64();
        Some(record.rx_bytes as f64 * 8.0 / duration / 1e6)
    }

    /// Throughput of every flow with a positive span, in flow order.
    pub fn throughputs(&self, snapshot: &FlowSnapshot) -> Vec<FlowThroughput> {
        snapshot
            .iter()
            .filter_map(|r| {
                let duration = r.duration()?;
                Some(FlowThroughput {
                    flow: r.key,
                    rx_bytes: r.rx_bytes,
                    duration_secs: duration.as_secs_f64(),
                    throughput_mbps: Self::throughput_mbps(r)?,
                })
            })
            .collect()
    }

    /// Flows strictly above the threshold, in ascending flow order.
    /// Flows that received a single packet have no span and are never
    /// reported.
    pub fn evaluate(&self, snapshot: &FlowSnapshot) -> Vec<SuspiciousFlow> {
        snapshot
            .iter()
            .filter_map(|r| {
                let throughput_mbps = Self::throughput_mbps(r)?;
                (throughput_mbps > self.threshold_mbps).then_some(SuspiciousFlow {
                    flow: r.key,
                    throughput_mbps,
                })
            })
            .collect()
    }
}
