//! End-of-run report.
//!
//! Built once after the run loop stops and handed to every report sink.
//! The text rendering keeps the classic detector output:
//!
//! ```text
//! === Suspicious flows (throughput > 2 Mbps) ===
//! Flow 1 10.0.1.1 -> 10.0.4.1  Throughput: 10.0004 Mbps
//! ```
//!
//! Flow ids are 1-based positions in ascending flow order.

use std::fmt;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryStats;
use crate::detector::{FlowThroughput, SuspiciousFlow};
use crate::flow::{FlowKey, FlowSnapshot};
use crate::time::VirtualTime;

/// Counters describing how the run went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Configured horizon.
    pub sim_time: VirtualTime,
    /// Clock value when the loop stopped.
    pub end_time: VirtualTime,
    pub events_processed: u64,
    /// Events still pending at the horizon, dropped unexecuted.
    pub events_discarded: u64,
    pub generators: usize,
    #[serde(flatten)]
    pub delivery: DeliveryStats,
    /// Dispatch-log hash when event logging was enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_hash: Option<u64>,
}

/// Detector output plus the full flow table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub threshold_mbps: f64,
    pub suspicious: Vec<SuspiciousFlow>,
    pub throughputs: Vec<FlowThroughput>,
    pub flows: FlowSnapshot,
    pub summary: RunSummary,
}

impl Report {
    /// 1-based id of `key` in flow order.
    pub fn flow_id(&self, key: &FlowKey) -> Option<usize> {
        self.flows.iter().position(|r| r.key == *key).map(|i| i + 1)
    }

    /// Write the detector's text output.
    pub fn write_text<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write!(w, "{}", self)
    }

    /// The text output as a string.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== Suspicious flows (throughput > {} Mbps) ===",
            significant(self.threshold_mbps)
        )?;
        for s in &self.suspicious {
            let id = self.flow_id(&s.flow).unwrap_or(0);
            writeln!(
                f,
                "Flow {} {} -> {}  Throughput: {} Mbps",
                id,
                s.flow.src,
                s.flow.dst,
                significant(s.throughput_mbps)
            )?;
        }
        Ok(())
    }
}

/// Six significant digits, trailing zeros trimmed.
fn significant(x: f64) -> String {
    if x == 0.0 || !x.is_finite() {
        return format!("{}", x);
    }
    let magnitude = x.abs().log10().floor() as i32;
    let decimals = (5 - magnitude).max(0) as usize;
    let s = format!("{:.*}", decimals, x);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::flow::FlowRecord;

    fn key(octet: u8) -> FlowKey {
        FlowKey::udp(Ipv4Addr::new(10, 0, octet, 1), 49153, Ipv4Addr::new(10, 0, 4, 1), 5000)
    }

    fn report() -> Report {
        let flows: FlowSnapshot = [1, 3]
            .into_iter()
            .map(|o| FlowRecord {
                key: key(o),
                rx_bytes: 1000,
                rx_packets: 2,
                first_tx: VirtualTime::ZERO,
                last_rx: VirtualTime::from_secs(1),
            })
            .collect();
        Report {
            threshold_mbps: 2.0,
            suspicious: vec![SuspiciousFlow {
                flow: key(3),
                throughput_mbps: 10.000_390_625,
            }],
            throughputs: Vec::new(),
            flows,
            summary: RunSummary {
                sim_time: VirtualTime::from_secs(20),
                end_time: VirtualTime::from_secs(20),
                events_processed: 10,
                events_discarded: 2,
                generators: 2,
                delivery: DeliveryStats::default(),
                log_hash: None,
            },
        }
    }

    #[test]
    fn test_text_format() {
        let text = report().to_text();
        assert_eq!(
            text,
            "=== Suspicious flows (throughput > 2 Mbps) ===\n\
             Flow 2 10.0.3.1 -> 10.0.4.1  Throughput: 10.0004 Mbps\n"
        );
    }

    struct Full;

    impl Write for Full {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::WriteZero, "full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_text_matches_to_text() {
        let r = report();
        let mut out = Vec::new();
        r.write_text(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), r.to_text());

        let err = r.write_text(&mut Full).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_significant_digits() {
        assert_eq!(significant(2.0), "2");
        assert_eq!(significant(0.5), "0.5");
        assert_eq!(significant(1.000_004_1), "1");
        assert_eq!(significant(123.456_78), "123.457");
        assert_eq!(significant(0.0), "0");
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["threshold_mbps"], 2.0);
        assert_eq!(json["suspicious"][0]["flow"]["src"], "10.0.3.1");
        assert_eq!(json["flows"].as_array().unwrap().len(), 2);
        // delivery counters sit directly in the summary
        assert_eq!(json["summary"]["packets_sent"], 0);
        assert!(json["summary"].get("log_hash").is_none());
    }
}
