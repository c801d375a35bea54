//! Per-flow statistics.
//!
//! A flow is the set of packets sharing one five-tuple. The recorder is
//! updated on every final-hop arrival and is only read after the run loop
//! has stopped.
//!
//! `first_tx` is taken from the first *arrival*, not the first
//! transmission, so throughput computed from it spans first receive to
//! last receive.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::time::VirtualTime;

/// Transport protocol of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Other(u8),
}

impl Protocol {
    /// IANA protocol number.
    pub fn number(self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Other(n) => n,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Other(n) => write!(f, "proto-{}", n),
        }
    }
}

/// Canonical identity of a flow.
///
/// The derived `Ord` (source, destination, source port, destination
/// port, protocol) is the reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
}

impl FlowKey {
    pub fn udp(src: Ipv4Addr, src_port: u16, dst: Ipv4Addr, dst_port: u16) -> Self {
        FlowKey {
            src,
            dst,
            src_port,
            dst_port,
            protocol: Protocol::Udp,
        }
    }
}

impl std::fmt::Display for FlowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} ({})",
            self.src, self.src_port, self.dst, self.dst_port, self.protocol
        )
    }
}

/// Aggregate counters for one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub key: FlowKey,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    /// Time of the first arrival (stands in for first transmission).
    pub first_tx: VirtualTime,
    pub last_rx: VirtualTime,
}

impl FlowRecord {
    /// `last_rx - first_tx`, or `None` when the span is zero.
    pub fn duration(&self) -> Option<VirtualTime> {
        self.last_rx
            .duration_since(self.first_tx)
            .filter(|d| *d > VirtualTime::ZERO)
    }
}

// ── Recorder ──────────────────────────────────────────────────────────

/// Mutable per-flow table, written by arrival events.
#[derive(Debug, Clone, Default)]
pub struct FlowRecorder {
    records: BTreeMap<FlowKey, FlowRecord>,
}

impl FlowRecorder {
    pub fn new() -> Self {
        FlowRecorder::default()
    }

    /// Account one arrival of `bytes` for `key` at `time`.
    ///
    /// Arrivals for a flow must come in non-decreasing time order; a
    /// regression means the scheduler is broken and is reported as an
    /// invariant violation.
    pub fn record_arrival(&mut self, key: FlowKey, bytes: u32, time: VirtualTime) -> SimResult<()> {
        let record = self.records.entry(key).or_insert(FlowRecord {
            key,
            rx_bytes: 0,
            rx_packets: 0,
            first_tx: time,
            last_rx: time,
        });

        if time < record.last_rx {
            return Err(SimError::Invariant(format!(
                "arrival for {} at {} precedes previous arrival at {}",
                key, time, record.last_rx
            )));
        }

        record.rx_bytes += u64::from(bytes);
        record.rx_packets += 1;
        record.last_rx = time;
        Ok(())
    }

    pub fn get(&self, key: &FlowKey) -> Option<&FlowRecord> {
        self.records.get(key)
    }

    pub fn flow_count(&self) -> usize {
        self.records.len()
    }

    /// Immutable copy of the table.
    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            records: self.records.clone(),
        }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────

/// Frozen view of the flow table, ordered by `FlowKey`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowSnapshot {
    records: BTreeMap<FlowKey, FlowRecord>,
}

impl FlowSnapshot {
    pub fn get(&self, key: &FlowKey) -> Option<&FlowRecord> {
        self.records.get(key)
    }

    /// Records in ascending `FlowKey` order.
    pub fn iter(&self) -> impl Iterator<Item = &FlowRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total_rx_bytes(&self) -> u64 {
        self.records.values().map(|r| r.rx_bytes).sum()
    }

    pub fn total_rx_packets(&self) -> u64 {
        self.records.values().map(|r| r.rx_packets).sum()
    }
}

impl FromIterator<FlowRecord> for FlowSnapshot {
    fn from_iter<I: IntoIterator<Item = FlowRecord>>(iter: I) -> Self {
        FlowSnapshot {
            records: iter.into_iter().map(|r| (r.key, r)).collect(),
        }
    }
}

// Struct keys are not valid JSON object keys, so the table is written
// as a list of records.
impl Serialize for FlowSnapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.records.values())
    }
}

impl<'de> Deserialize<'de> for FlowSnapshot {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let list = Vec::<FlowRecord>::deserialize(deserializer)?;
        Ok(list.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(last_octet: u8) -> FlowKey {
        FlowKey::udp(
            Ipv4Addr::new(10, 0, last_octet, 1),
            49153,
            Ipv4Addr::new(10, 0, 4, 1),
            5000,
        )
    }

    #[test]
    fn test_first_arrival_sets_first_tx() {
        let mut rec = FlowRecorder::new();
        rec.record_arrival(key(1), 512, VirtualTime::from_millis(10)).unwrap();
        rec.record_arrival(key(1), 512, VirtualTime::from_millis(20)).unwrap();

        let r = rec.get(&key(1)).unwrap();
        assert_eq!(r.first_tx, VirtualTime::from_millis(10));
        assert_eq!(r.last_rx, VirtualTime::from_millis(20));
        assert_eq!(r.rx_bytes, 1024);
        assert_eq!(r.rx_packets, 2);
        assert_eq!(r.duration(), Some(VirtualTime::from_millis(10)));
    }

    #[test]
    fn test_single_packet_has_no_duration() {
        let mut rec = FlowRecorder::new();
        rec.record_arrival(key(1), 512, VirtualTime::from_secs(1)).unwrap();
        assert_eq!(rec.get(&key(1)).unwrap().duration(), None);
    }

    #[test]
    fn test_time_regression_is_invariant_error() {
        let mut rec = FlowRecorder::new();
        rec.record_arrival(key(1), 100, VirtualTime::from_secs(2)).unwrap();
        let err = rec
            .record_arrival(key(1), 100, VirtualTime::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SimError::Invariant(_)));
        // the rejected arrival left the record untouched
        assert_eq!(rec.get(&key(1)).unwrap().rx_bytes, 100);
    }

    #[test]
    fn test_flows_are_independent() {
        let mut rec = FlowRecorder::new();
        rec.record_arrival(key(2), 100, VirtualTime::from_secs(5)).unwrap();
        // a different flow may record an earlier time
        rec.record_arrival(key(1), 100, VirtualTime::from_secs(1)).unwrap();
        assert_eq!(rec.flow_count(), 2);

        let snap = rec.snapshot();
        let keys: Vec<FlowKey> = snap.iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![key(1), key(2)]);
        assert_eq!(snap.total_rx_bytes(), 200);
        assert_eq!(snap.total_rx_packets(), 2);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut rec = FlowRecorder::new();
        rec.record_arrival(key(1), 100, VirtualTime::from_secs(1)).unwrap();
        let snap = rec.snapshot();
        rec.record_arrival(key(1), 100, VirtualTime::from_secs(2)).unwrap();
        assert_eq!(snap.get(&key(1)).unwrap().rx_bytes, 100);
    }

    #[test]
    fn test_snapshot_serializes_as_list() {
        let mut rec = FlowRecorder::new();
        rec.record_arrival(key(1), 100, VirtualTime::from_secs(1)).unwrap();
        let json = serde_json::to_value(rec.snapshot()).unwrap();
        let list = json.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["key"]["src"], "10.0.1.1");
        assert_eq!(list[0]["key"]["protocol"], "udp");
        assert_eq!(list[0]["rx_bytes"], 100);

        let back: FlowSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec.snapshot());
    }

    #[test]
    fn test_flow_key_display() {
        assert_eq!(key(1).to_string(), "10.0.1.1:49153 -> 10.0.4.1:5000 (UDP)");
    }
}
