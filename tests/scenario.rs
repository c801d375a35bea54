use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use floodsim::dsl::ScenarioBuilder;
use floodsim::{
    JsonReportSink, MemoryReportSink, Orchestrator, Report, ReportSink, ScenarioConfig, SinkError,
    TrafficKind, VirtualTime,
};

fn src(report: &Report, idx: usize) -> String {
    report.suspicious[idx].flow.src.to_string()
}

#[test]
fn default_experiment_flags_both_attackers() {
    let mut o = Orchestrator::new(&ScenarioConfig::default()).unwrap();
    let report = o.run().unwrap();

    assert_eq!(report.flows.len(), 3);
    assert_eq!(report.suspicious.len(), 2);
    assert_eq!(src(&report, 0), "10.0.1.1");
    assert_eq!(src(&report, 1), "10.0.2.1");

    for flow in report.flows.iter() {
        let expected = if flow.key.src.octets()[2] == 3 { 4395 } else { 24415 };
        assert_eq!(flow.rx_packets, expected, "{}", flow.key);
        assert_eq!(flow.rx_bytes, expected * 512);
    }

    let text = report.to_text();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("=== Suspicious flows (throughput > 2 Mbps) ===")
    );
    assert!(lines.next().unwrap().starts_with("Flow 1 10.0.1.1 -> 10.0.4.1  Throughput: 10.0"));
    assert!(lines.next().unwrap().starts_with("Flow 2 10.0.2.1 -> 10.0.4.1  Throughput: 10.0"));
    assert_eq!(lines.next(), None);
}

#[test]
fn single_attacker_sends_expected_packets() {
    let mut o = ScenarioBuilder::new().attack("attacker1").build().unwrap();
    assert_eq!(o.generators()[0].kind(), TrafficKind::Attack);
    assert_eq!(o.generators()[0].interval(), VirtualTime::from_nanos(409_600));

    let report = o.run().unwrap();
    assert_eq!(report.summary.delivery.packets_sent, 24415);
    assert_eq!(report.summary.delivery.packets_delivered, 24415);

    let flow = report.flows.iter().next().unwrap();
    // two hops of 409.6us + 5ms each
    assert_eq!(flow.first_tx, VirtualTime::from_nanos(5_010_819_200));
    let throughput = report.suspicious[0].throughput_mbps;
    assert!((throughput - 10.0).abs() < 0.001, "{}", throughput);
}

#[test]
fn slow_flow_is_not_reported() {
    let mut o = ScenarioBuilder::new()
        .attack("attacker1")
        .background("background")
        .build()
        .unwrap();
    let report = o.run().unwrap();

    assert_eq!(report.flows.len(), 2);
    assert_eq!(report.suspicious.len(), 1);
    assert_eq!(src(&report, 0), "10.0.1.1");

    let background = report
        .throughputs
        .iter()
        .find(|t| t.flow.src.to_string() == "10.0.3.1")
        .unwrap();
    assert!(background.throughput_mbps < 2.0);
    assert!((background.throughput_mbps - 1.0).abs() < 0.01);
}

#[test]
fn single_packet_flow_is_excluded() {
    // 512 B at 1 Mbps every 4.096ms: a 1ms window fits one packet
    let mut o = ScenarioBuilder::new()
        .sim_time(2.0)
        .attack_window(0.5, 1.5)
        .background_window(1.0, 1.001)
        .threshold_mbps(0.0)
        .build()
        .unwrap();
    let report = o.run().unwrap();

    let bg = report
        .flows
        .iter()
        .find(|r| r.key.src.to_string() == "10.0.3.1")
        .unwrap();
    assert_eq!(bg.rx_packets, 1);
    assert!(report.suspicious.iter().all(|s| s.flow != bg.key));
    assert!(report.throughputs.iter().all(|t| t.flow != bg.key));
    assert_eq!(report.suspicious.len(), 2);
}

/// Appends to a buffer the test keeps a handle to.
#[derive(Clone, Default)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A `MemoryReportSink` the test can read after handing it over.
#[derive(Clone, Default)]
struct SharedReports(Rc<RefCell<MemoryReportSink>>);

impl ReportSink for SharedReports {
    fn publish(&mut self, report: &Report) -> Result<(), SinkError> {
        self.0.borrow_mut().publish(report)
    }
}

struct RejectingSink {
    calls: Rc<RefCell<u32>>,
}

impl ReportSink for RejectingSink {
    fn publish(&mut self, _report: &Report) -> Result<(), SinkError> {
        *self.calls.borrow_mut() += 1;
        Err(SinkError::Closed)
    }
}

#[test]
fn report_sinks_receive_the_report() {
    let mut o = ScenarioBuilder::new()
        .sim_time(2.0)
        .attack_window(0.5, 1.5)
        .background_window(0.5, 1.5)
        .build()
        .unwrap();
    let rejected = Rc::new(RefCell::new(0));
    let memory = SharedReports::default();
    let json = SharedBuffer::default();
    o.add_report_sink(Box::new(RejectingSink { calls: rejected.clone() }));
    o.add_report_sink(Box::new(memory.clone()));
    o.add_report_sink(Box::new(JsonReportSink::new(json.clone())));
    let report = o.run().unwrap();

    // a failing sink ahead of the others does not stop them
    assert_eq!(*rejected.borrow(), 1);

    let published = memory.0.borrow();
    assert_eq!(published.reports().len(), 1);
    assert_eq!(published.reports()[0], report);

    let bytes = json.0.borrow();
    let text = std::str::from_utf8(&bytes).unwrap();
    assert!(text.ends_with("}\n"));
    let back: Report = serde_json::from_str(text).unwrap();
    assert_eq!(back.flows, report.flows);
    assert_eq!(back.suspicious, report.suspicious);
    assert_eq!(back.summary, report.summary);
}

#[test]
fn toml_scenario_with_custom_topology() {
    let config = ScenarioConfig::from_toml_str(
        r#"
        [run]
        sim_time = 3.0
        attack_start = 1.0
        attack_stop = 2.0
        data_rate = "5Mbps"
        threshold_mbps = 4.0

        [[topology.nodes]]
        name = "bot"
        role = "attacker"
        address = "172.16.0.10"

        [[topology.nodes]]
        name = "edge"
        role = "router"
        address = "172.16.0.1"

        [[topology.nodes]]
        name = "core"
        role = "router"
        address = "172.16.1.1"

        [[topology.nodes]]
        name = "server"
        role = "victim"
        address = "172.16.2.10"

        [[topology.links]]
        a = "bot"
        b = "edge"
        rate = "100Mbps"
        delay = "1ms"

        [[topology.links]]
        a = "edge"
        b = "core"
        rate = "1Gbps"
        delay = "10ms"

        [[topology.links]]
        a = "core"
        b = "server"
        rate = "100Mbps"
        delay = "1ms"
        "#,
    )
    .unwrap();

    let mut o = Orchestrator::new(&config).unwrap();
    let report = o.run().unwrap();
    assert_eq!(report.summary.delivery.hops_forwarded, 2 * report.summary.delivery.packets_sent);
    assert_eq!(report.suspicious.len(), 1);
    assert_eq!(report.suspicious[0].flow.dst.to_string(), "172.16.2.10");
    assert!((report.suspicious[0].throughput_mbps - 5.0).abs() < 0.01);
}
