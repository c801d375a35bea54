//! floodsim CLI
//!
//! Runs the flood experiment and prints the detector output.
//!
//! # Example
//!
//! ```bash
//! # the built-in five-node experiment
//! floodsim
//!
//! # a longer, slower flood with a JSON report and a packet trace
//! floodsim --attack-stop 18 --data-rate 4Mbps --report-json report.json --trace trace.jsonl
//!
//! # write the default scenario, edit it, run it
//! floodsim --print-default-config > scenario.toml
//! floodsim --config scenario.toml --verify-replay
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use floodsim::dsl::ScenarioBuilder;
use floodsim::{
    verify_replay, DataRate, JsonLinesTraceSink, JsonReportSink, ScenarioConfig, TextReportSink,
};

/// Flood simulator
///
/// Simulates a constant-rate UDP flood over a point-to-point network and
/// reports flows whose throughput at the victim exceeds a threshold.
/// Single-threaded and fully deterministic.
#[derive(Parser, Debug)]
#[command(name = "floodsim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Scenario file (TOML). Defaults to the built-in experiment.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Simulation horizon in seconds
    #[arg(long)]
    sim_time: Option<f64>,

    /// Attack window start in seconds
    #[arg(long)]
    attack_start: Option<f64>,

    /// Attack window stop in seconds
    #[arg(long)]
    attack_stop: Option<f64>,

    /// Attack rate, e.g. 10Mbps
    #[arg(long)]
    data_rate: Option<DataRate>,

    /// Packet size in bytes
    #[arg(long)]
    packet_size: Option<u32>,

    /// Detection threshold in Mbps
    #[arg(short = 't', long)]
    threshold: Option<f64>,

    /// Write one JSON line per delivered packet
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Write the full report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,

    /// Write the dispatch log as text
    #[arg(long)]
    event_log: Option<PathBuf>,

    /// Print the default scenario as TOML and exit
    #[arg(long)]
    print_default_config: bool,

    /// Run twice and fail unless both runs dispatch identical events
    #[arg(long)]
    verify_replay: bool,

    /// Debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    /// Load the scenario and apply command-line overrides.
    fn scenario(&self) -> Result<ScenarioConfig> {
        let mut config = match &self.config {
            Some(path) => ScenarioConfig::load(path)
                .with_context(|| format!("failed to load scenario {}", path.display()))?,
            None => ScenarioConfig::default(),
        };

        let run = &mut config.run;
        if let Some(v) = self.sim_time {
            run.sim_time = v;
        }
        if let Some(v) = self.attack_start {
            run.attack_start = v;
        }
        if let Some(v) = self.attack_stop {
            run.attack_stop = v;
        }
        if let Some(v) = self.data_rate {
            run.data_rate = v;
        }
        if let Some(v) = self.packet_size {
            run.packet_size = v;
        }
        if let Some(v) = self.threshold {
            run.threshold_mbps = v;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "warn,floodsim=debug"
    } else {
        "warn,floodsim=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    if args.print_default_config {
        print!("{}", ScenarioConfig::default_toml());
        return Ok(());
    }

    let config = args.scenario()?;
    info!(
        sim_time = config.run.sim_time,
        attack_start = config.run.attack_start,
        attack_stop = config.run.attack_stop,
        data_rate = %config.run.data_rate,
        packet_size = config.run.packet_size,
        threshold_mbps = config.run.threshold_mbps,
        "scenario loaded"
    );

    if args.verify_replay {
        let hash = verify_replay(&config).context("replay verification failed")?;
        println!("replay verified, log hash {:016x}", hash);
    }

    let mut builder = ScenarioBuilder::from_config(config);
    if args.event_log.is_some() {
        builder = builder.with_event_log();
    }
    let mut orchestrator = builder.build().context("invalid scenario")?;

    if let Some(path) = &args.trace {
        let file = File::create(path)
            .with_context(|| format!("failed to create trace file {}", path.display()))?;
        orchestrator.set_trace_sink(Box::new(JsonLinesTraceSink::new(BufWriter::new(file))));
    }

    orchestrator.add_report_sink(Box::new(TextReportSink::new(io::stdout())));
    if let Some(path) = &args.report_json {
        let file = File::create(path)
            .with_context(|| format!("failed to create report file {}", path.display()))?;
        orchestrator.add_report_sink(Box::new(JsonReportSink::new(BufWriter::new(file))));
    }

    let report = orchestrator.run().context("simulation failed")?;

    if let Some(path) = &args.event_log {
        let Some(log) = orchestrator.event_log() else {
            bail!("event log was not recorded");
        };
        let mut out = BufWriter::new(
            File::create(path)
                .with_context(|| format!("failed to create event log {}", path.display()))?,
        );
        log.export(&mut out)
            .and_then(|_| out.flush())
            .with_context(|| format!("failed to write event log {}", path.display()))?;
    }

    info!(
        flows = report.flows.len(),
        suspicious = report.suspicious.len(),
        packets_sent = report.summary.delivery.packets_sent,
        events_discarded = report.summary.events_discarded,
        "done"
    );
    Ok(())
}
