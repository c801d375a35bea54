//! Output sinks for per-packet traces and the final report.
//!
//! Sinks sit outside the simulation: they never see the scheduler and
//! cannot affect virtual time. The orchestrator logs and ignores sink
//! failures.

use std::io::Write;

use crate::delivery::DeliveryRecord;
use crate::error::SinkError;
use crate::report::Report;

/// Receives one record per packet reaching its destination.
pub trait TraceSink {
    fn record(&mut self, record: &DeliveryRecord) -> Result<(), SinkError>;

    /// Flush buffered output. Called once after the run.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Receives the end-of-run report.
pub trait ReportSink {
    fn publish(&mut self, report: &Report) -> Result<(), SinkError>;
}

// ── Trace sinks ───────────────────────────────────────────────────────

/// Keeps every record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTraceSink {
    records: Vec<DeliveryRecord>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        MemoryTraceSink::default()
    }

    pub fn records(&self) -> &[DeliveryRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<DeliveryRecord> {
        self.records
    }
}

impl TraceSink for MemoryTraceSink {
    fn record(&mut self, record: &DeliveryRecord) -> Result<(), SinkError> {
        self.records.push(*record);
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesTraceSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesTraceSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesTraceSink { writer, written: 0 }
    }

    /// Lines written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TraceSink for JsonLinesTraceSink<W> {
    fn record(&mut self, record: &DeliveryRecord) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

// ── Report sinks ──────────────────────────────────────────────────────

/// Human-readable detector output.
pub struct TextReportSink<W: Write> {
    writer: W,
}

impl<W: Write> TextReportSink<W> {
    pub fn new(writer: W) -> Self {
        TextReportSink { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for TextReportSink<W> {
    fn publish(&mut self, report: &Report) -> Result<(), SinkError> {
        report.write_text(&mut self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Pretty-printed JSON report.
pub struct JsonReportSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonReportSink<W> {
    pub fn new(writer: W) -> Self {
        JsonReportSink { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonReportSink<W> {
    fn publish(&mut self, report: &Report) -> Result<(), SinkError> {
        serde_json::to_writer_pretty(&mut self.writer, report)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps published reports in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryReportSink {
    reports: Vec<Report>,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        MemoryReportSink::default()
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }
}

impl ReportSink for MemoryReportSink {
    fn publish(&mut self, report: &Report) -> Result<(), SinkError> {
        self.reports.push(report.clone());
        Ok(())
    }
}
