//! Outcome accounting and per-file report records.
//!
//! The [`Reporter`] is shared by every job. It folds each outcome into the
//! [`RunSummary`] and fans a [`FileRecord`] out to its sinks. Sinks are
//! injected, so the library never decides where reports go.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use crate::output::{OutputFormat, OutputWriter};
use crate::types::{FileRecord, MediaFile, Outcome, OutcomeKind, RunSummary};

/// Receives one record per source file, in completion order.
pub trait ReportSink: Send + Sync {
    fn record(&self, record: &FileRecord);

    /// Called once after the last record.
    fn finish(&self, _summary: &RunSummary) {}
}

/// Emits one structured `tracing` event per file.
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn record(&self, record: &FileRecord) {
        let path = record.relative_path.display();
        match record.outcome {
            OutcomeKind::Converted if record.warnings.is_empty() => {
                tracing::info!(outcome = %record.outcome, "{}", path)
            }
            OutcomeKind::Converted => tracing::warn!(
                outcome = %record.outcome,
                warnings = record.warnings.len(),
                "{}: {}",
                path,
                record.warnings.join("; ")
            ),
            OutcomeKind::SkippedUnsupported | OutcomeKind::SkippedAlreadyProcessed => {
                tracing::debug!(outcome = %record.outcome, "{}", path)
            }
            OutcomeKind::Failed => tracing::error!(
                outcome = %record.outcome,
                error_kind = record.error_kind.as_deref().unwrap_or("unknown"),
                "{}: {}",
                path,
                record.reason.as_deref().unwrap_or("")
            ),
        }
    }
}

/// Appends one JSON object per line to a report file.
pub struct JsonlSink {
    writer: Mutex<OutputWriter<BufWriter<File>>>,
}

impl JsonlSink {
    /// Create (or truncate) the report file.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            writer: Mutex::new(OutputWriter::new(
                BufWriter::new(file),
                OutputFormat::JsonLines,
                false,
            )),
        })
    }
}

impl ReportSink for JsonlSink {
    fn record(&self, record: &FileRecord) {
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        if let Err(e) = writer.write(record) {
            tracing::warn!("Failed to write report record: {}", e);
        }
    }

    fn finish(&self, _summary: &RunSummary) {
        if let Ok(mut writer) = self.writer.lock() {
            if let Err(e) = writer.flush() {
                tracing::warn!("Failed to flush report: {}", e);
            }
            tracing::debug!("Report holds {} records", writer.items_written());
        }
    }
}

/// Concurrent-safe aggregate of all outcomes in a run.
pub struct Reporter {
    sinks: Vec<Box<dyn ReportSink>>,
    summary: Mutex<RunSummary>,
    started: Instant,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Reporter {
    pub fn new(sinks: Vec<Box<dyn ReportSink>>) -> Self {
        Self {
            sinks,
            summary: Mutex::new(RunSummary::default()),
            started: Instant::now(),
        }
    }

    /// Add a sink. Only valid before the run starts.
    pub fn with_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Record the terminal outcome of one file.
    pub fn record(&self, file: &MediaFile, outcome: &Outcome) {
        let record = FileRecord::new(file, outcome);

        if let Ok(mut summary) = self.summary.lock() {
            match outcome {
                Outcome::Converted { warnings, .. } => {
                    summary.converted += 1;
                    summary.input_bytes += file.size;
                    if !warnings.is_empty() {
                        summary.with_warnings += 1;
                    }
                }
                Outcome::SkippedUnsupported => summary.skipped_unsupported += 1,
                Outcome::SkippedAlreadyProcessed { .. } => summary.skipped_already_processed += 1,
                Outcome::Failed { .. } => {
                    summary.failed += 1;
                    summary.input_bytes += file.size;
                }
            }
        }

        for sink in &self.sinks {
            sink.record(&record);
        }
    }

    /// Snapshot of the counts so far.
    pub fn summary(&self) -> RunSummary {
        let mut summary = self
            .summary
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();
        summary.total_seconds = self.started.elapsed().as_secs_f64();
        summary
    }

    /// Close all sinks and return the final summary.
    pub fn finish(&self) -> RunSummary {
        let summary = self.summary();
        for sink in &self.sinks {
            sink.finish(&summary);
        }
        summary
    }
}
