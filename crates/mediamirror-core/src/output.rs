//! JSON and JSON Lines serialization for run reports.
//!
//! Per-file records are written as JSON Lines so a report can be tailed
//! while a run is in progress; single documents (the run summary, tool
//! diagnostics) are written as JSON.

use serde::Serialize;
use std::io::{self, Write};

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Single JSON document per write
    Json,
    /// One JSON object per line (newline-delimited JSON)
    JsonLines,
}

/// A writer that serializes items to JSON or JSONL format.
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    items_written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// Create a new output writer. `pretty` only affects [`OutputFormat::Json`].
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            items_written: 0,
        }
    }

    /// Write a single item followed by a newline.
    pub fn write<T: Serialize>(&mut self, item: &T) -> io::Result<()> {
        match (self.format, self.pretty) {
            (OutputFormat::Json, true) => {
                serde_json::to_writer_pretty(&mut self.writer, item).map_err(io::Error::other)?
            }
            // JSONL is never pretty-printed (one object per line)
            _ => serde_json::to_writer(&mut self.writer, item).map_err(io::Error::other)?,
        }
        writeln!(self.writer)?;
        self.items_written += 1;
        Ok(())
    }

    /// Get the number of items written.
    pub fn items_written(&self) -> usize {
        self.items_written
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Consume the writer and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
