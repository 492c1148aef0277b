//! Export sink for completed sessions.
//!
//! The engine hands a finished [`SyncReport`] to a sink exactly once per
//! session and treats a sink error as a failed handoff: for incremental
//! sessions the device cursor is only advanced after the sink returns
//! success.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::errors::{Result, SyncError};
use crate::session::SyncReport;

pub trait ExportSink {
    fn export(&mut self, report: &SyncReport) -> Result<()>;
}

/// Appends one JSON object per timeline entry (plus the vehicle snapshot)
/// to a log file.
pub struct JsonLinesExporter {
    path: PathBuf,
}

impl JsonLinesExporter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ExportSink for JsonLinesExporter {
    fn export(&mut self, report: &SyncReport) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut out = BufWriter::new(file);

        if let Some(vehicle) = &report.vehicle {
            let line = serde_json::to_string(vehicle)
                .map_err(|e| SyncError::Export(e.to_string()))?;
            writeln!(out, "{line}")?;
        }
        for entry in &report.timeline {
            let line =
                serde_json::to_string(entry).map_err(|e| SyncError::Export(e.to_string()))?;
            writeln!(out, "{line}")?;
        }
        out.flush()?;

        info!(
            "wrote {} timeline entries to {}",
            report.timeline.len(),
            self.path.display()
        );
        Ok(())
    }
}
