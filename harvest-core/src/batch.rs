//! Sequential batch publishing with a per-file report.
//!
//! Files are published one at a time, in the order given, with an optional
//! pause between consecutive files. A failing file never stops the batch. When
//! a report path is set, the report is rewritten after every file, so an
//! interrupted run still leaves an accurate record of what happened.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use tracing::{error, info};

use crate::contract::{PendingFile, PipelineOutcome, Publisher};
use crate::error::{DuplicateBatchName, ReportError};

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Pause between consecutive files (not before the first, not after the last).
    pub delay: Duration,
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub filename: String,
    pub batch_name: String,
    pub outcome: PipelineOutcome,
}

impl Serialize for ReportEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entry = serializer.serialize_struct("ReportEntry", 4)?;
        entry.serialize_field("file", &self.filename)?;
        entry.serialize_field(
            "status",
            if self.outcome.ok { "imported" } else { "failed" },
        )?;
        entry.serialize_field("batch_id", &self.outcome.batch_id)?;
        entry.serialize_field(
            "error",
            &(!self.outcome.ok).then_some(self.outcome.message.as_str()),
        )?;
        entry.end()
    }
}

/// Outcomes keyed by filename, in processing order. Serialises as a JSON
/// object keyed by batch name.
#[derive(Debug, Default)]
pub struct BatchReport {
    entries: Vec<ReportEntry>,
    persist_error: Option<ReportError>,
}

impl BatchReport {
    /// Record an outcome; a repeated filename replaces the earlier entry.
    pub fn record(&mut self, file: &PendingFile, outcome: PipelineOutcome) {
        let entry = ReportEntry {
            filename: file.filename.clone(),
            batch_name: file.batch_name(),
            outcome,
        };
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.filename == entry.filename)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, filename: &str) -> Option<&PipelineOutcome> {
        self.entries
            .iter()
            .find(|entry| entry.filename == filename)
            .map(|entry| &entry.outcome)
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|entry| entry.outcome.ok).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// Why the most recent write of the report failed, if it did.
    pub fn persist_error(&self) -> Option<&ReportError> {
        self.persist_error.as_ref()
    }

    /// Write the report as pretty JSON, replacing `path` atomically.
    pub fn persist(&self, path: &Path) -> Result<(), ReportError> {
        let io_error = |source: std::io::Error| ReportError::Io {
            path: path.display().to_string(),
            source,
        };
        let json = serde_json::to_vec_pretty(self)?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
        staged.write_all(&json).map_err(io_error)?;
        staged.flush().map_err(io_error)?;
        staged.persist(path).map_err(|e| io_error(e.error))?;
        Ok(())
    }
}

impl Serialize for BatchReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.batch_name, entry)?;
        }
        map.end()
    }
}

/// Fails when two differently named files map to the same batch name.
pub fn ensure_unique_batch_names(files: &[PendingFile]) -> Result<(), DuplicateBatchName> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for file in files {
        let batch_name = file.batch_name();
        match seen.get(&batch_name) {
            Some(first) if *first != file.filename => {
                return Err(DuplicateBatchName {
                    batch_name,
                    first: first.to_string(),
                    second: file.filename.clone(),
                });
            }
            Some(_) => {}
            None => {
                seen.insert(batch_name, &file.filename);
            }
        }
    }
    Ok(())
}

pub async fn run_batch<P>(publisher: &P, files: Vec<PendingFile>, options: &BatchOptions) -> BatchReport
where
    P: Publisher + ?Sized,
{
    let total = files.len();
    let mut report = BatchReport::default();
    info!(total, delay_secs = options.delay.as_secs_f64(), "Starting batch");

    for (index, file) in files.into_iter().enumerate() {
        if index > 0 && !options.delay.is_zero() {
            info!(delay_secs = options.delay.as_secs_f64(), "Waiting before next file");
            tokio::time::sleep(options.delay).await;
        }
        info!(file = %file.filename, position = index + 1, total, "Publishing file");
        let outcome = publisher.publish(file.clone()).await;
        if outcome.ok {
            info!(file = %file.filename, batch_id = ?outcome.batch_id, "File published");
        } else {
            error!(
                file = %file.filename,
                failed_at = ?outcome.failed_at,
                orphaned_file_link = ?outcome.orphaned_file_link,
                "File failed to publish"
            );
        }
        report.record(&file, outcome);

        if let Some(path) = &options.report_path {
            match report.persist(path) {
                Ok(()) => report.persist_error = None,
                Err(e) => {
                    error!(error = %e, report_path = %path.display(), "Failed to persist batch report");
                    report.persist_error = Some(e);
                }
            }
        }
    }

    info!(
        total,
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Batch finished"
    );
    report
}
