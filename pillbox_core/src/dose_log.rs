//! Append-only dispense log.
//!
//! One line per dispense event, `scheduled,actual`, both formatted
//! `YYYY-MM-DD HH:MM`. A missed dose has an empty actual column. Entries are
//! never rewritten; appends take an exclusive file lock.

use crate::{DispenseLogEntry, DoseOutcome, Error, Result};
use chrono::NaiveDateTime;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Timestamp layout used in the log.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Sink for dispense outcomes
pub trait DoseLogSink {
    fn append(&mut self, entry: &DispenseLogEntry) -> Result<()>;
}

/// CSV-backed dispense log with file locking
pub struct CsvDoseLog {
    path: PathBuf,
}

impl CsvDoseLog {
    pub const LOG_FILE: &'static str = "dispense_log.csv";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl DoseLogSink for CsvDoseLog {
    fn append(&mut self, entry: &DispenseLogEntry) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        let actual = entry
            .actual
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_default();

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(&file);
        writer.write_record([
            entry.scheduled.format(TIMESTAMP_FORMAT).to_string(),
            actual,
        ])?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        tracing::debug!(
            "Logged {} dose scheduled for {}",
            entry.outcome,
            entry.scheduled.format(TIMESTAMP_FORMAT)
        );
        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| Error::Other(format!("Invalid timestamp {:?}: {}", raw, e)))
}

/// Read all entries from a log file.
///
/// Malformed lines are skipped with a warning.
pub fn read_entries(path: &Path) -> Result<Vec<DispenseLogEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(&file);

    let mut entries = Vec::new();
    for (line_num, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Failed to read log line {}: {}", line_num + 1, e);
                continue;
            }
        };

        let scheduled = match record.get(0).map(parse_timestamp) {
            Some(Ok(t)) => t,
            Some(Err(e)) => {
                tracing::warn!("Skipping log line {}: {}", line_num + 1, e);
                continue;
            }
            None => continue,
        };

        let actual = match record.get(1).map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => match parse_timestamp(raw) {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::warn!("Skipping log line {}: {}", line_num + 1, e);
                    continue;
                }
            },
            None => None,
        };

        let outcome = if actual.is_some() {
            DoseOutcome::Taken
        } else {
            DoseOutcome::Missed
        };
        entries.push(DispenseLogEntry {
            scheduled,
            actual,
            outcome,
        });
    }

    file.unlock()?;
    tracing::debug!("Read {} entries from dispense log", entries.len());
    Ok(entries)
}
