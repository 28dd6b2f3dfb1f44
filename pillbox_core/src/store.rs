//! Durable schedule storage with file locking.
//!
//! The live record is a single line that is always replaced whole; readers
//! never observe a half-written record. Clearing first appends the live line
//! to an archive file.

use crate::record;
use crate::{Error, Result, ScheduleRecord};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Persistence for the schedule aggregate.
pub trait ScheduleStore {
    /// The saved record, or `None` when absent or corrupt.
    fn load(&self) -> Result<Option<ScheduleRecord>>;

    /// Replace the saved record.
    fn save(&mut self, record: &ScheduleRecord) -> Result<()>;

    /// Move the saved record to the archive and erase it.
    fn archive_and_clear(&mut self) -> Result<()>;
}

/// Schedule store backed by a directory on disk.
pub struct FileScheduleStore {
    record_path: PathBuf,
    archive_path: PathBuf,
}

impl FileScheduleStore {
    pub const RECORD_FILE: &'static str = "schedule.txt";
    pub const ARCHIVE_FILE: &'static str = "schedule_archive.txt";

    /// Open (and create if needed) the store directory.
    ///
    /// Fails with [`Error::StorageUnavailable`] if the directory cannot be
    /// created or written.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            Error::StorageUnavailable(format!("cannot create {:?}: {}", dir, e))
        })?;

        // Check writability up front; a read-only medium is fatal at startup
        NamedTempFile::new_in(dir).map_err(|e| {
            Error::StorageUnavailable(format!("cannot write to {:?}: {}", dir, e))
        })?;

        Ok(Self {
            record_path: dir.join(Self::RECORD_FILE),
            archive_path: dir.join(Self::ARCHIVE_FILE),
        })
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Raw first line of the live record, if any.
    fn read_line(&self) -> Option<String> {
        let file = match File::open(&self.record_path) {
            Ok(f) => f,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Unable to open schedule {:?}: {}", self.record_path, e);
                }
                return None;
            }
        };

        if let Err(e) = file.lock_shared() {
            tracing::warn!("Unable to lock schedule {:?}: {}", self.record_path, e);
            return None;
        }

        let mut contents = String::new();
        let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
        let _ = file.unlock();

        if let Err(e) = read {
            tracing::warn!("Failed to read schedule {:?}: {}", self.record_path, e);
            return None;
        }

        contents.lines().next().map(str::to_string)
    }
}

impl ScheduleStore for FileScheduleStore {
    fn load(&self) -> Result<Option<ScheduleRecord>> {
        match self.read_line() {
            Some(line) => {
                let decoded = record::decode(&line);
                if decoded.is_some() {
                    tracing::debug!("Loaded schedule from {:?}", self.record_path);
                }
                Ok(decoded)
            }
            None => {
                tracing::info!("No saved schedule found");
                Ok(None)
            }
        }
    }

    /// Atomically writes the record by:
    /// 1. Writing to a temp file in the same directory
    /// 2. Syncing to disk
    /// 3. Renaming over the original
    fn save(&mut self, schedule: &ScheduleRecord) -> Result<()> {
        let line = record::encode(schedule)?;

        let parent = self.record_path.parent().ok_or_else(|| {
            Error::StorageUnavailable("schedule path missing parent".into())
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&self.record_path)
            .map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved schedule to {:?}", self.record_path);
        Ok(())
    }

    fn archive_and_clear(&mut self) -> Result<()> {
        match self.read_line() {
            Some(line) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.archive_path)?;
                file.lock_exclusive()?;
                {
                    let mut writer = std::io::BufWriter::new(&file);
                    writer.write_all(line.as_bytes())?;
                    writer.write_all(b"\n")?;
                    writer.flush()?;
                }
                file.sync_all()?;
                file.unlock()?;
                tracing::info!("Archived schedule to {:?}", self.archive_path);
            }
            None => tracing::info!("No existing schedule to archive"),
        }

        match std::fs::remove_file(&self.record_path) {
            Ok(()) => tracing::info!("Erased schedule {:?}", self.record_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
