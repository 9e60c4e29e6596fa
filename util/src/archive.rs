//! CSV archive writer
//!
//! Records are appended to a CSV file and flushed after every write, so the file on disk always
//! holds every sample taken so far.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use csv::WriterBuilder;
pub use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
pub struct Archiver {
    path: PathBuf,

    writer: Writer<File>,

    num_records: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Could not create the archive file {0:?}: {1}")]
    CreateError(PathBuf, std::io::Error),

    #[error("Could not write a record to the archive: {0}")]
    WriteError(csv::Error),

    #[error("Could not flush the archive: {0}")]
    FlushError(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_session<P: AsRef<Path>>(
        session: &Session, path: P
    ) -> Result<Self, ArchiveError> {
        Self::from_path(session.arch_root.join(path))
    }

    /// Create a new archiver writing to the given path, truncating any existing file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();

        let file = File::create(&path)
            .map_err(|e| ArchiveError::CreateError(path.clone(), e))?;

        let writer = WriterBuilder::new()
            .has_headers(true)
            .from_writer(file);

        Ok(Self {
            path,
            writer,
            num_records: 0
        })
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(&mut self, record: T) -> Result<(), ArchiveError> {
        self.writer.serialize(record).map_err(ArchiveError::WriteError)?;
        self.writer.flush().map_err(ArchiveError::FlushError)?;

        self.num_records += 1;

        Ok(())
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written so far.
    pub fn num_records(&self) -> usize {
        self.num_records
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        #[serde(rename = "Temperature (°C)")]
        temperature_c: f64,
        #[serde(rename = "Time")]
        time: String,
    }

    #[test]
    fn test_archiver_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut arch = Archiver::from_path(dir.path().join("log.csv")).unwrap();

        arch.serialise(Sample { temperature_c: 21.0, time: "10:00:00".into() }).unwrap();
        arch.serialise(Sample { temperature_c: 21.5, time: "10:30:30".into() }).unwrap();

        let contents = std::fs::read_to_string(arch.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(arch.num_records(), 2);
        assert_eq!(lines, vec!["Temperature (°C),Time", "21.0,10:00:00", "21.5,10:30:30"]);
    }
}
