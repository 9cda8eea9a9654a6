use crate::models::ResultMap;
use serde_json::Value;
use std::{
    fs::File,
    io::{BufReader, BufWriter, ErrorKind, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        source: tempfile::PersistError,
    },
}

/// Durable slot holding the last result of every step.
pub trait ResultStore {
    /// All stored results. A store that was never written is empty.
    fn load_all(&self) -> Result<ResultMap, StoreError>;

    fn load(&self, step: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.load_all()?.remove(step))
    }

    /// Replaces the stored map as a whole.
    fn save_all(&self, results: &ResultMap) -> Result<(), StoreError>;
}

/// Results kept in one JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ResultStore for JsonFileStore {
    fn load_all(&self) -> Result<ResultMap, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(ResultMap::new()),
            Err(error) => return Err(self.io_error(error)),
        };
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    fn save_all(&self, results: &ResultMap) -> Result<(), StoreError> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        // Write next to the target and rename, so readers never see a partial file.
        let temp = NamedTempFile::new_in(directory).map_err(|error| self.io_error(error))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, results)?;
            writer.flush().map_err(|error| self.io_error(error))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|error| self.io_error(error))?;
        temp.persist(&self.path).map_err(|source| StoreError::Persist {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}
