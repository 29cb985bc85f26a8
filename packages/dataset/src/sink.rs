//! Where an enriched dataset is persisted.

use std::path::{Path, PathBuf};

use crate::{Dataset, DatasetError};

/// Receives the whole dataset after every subject.
pub trait DatasetSink: Send {
    /// Persists `dataset`, replacing whatever was stored before.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError`] if the dataset cannot be written.
    fn persist(&mut self, dataset: &Dataset) -> Result<(), DatasetError>;
}

/// Writes the dataset as CSV.
///
/// Each persist goes to a sibling temporary file that is then renamed over
/// the target, so an interrupted write never truncates the previous copy.
pub struct CsvDatasetSink {
    path: PathBuf,
    writes: u64,
}

impl CsvDatasetSink {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writes: 0,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of completed persists.
    #[must_use]
    pub const fn writes(&self) -> u64 {
        self.writes
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl DatasetSink for CsvDatasetSink {
    fn persist(&mut self, dataset: &Dataset) -> Result<(), DatasetError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| DatasetError::Io {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let temp = self.temp_path();
        let file = std::fs::File::create(&temp).map_err(|e| DatasetError::Io {
            path: temp.display().to_string(),
            source: e,
        })?;
        dataset
            .write_csv(std::io::BufWriter::new(file))
            .map_err(|e| DatasetError::Csv {
                path: temp.display().to_string(),
                source: e,
            })?;
        std::fs::rename(&temp, &self.path).map_err(|e| DatasetError::Io {
            path: self.path.display().to_string(),
            source: e,
        })?;

        self.writes += 1;
        log::debug!(
            "Persisted {} row(s) to {} (write #{})",
            dataset.len(),
            self.path.display(),
            self.writes
        );

        Ok(())
    }
}
