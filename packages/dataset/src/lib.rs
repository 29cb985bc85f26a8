#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The tabular dataset that carries subject rows.
//!
//! A [`Dataset`] keeps every original cell so rows round-trip unchanged;
//! enrichment only adds or overwrites the summary columns listed in
//! [`summary`]. Column presence is checked once, before any processing,
//! and a run fails fast with [`DatasetError::MissingColumns`].

pub mod columns;
pub mod dataset;
pub mod sink;
pub mod summary;

pub use columns::ColumnMap;
pub use dataset::{Dataset, RowError};
pub use sink::{CsvDatasetSink, DatasetSink};

/// Errors that can occur while loading or persisting a dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// Required columns are absent from the header row.
    #[error("Missing columns: {}", columns.join(", "))]
    MissingColumns {
        /// Names of the absent columns.
        columns: Vec<String>,
    },

    /// CSV reading or writing failed.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// File being read or written.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Filesystem access failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A column mapping file is invalid.
    #[error("Column mapping error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },
}
