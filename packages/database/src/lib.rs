#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Comparison store.
//!
//! Every comparable set fetched during enrichment is appended to a `DuckDB`
//! file as an audit trail: one `comparisons` row per comparable and one
//! `comparison_results` row per fetch. Rows are never updated or deleted,
//! and the engine never reads them back.

pub mod paths;
pub mod store;

pub use store::{ComparisonStore, DuckDbComparisonStore};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error while preparing the data directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
