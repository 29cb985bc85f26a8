#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Comparable-sales enrichment of subject datasets.
//!
//! [`search::adaptive_search`] widens a geodesic search rectangle around a
//! subject until the listing source returns enough comparables.
//! [`controller::BatchController`] runs that search for every subject of a
//! dataset, one at a time, derives statistics and a valuation, records the
//! comparable set in the comparison store and writes the summary back onto
//! the subject row. The dataset is persisted after every subject so an
//! interrupted run never loses completed work, and already enriched rows
//! are skipped on the next run.

pub mod controller;
pub mod geocode;
pub mod search;

use comps_database::DbError;
use comps_dataset::DatasetError;
use comps_geo::GeoError;
use comps_source::SourceError;

/// Errors that abort an enrichment run.
///
/// A blocked marketplace is not among them: it ends the run early with
/// [`controller::BatchStatus::Blocked`].
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// A run parameter is out of range.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected value.
        message: String,
    },

    /// Geographic computation or geocoding failed.
    #[error(transparent)]
    Geo(#[from] GeoError),

    /// The listing source rejected a request.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Dataset loading, validation or persistence failed.
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// The comparison store could not be written.
    #[error(transparent)]
    Db(#[from] DbError),
}
