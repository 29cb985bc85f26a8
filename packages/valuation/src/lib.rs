#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Valuation math over a comparable set.
//!
//! [`statistics`] summarises raw price-per-area figures. [`normalize`]
//! strips floor and renovation premiums from each comparable down to a
//! common baseline, then prices the subject back up from that baseline.
//! The two are independent: statistics never see adjusted prices.

pub mod normalize;
pub mod statistics;

pub use normalize::{
    HAIRCUT, adjusted_unit_price, estimate_value, floor_rank, normalized_mean, renovation_rank,
};
pub use statistics::{ComparableStats, describe};

/// Errors that can occur during valuation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValuationError {
    /// There is nothing to average.
    #[error("Insufficient data: {message}")]
    InsufficientData {
        /// What was missing.
        message: String,
    },
}
