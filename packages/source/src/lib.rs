#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Marketplace listing source for comparable searches.
//!
//! The [`ListingSource`] contract is deliberately narrow:
//! `search(rectangle, min_area, max_area)` yields either a (possibly empty)
//! comparable set or [`FetchOutcome::Blocked`]. [`marketplace::MarketplaceSource`]
//! implements it against an anti-automation marketplace:
//!
//! * [`session`]: Fresh/Active session state machine with periodic rotation.
//! * [`classify`]: ordered rules deciding whether a response means the
//!   session expired.
//! * [`retry`]: bounded retry combinator, independent of the network.
//! * [`transport`]: the HTTP seam (cookie jar, timeouts).
//! * [`registry`]: marketplace adapters described by embedded TOML.

pub mod classify;
pub mod config;
pub mod marketplace;
pub mod progress;
pub mod registry;
pub mod retry;
pub mod session;
pub mod transport;

use comps_models::{Comparable, GeoRectangle};

/// Errors that can occur during listing source operations.
///
/// Session expiry and transient network failures are *not* represented
/// here: they are retried internally and surface as
/// [`FetchOutcome::Blocked`] once the retry budget is spent.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP client construction failed.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A marketplace configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// A caller-supplied argument is out of range.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected value.
        message: String,
    },
}

/// Result of one listing search.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum FetchOutcome {
    /// The marketplace answered; the set may be empty.
    Comparables(Vec<Comparable>),
    /// The marketplace refused service after the retry budget was spent.
    /// Never equivalent to an empty result.
    Blocked,
}

impl FetchOutcome {
    /// Returns `true` for [`FetchOutcome::Blocked`].
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked)
    }
}

/// A source of comparable listings queried by rectangle and area range.
///
/// Implementations own mutable session state and are driven by exactly
/// one caller at a time.
pub trait ListingSource: Send {
    /// Searches for listings inside `rect` whose living area lies in
    /// `[min_area, max_area]`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] for caller or configuration mistakes. Remote
    /// refusal is reported as [`FetchOutcome::Blocked`], not as an error.
    fn search(
        &mut self,
        rect: &GeoRectangle,
        min_area: f64,
        max_area: f64,
    ) -> impl std::future::Future<Output = Result<FetchOutcome, SourceError>> + Send;
}
