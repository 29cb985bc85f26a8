#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geographic helpers for comparable searches.
//!
//! * [`offset`] / [`distance`]: geodesic (WGS84 ellipsoid) primitives
//!   backed by the `geo` crate.
//! * [`rectangle::rectangle_from_point`] turns a point and a radius into
//!   the bounding rectangle the marketplace is queried with.
//! * [`Geocoder`] resolves free-text addresses to coordinates;
//!   [`nominatim::NominatimGeocoder`] is the bundled implementation.

pub mod nominatim;
pub mod rectangle;

use comps_models::Point;
use geo::{Destination, Distance, Geodesic};
use thiserror::Error;

/// Errors from geographic operations.
#[derive(Debug, Error)]
pub enum GeoError {
    /// A caller-supplied value is out of range.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected value.
        message: String,
    },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// The geocoder returned no match for the address.
    #[error("No geocoding match for '{address}'")]
    NotFound {
        /// The address that could not be resolved.
        address: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,
}

/// Moves `distance_m` metres from `origin` along the geodesic starting at
/// `bearing_deg` (degrees clockwise from north).
#[must_use]
pub fn offset(origin: Point, bearing_deg: f64, distance_m: f64) -> Point {
    let start = geo::Point::new(origin.lon, origin.lat);
    let end = Geodesic.destination(start, bearing_deg, distance_m);
    Point::new(end.y(), end.x())
}

/// Geodesic distance between two points in metres.
#[must_use]
pub fn distance(a: Point, b: Point) -> f64 {
    Geodesic.distance(geo::Point::new(a.lon, a.lat), geo::Point::new(b.lon, b.lat))
}

/// Resolves free-text addresses to coordinates.
pub trait Geocoder: Send {
    /// Resolves a single address.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::NotFound`] when the address has no match, or
    /// another [`GeoError`] if the lookup itself fails.
    fn resolve(
        &mut self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<Point, GeoError>> + Send;
}
