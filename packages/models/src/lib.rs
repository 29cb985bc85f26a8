#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Core data types for comparable-sales valuation.
//!
//! A [`Subject`] is the real-estate unit being valued. [`Comparable`]s are
//! third-party marketplace listings found near the subject, and a
//! [`ComparisonResult`] is the immutable record of one comparable set
//! fetched for one subject together with the statistics derived from it.

pub mod floor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use floor::{parse_floor_label, parse_renovated};

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

impl Point {
    /// Creates a new point.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Parses a `"lat,lon"` pair, tolerating surrounding whitespace.
    #[must_use]
    pub fn parse_pair(value: &str) -> Option<Self> {
        let (lat, lon) = value.split_once(',')?;
        let lat = lat.trim().parse::<f64>().ok()?;
        let lon = lon.trim().parse::<f64>().ok()?;
        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }
        Some(Self::new(lat, lon))
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// An axis-aligned latitude/longitude bounding box.
///
/// Always satisfies `min_lat <= max_lat` and `min_lon <= max_lon`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoRectangle {
    /// Southern edge.
    pub min_lat: f64,
    /// Western edge.
    pub min_lon: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Eastern edge.
    pub max_lon: f64,
}

impl GeoRectangle {
    /// Builds the rectangle spanned by two opposite corners, in any order.
    #[must_use]
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            min_lat: a.lat.min(b.lat),
            min_lon: a.lon.min(b.lon),
            max_lat: a.lat.max(b.lat),
            max_lon: a.lon.max(b.lon),
        }
    }

    /// Returns `true` if the point lies inside the rectangle or on its edge.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lon..=self.max_lon).contains(&point.lon)
    }

    /// South-west corner.
    #[must_use]
    pub const fn south_west(&self) -> Point {
        Point::new(self.min_lat, self.min_lon)
    }

    /// North-east corner.
    #[must_use]
    pub const fn north_east(&self) -> Point {
        Point::new(self.max_lat, self.max_lon)
    }
}

impl std::fmt::Display for GeoRectangle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{:.6},{:.6} .. {:.6},{:.6}]",
            self.min_lat, self.min_lon, self.max_lat, self.max_lon
        )
    }
}

/// Identity of a subject across repeated runs:
/// `(source_tag, portfolio_tag, unique_id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectKey {
    /// Dataset the subject came from.
    pub source_tag: String,
    /// Portfolio within the source.
    pub portfolio_tag: String,
    /// Identifier unique within the portfolio.
    pub unique_id: String,
}

impl std::fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.source_tag, self.portfolio_tag, self.unique_id
        )
    }
}

/// The real-estate unit being valued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Identifier unique within the portfolio.
    pub unique_id: String,
    /// Dataset the subject came from.
    pub source_tag: String,
    /// Portfolio within the source.
    pub portfolio_tag: String,
    /// Location of the unit.
    pub location: Point,
    /// Living area in square metres, always positive.
    pub area: f64,
    /// Asking or reserve price, always positive.
    pub price: f64,
    /// Floor level (`0` = ground, negative = basement), if known.
    pub floor_level: Option<i32>,
    /// Whether the unit is renovated, if known.
    pub renovated: Option<bool>,
    /// When the subject was last enriched, if ever.
    pub enriched_at: Option<DateTime<Utc>>,
}

impl Subject {
    /// Returns the idempotency key of this subject.
    #[must_use]
    pub fn key(&self) -> SubjectKey {
        SubjectKey {
            source_tag: self.source_tag.clone(),
            portfolio_tag: self.portfolio_tag.clone(),
            unique_id: self.unique_id.clone(),
        }
    }

    /// Price per square metre.
    #[must_use]
    pub fn unit_price(&self) -> f64 {
        self.price / self.area
    }
}

/// A marketplace listing used as a market reference point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparable {
    /// Location of the listing.
    pub location: Point,
    /// Living area in square metres, always positive.
    pub area: f64,
    /// Listing price, always positive.
    pub price: f64,
    /// Floor level, if the listing states one.
    pub floor_level: Option<i32>,
    /// Renovation state, if the listing states one.
    pub renovated: Option<bool>,
    /// Link back to the listing (or the search page it was found on).
    pub source_url: String,
}

impl Comparable {
    /// Price per square metre.
    #[must_use]
    pub fn unit_price(&self) -> f64 {
        self.price / self.area
    }
}

/// One comparable set fetched for one subject plus everything derived from
/// it. Immutable once written to the comparison store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Idempotency key of the subject.
    pub subject: SubjectKey,
    /// The raw comparable set.
    pub comparables: Vec<Comparable>,
    /// Number of comparables.
    pub count: usize,
    /// Mean unit price.
    pub mean: Option<f64>,
    /// Median unit price.
    pub median: Option<f64>,
    /// Lowest unit price.
    pub min: Option<f64>,
    /// Highest unit price.
    pub max: Option<f64>,
    /// Sample standard deviation of unit prices.
    pub std: Option<f64>,
    /// Subject's unit price expressed in standard deviations from the mean.
    pub z_score: Option<f64>,
    /// Search radius (metres) at which the set was retrieved.
    pub radius_used: f64,
    /// Mean of the structurally normalized unit prices.
    pub normalized_mean: Option<f64>,
    /// Subject value re-priced from the normalized mean.
    pub estimated_value: Option<f64>,
    /// When the set was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl ComparisonResult {
    /// Distinct listing links in fetch order.
    #[must_use]
    pub fn reference_urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = Vec::with_capacity(self.comparables.len());
        for comparable in &self.comparables {
            let url = comparable.source_url.as_str();
            if !url.is_empty() && !urls.contains(&url) {
                urls.push(url);
            }
        }
        urls
    }
}
