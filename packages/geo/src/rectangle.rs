//! Point + radius → bounding rectangle.
//!
//! The marketplace answers rectangular queries, so the search circle is
//! replaced by the square of equal area's circumscribing box: the
//! rectangle's opposite corners sit `radius * sqrt(2)` metres from the
//! centre along bearings 45° and 225°. Every point within `radius` of the
//! centre is inside the result.

use std::f64::consts::SQRT_2;

use comps_models::{GeoRectangle, Point};

use crate::{GeoError, offset};

/// Bearing of the north-east corner.
const NORTH_EAST_BEARING: f64 = 45.0;

/// Bearing of the south-west corner.
const SOUTH_WEST_BEARING: f64 = 225.0;

/// Computes the search rectangle around `center` for `radius_meters`.
///
/// # Errors
///
/// Returns [`GeoError::InvalidArgument`] if the radius is not a positive
/// finite number or the centre is not a valid WGS84 coordinate.
pub fn rectangle_from_point(center: Point, radius_meters: f64) -> Result<GeoRectangle, GeoError> {
    if !radius_meters.is_finite() || radius_meters <= 0.0 {
        return Err(GeoError::InvalidArgument {
            message: format!("radius must be positive, got {radius_meters}"),
        });
    }
    if !(-90.0..=90.0).contains(&center.lat) || !(-180.0..=180.0).contains(&center.lon) {
        return Err(GeoError::InvalidArgument {
            message: format!("center {center} is not a valid coordinate"),
        });
    }

    let diagonal = radius_meters * SQRT_2;
    let north_east = offset(center, NORTH_EAST_BEARING, diagonal);
    let south_west = offset(center, SOUTH_WEST_BEARING, diagonal);

    Ok(GeoRectangle::from_corners(south_west, north_east))
}
