//! Structural normalisation.
//!
//! Each comparable's unit price is reduced by the listing-to-sale
//! [`HAIRCUT`] and divided out of its floor and renovation premiums:
//!
//! ```text
//! adjusted = unit_price * 0.90 * (1 - floor_rank) * (1 - renovation_rank)
//! ```
//!
//! The subject is then priced in the opposite direction, applying its own
//! premiums on top of the baseline mean:
//!
//! ```text
//! estimated = normalized_mean * area * (1 + floor_rank) * (1 + renovation_rank)
//! ```

use comps_models::{Comparable, Subject};

use crate::ValuationError;

/// Listing-to-sale price haircut applied to every comparable.
pub const HAIRCUT: f64 = 0.90;

/// Rank of floors at or above six, and of unknown floors.
const TOP_FLOOR_RANK: f64 = 0.25;

/// Premium (or discount, when negative) associated with a floor level.
///
/// Unknown levels fall into the top bucket.
#[must_use]
pub fn floor_rank(level: Option<i32>) -> f64 {
    match level {
        Some(l) if l < 0 => -0.40,
        Some(0) => -0.10,
        Some(1) => 0.0,
        Some(2) => 0.05,
        Some(3) => 0.10,
        Some(4) => 0.15,
        Some(5) => 0.20,
        _ => TOP_FLOOR_RANK,
    }
}

/// Premium of a renovated unit. Unknown counts as not renovated.
#[must_use]
pub fn renovation_rank(renovated: Option<bool>) -> f64 {
    if renovated == Some(true) { 0.20 } else { 0.0 }
}

/// A comparable's unit price brought down to the baseline.
#[must_use]
pub fn adjusted_unit_price(comparable: &Comparable) -> f64 {
    comparable.unit_price()
        * HAIRCUT
        * (1.0 - floor_rank(comparable.floor_level))
        * (1.0 - renovation_rank(comparable.renovated))
}

/// Mean baseline unit price over `comparables`.
///
/// # Errors
///
/// Returns [`ValuationError::InsufficientData`] if `comparables` is empty.
pub fn normalized_mean(comparables: &[Comparable]) -> Result<f64, ValuationError> {
    if comparables.is_empty() {
        return Err(ValuationError::InsufficientData {
            message: "no comparables to normalize".to_string(),
        });
    }

    #[allow(clippy::cast_precision_loss)]
    let n = comparables.len() as f64;
    let mean = comparables.iter().map(adjusted_unit_price).sum::<f64>() / n;

    log::debug!(
        "Normalized mean {mean:.2}/sqm over {} comparable(s)",
        comparables.len()
    );

    Ok(mean)
}

/// Prices `subject` from a baseline unit price.
#[must_use]
pub fn estimate_value(normalized_mean: f64, subject: &Subject) -> f64 {
    let value = normalized_mean
        * subject.area
        * (1.0 + floor_rank(subject.floor_level))
        * (1.0 + renovation_rank(subject.renovated));

    log::debug!(
        "{}: estimated {value:.2} from {normalized_mean:.2}/sqm over {} sqm",
        subject.key(),
        subject.area
    );

    value
}
