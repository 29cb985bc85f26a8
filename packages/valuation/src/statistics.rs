//! Descriptive statistics over comparables' unit prices.

use comps_models::Comparable;
use serde::{Deserialize, Serialize};

/// Relative tolerance under which a standard deviation counts as zero.
const ZERO_STD_TOLERANCE: f64 = 1e-12;

/// Summary of a comparable set's price per square metre.
///
/// Every figure except `count` is absent for an empty set. `std` and
/// `z_score` additionally need at least two comparables whose unit prices
/// are not all identical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparableStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub std: Option<f64>,
    pub z_score: Option<f64>,
}

/// Computes [`ComparableStats`] for `comparables`, placing the subject's
/// own unit price on the resulting distribution.
#[must_use]
pub fn describe(comparables: &[Comparable], subject_unit_price: f64) -> ComparableStats {
    let mut prices: Vec<f64> = comparables
        .iter()
        .filter(|c| c.area > 0.0)
        .map(Comparable::unit_price)
        .filter(|p| p.is_finite())
        .collect();

    let count = prices.len();
    if count == 0 {
        return ComparableStats::default();
    }

    prices.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss)]
    let n = count as f64;
    let mean = prices.iter().sum::<f64>() / n;
    let median = if count % 2 == 1 {
        prices[count / 2]
    } else {
        f64::midpoint(prices[count / 2 - 1], prices[count / 2])
    };

    let std = (count >= 2)
        .then(|| {
            let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / (n - 1.0);
            variance.sqrt()
        })
        .filter(|std| *std > ZERO_STD_TOLERANCE * mean.abs().max(1.0));

    let z_score = std
        .filter(|_| subject_unit_price.is_finite())
        .map(|std| (subject_unit_price - mean) / std);

    ComparableStats {
        count,
        mean: Some(mean),
        median: Some(median),
        min: prices.first().copied(),
        max: prices.last().copied(),
        std,
        z_score,
    }
}
