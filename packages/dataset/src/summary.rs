//! Names of the columns written back by enrichment.

pub const COMPARISON_COUNT: &str = "comparison_count";
pub const COMPARISON_MEAN: &str = "comparison_mean";
pub const COMPARISON_MEDIAN: &str = "comparison_median";
pub const COMPARISON_MIN: &str = "comparison_min";
pub const COMPARISON_MAX: &str = "comparison_max";
pub const COMPARISON_STD: &str = "comparison_std";
pub const COMPARISON_Z_SCORE: &str = "comparison_z_score";
pub const SEARCH_RADIUS: &str = "search_radius_m";
pub const NORMALIZED_MEAN: &str = "normalized_mean";
pub const ESTIMATED_VALUE: &str = "estimated_value";
pub const REFERENCE_URLS: &str = "reference_urls";
pub const UNIT_PRICE: &str = "unit_price";

/// Summary columns in the order they are appended to a dataset. The
/// enrichment timestamp column comes from the [`crate::ColumnMap`].
pub const SUMMARY_COLUMNS: &[&str] = &[
    COMPARISON_COUNT,
    COMPARISON_MEAN,
    COMPARISON_MEDIAN,
    COMPARISON_MIN,
    COMPARISON_MAX,
    COMPARISON_STD,
    COMPARISON_Z_SCORE,
    SEARCH_RADIUS,
    NORMALIZED_MEAN,
    ESTIMATED_VALUE,
    REFERENCE_URLS,
    UNIT_PRICE,
];

/// Separator between URLs in the reference column.
pub const URL_SEPARATOR: &str = " | ";
