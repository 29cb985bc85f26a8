//! Geocoding pre-pass.
//!
//! Rows that carry an address but no location are resolved through a
//! [`Geocoder`] before enrichment. The dataset is persisted after every
//! resolved row, so an interrupted pass resumes where it stopped.

use std::sync::Arc;

use comps_dataset::{Dataset, DatasetSink};
use comps_geo::{GeoError, Geocoder};
use comps_source::progress::{ProgressCallback, null_progress};

use crate::EnrichError;

/// Counters of one geocoding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeocodeReport {
    /// Rows that received coordinates.
    pub resolved: usize,
    /// Rows whose address had no match.
    pub not_found: usize,
    /// Rows whose lookup failed for another reason.
    pub failed: usize,
    /// Rows that already had a location or have no address.
    pub skipped: usize,
}

/// Resolves missing locations in `dataset`, at most `limit` lookups.
///
/// Stops early if the geocoder reports rate limiting.
///
/// # Errors
///
/// Returns [`EnrichError`] if the address column is missing or the
/// dataset cannot be persisted.
pub async fn geocode_missing<G: Geocoder, K: DatasetSink>(
    dataset: &mut Dataset,
    geocoder: &mut G,
    sink: &mut K,
    limit: Option<usize>,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<GeocodeReport, EnrichError> {
    dataset.validate_for_geocoding()?;

    let progress = progress.unwrap_or_else(null_progress);
    let address_column = dataset.columns().address.clone();
    let mut report = GeocodeReport::default();

    progress.set_total(u64::try_from(dataset.len()).unwrap_or(u64::MAX));

    for row in 0..dataset.len() {
        progress.inc(1);

        if let Some(limit) = limit
            && report.resolved + report.not_found + report.failed >= limit
        {
            log::info!("Reached limit of {limit} lookup(s), stopping");
            break;
        }

        let has_location = match dataset.location(row) {
            Ok(location) => location.is_some(),
            Err(e) => {
                log::warn!("Row {}: keeping unparseable location, {e}", row + 1);
                true
            }
        };
        let Some(address) = dataset
            .get(row, &address_column)
            .filter(|_| !has_location)
            .map(str::to_string)
        else {
            report.skipped += 1;
            continue;
        };

        progress.set_message(address.clone());

        match geocoder.resolve(&address).await {
            Ok(point) => {
                log::debug!("Row {}: '{address}' -> {point}", row + 1);
                dataset.set_location(row, point);
                sink.persist(dataset)?;
                report.resolved += 1;
            }
            Err(GeoError::NotFound { .. }) => {
                log::warn!("Row {}: no match for '{address}'", row + 1);
                report.not_found += 1;
            }
            Err(GeoError::RateLimited) => {
                log::error!("Geocoder rate limit hit, stopping");
                report.failed += 1;
                break;
            }
            Err(e) => {
                log::warn!("Row {}: geocoding '{address}' failed: {e}", row + 1);
                report.failed += 1;
            }
        }
    }

    sink.persist(dataset)?;

    log::info!(
        "Geocoding: {} resolved, {} not found, {} failed, {} skipped",
        report.resolved,
        report.not_found,
        report.failed,
        report.skipped
    );
    progress.finish(format!("{} resolved", report.resolved));

    Ok(report)
}
