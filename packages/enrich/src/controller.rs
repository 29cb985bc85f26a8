//! Batch enrichment controller.
//!
//! Walks the dataset in source order, strictly one subject at a time:
//!
//! 1. Rows that cannot be parsed are skipped with a warning.
//! 2. Rows already stamped `enriched_at`, and keys already seen in this
//!    run, are skipped without touching the marketplace.
//! 3. Everything else goes through [`adaptive_search`], statistics and
//!    valuation. The comparable set is appended to the comparison store and
//!    only then is the summary written onto the row.
//!
//! The dataset is persisted after every row and once more when the run
//! ends, whether it completed, was blocked or failed. A failure on one
//! subject therefore never loses the subjects completed before it.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use comps_database::ComparisonStore;
use comps_dataset::{Dataset, DatasetSink};
use comps_models::{ComparisonResult, Subject};
use comps_source::ListingSource;
use comps_source::progress::{ProgressCallback, null_progress};
use comps_valuation::{ValuationError, describe, estimate_value, normalized_mean};
use strum_macros::AsRefStr;

use crate::EnrichError;
use crate::search::{SearchOutcome, SearchParams, adaptive_search};

/// How a batch run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum BatchStatus {
    /// Every row was visited (or the limit was reached).
    Completed,
    /// The marketplace refused service; remaining rows were not visited.
    Blocked,
}

/// Counters of one batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Subjects searched and written back.
    pub processed: usize,
    /// Rows skipped as already enriched or duplicated.
    pub skipped: usize,
    /// Rows that could not be parsed into a subject.
    pub invalid: usize,
    /// Processed subjects for which no comparable was found.
    pub without_comparables: usize,
    /// Processed subjects that received no estimated value.
    pub without_valuation: usize,
    pub status: BatchStatus,
}

impl Default for BatchReport {
    fn default() -> Self {
        Self {
            processed: 0,
            skipped: 0,
            invalid: 0,
            without_comparables: 0,
            without_valuation: 0,
            status: BatchStatus::Completed,
        }
    }
}

/// Run-wide options.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchOptions {
    pub params: SearchParams,
    /// Maximum number of subjects to process in this run.
    pub limit: Option<usize>,
}

enum SubjectOutcome {
    Enriched(ComparisonResult),
    Blocked,
}

/// Drives enrichment of a dataset against one listing source.
///
/// The controller owns the source for the whole run, so its session and
/// pacing state are never shared.
pub struct BatchController<S, C, K> {
    source: S,
    store: C,
    sink: K,
    options: BatchOptions,
    progress: Arc<dyn ProgressCallback>,
}

impl<S: ListingSource, C: ComparisonStore, K: DatasetSink> BatchController<S, C, K> {
    #[must_use]
    pub fn new(source: S, store: C, sink: K, options: BatchOptions) -> Self {
        Self {
            source,
            store,
            sink,
            options,
            progress: null_progress(),
        }
    }

    /// Reports per-row progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub const fn store(&self) -> &C {
        &self.store
    }

    #[must_use]
    pub const fn sink(&self) -> &K {
        &self.sink
    }

    /// Enriches `dataset` in place.
    ///
    /// Column presence and search parameters are checked before any row
    /// is touched. A blocked marketplace ends the run early with
    /// [`BatchStatus::Blocked`]; the dataset is persisted in every case.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] if validation fails, or if processing a
    /// subject or persisting the dataset fails. In the latter case the
    /// dataset is still persisted with every subject completed so far.
    pub async fn run(&mut self, dataset: &mut Dataset) -> Result<BatchReport, EnrichError> {
        dataset.validate_for_enrichment()?;
        self.options.params.validate()?;

        let outcome = self.process(dataset).await;
        let persisted = self.sink.persist(dataset);

        match (outcome, persisted) {
            (Ok(report), Ok(())) => {
                log::info!(
                    "Batch {}: {} processed, {} skipped, {} invalid, {} without comparables, \
                     {} without valuation",
                    report.status.as_ref(),
                    report.processed,
                    report.skipped,
                    report.invalid,
                    report.without_comparables,
                    report.without_valuation
                );
                self.progress.finish(format!(
                    "{} processed, {} skipped",
                    report.processed, report.skipped
                ));
                Ok(report)
            }
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), persisted) => {
                if let Err(pe) = persisted {
                    log::error!("Final dataset persist failed: {pe}");
                }
                self.progress.finish("failed".to_string());
                Err(e)
            }
        }
    }

    async fn process(&mut self, dataset: &mut Dataset) -> Result<BatchReport, EnrichError> {
        let subjects = dataset.subjects();
        let mut report = BatchReport::default();
        let mut seen = BTreeSet::new();

        self.progress
            .set_total(u64::try_from(subjects.len()).unwrap_or(u64::MAX));

        for (row, parsed) in subjects.into_iter().enumerate() {
            self.progress.inc(1);

            let subject = match parsed {
                Ok(subject) => subject,
                Err(e) => {
                    log::warn!("Row {}: skipped, {e}", row + 1);
                    report.invalid += 1;
                    self.sink.persist(dataset)?;
                    continue;
                }
            };

            let key = subject.key();
            if subject.enriched_at.is_some() || seen.contains(&key) {
                log::debug!("Row {}: {key} already enriched, skipping", row + 1);
                report.skipped += 1;
                self.sink.persist(dataset)?;
                continue;
            }

            if let Some(limit) = self.options.limit
                && report.processed >= limit
            {
                log::info!("Reached limit of {limit} subject(s), stopping");
                break;
            }

            seen.insert(key.clone());
            self.progress.set_message(key.to_string());
            log::info!("Row {}: enriching {key}", row + 1);

            let result = match self.enrich_subject(&subject).await {
                Ok(SubjectOutcome::Enriched(result)) => result,
                Ok(SubjectOutcome::Blocked) => {
                    log::error!(
                        "Marketplace blocked while processing {key}; stopping the batch"
                    );
                    report.status = BatchStatus::Blocked;
                    break;
                }
                Err(e) => {
                    log::error!("Row {}: failed to enrich {key}: {e}", row + 1);
                    return Err(e);
                }
            };

            report.processed += 1;
            if result.count == 0 {
                report.without_comparables += 1;
            }
            if result.estimated_value.is_none() {
                report.without_valuation += 1;
            }

            dataset.apply_summary(row, &result, subject.unit_price());
            self.sink.persist(dataset)?;
        }

        Ok(report)
    }

    async fn enrich_subject(&mut self, subject: &Subject) -> Result<SubjectOutcome, EnrichError> {
        let params = self.options.params;
        let (comparables, radius_used) =
            match adaptive_search(&mut self.source, subject.location, subject.area, &params)
                .await?
            {
                SearchOutcome::Found {
                    comparables,
                    radius_m,
                    ..
                } => (comparables, radius_m),
                SearchOutcome::Blocked { .. } => return Ok(SubjectOutcome::Blocked),
            };

        let stats = describe(&comparables, subject.unit_price());
        let normalized = match normalized_mean(&comparables) {
            Ok(mean) => Some(mean),
            Err(ValuationError::InsufficientData { message }) => {
                log::info!("{}: no valuation ({message})", subject.key());
                None
            }
        };
        let estimated_value = normalized.map(|mean| estimate_value(mean, subject));

        let result = ComparisonResult {
            subject: subject.key(),
            count: stats.count,
            mean: stats.mean,
            median: stats.median,
            min: stats.min,
            max: stats.max,
            std: stats.std,
            z_score: stats.z_score,
            radius_used,
            normalized_mean: normalized,
            estimated_value,
            fetched_at: Utc::now(),
            comparables,
        };

        self.store.append(&result)?;

        Ok(SubjectOutcome::Enriched(result))
    }
}
