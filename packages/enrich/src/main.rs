#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for comparable-sales enrichment.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use comps_cli_utils::{IndicatifProgress, init_logger};
use comps_database::{DuckDbComparisonStore, paths};
use comps_dataset::{ColumnMap, CsvDatasetSink, Dataset};
use comps_enrich::controller::{BatchController, BatchOptions, BatchStatus};
use comps_enrich::geocode::geocode_missing;
use comps_enrich::search::SearchParams;
use comps_geo::nominatim::{DEFAULT_BASE_URL, NominatimGeocoder};
use comps_geo::rectangle::rectangle_from_point;
use comps_models::Point;
use comps_source::marketplace::MarketplaceSource;
use comps_source::registry::{MARKETPLACE_ENV, all_marketplaces, select_marketplace};

const GEOCODER_USER_AGENT: &str = "comps-enrich/0.1 (comparable-sales valuation)";

#[derive(Parser)]
#[command(
    name = "comps_enrich",
    about = "Comparable-sales valuation of property datasets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find comparables for every subject row and write valuations back
    Enrich {
        /// Subject dataset (CSV)
        #[arg(long)]
        input: PathBuf,
        /// Enriched dataset; defaults to `<input>_enriched.csv`. An existing
        /// file is resumed instead of starting over from the input.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Comparison store (`DuckDB`); defaults to `data/comparisons.duckdb`
        #[arg(long)]
        store: Option<PathBuf>,
        /// Marketplace id (see `marketplaces`)
        #[arg(long, env = MARKETPLACE_ENV)]
        marketplace: Option<String>,
        /// TOML file overriding dataset column names
        #[arg(long)]
        columns: Option<PathBuf>,
        /// Radius of the first search, in metres
        #[arg(long)]
        base_radius: Option<f64>,
        /// Radius multiplier between searches
        #[arg(long)]
        growth_factor: Option<f64>,
        /// Maximum searches per subject
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Comparables that end the search early
        #[arg(long)]
        min_comparables: Option<usize>,
        /// Search +/- this many sqm around the subject's area instead of
        /// the fixed 30-200 sqm band
        #[arg(long)]
        area_tolerance: Option<f64>,
        /// Maximum number of subjects to process in this run
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Resolve addresses of rows without coordinates (Nominatim)
    Geocode {
        /// Dataset (CSV)
        #[arg(long)]
        input: PathBuf,
        /// Output dataset; defaults to updating the input in place
        #[arg(long)]
        output: Option<PathBuf>,
        /// TOML file overriding dataset column names
        #[arg(long)]
        columns: Option<PathBuf>,
        /// Nominatim search endpoint
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        nominatim_url: String,
        /// Comma-separated ISO country codes to restrict matches to
        #[arg(long)]
        country_codes: Option<String>,
        /// Minimum milliseconds between lookups (the public instance allows
        /// one per second)
        #[arg(long, default_value_t = 1000)]
        rate_limit_ms: u64,
        /// Maximum number of lookups
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the search rectangle for a point and radius
    Rectangle {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Radius in metres
        #[arg(long)]
        radius: f64,
    },
    /// List configured marketplaces
    Marketplaces,
}

fn load_columns(path: Option<&Path>) -> Result<ColumnMap, comps_dataset::DatasetError> {
    path.map_or_else(|| Ok(ColumnMap::default()), ColumnMap::from_toml_file)
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}_enriched.csv"))
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Enrich {
            input,
            output,
            store,
            marketplace,
            columns,
            base_radius,
            growth_factor,
            max_iterations,
            min_comparables,
            area_tolerance,
            limit,
        } => {
            let defaults = SearchParams::default();
            let params = SearchParams {
                base_radius: base_radius.unwrap_or(defaults.base_radius),
                growth_factor: growth_factor.unwrap_or(defaults.growth_factor),
                max_iterations: max_iterations.unwrap_or(defaults.max_iterations),
                min_comparables: min_comparables.unwrap_or(defaults.min_comparables),
                area_tolerance,
                ..defaults
            };
            params.validate()?;

            let output = output.unwrap_or_else(|| default_output(&input));
            let load_from = if output.exists() && output != input {
                log::info!("Resuming from existing output {}", output.display());
                output.as_path()
            } else {
                input.as_path()
            };

            let mut dataset = Dataset::from_csv_path(load_from, load_columns(columns.as_deref())?)?;
            dataset.validate_for_enrichment()?;

            let config = select_marketplace(marketplace.as_deref())
                .ok_or("No usable marketplace configured")?;
            log::info!("Using marketplace {} ({})", config.name, config.base_url);
            let source = MarketplaceSource::connect(config)?;

            let store_path = store.unwrap_or_else(paths::comparisons_db_path);
            let store = DuckDbComparisonStore::open(&store_path)?;
            let sink = CsvDatasetSink::new(&output);

            let start = Instant::now();
            let mut controller =
                BatchController::new(source, store, sink, BatchOptions { params, limit })
                    .with_progress(IndicatifProgress::rows_bar(&multi, "Enriching"));
            let report = controller.run(&mut dataset).await?;

            match report.status {
                BatchStatus::Completed => log::info!(
                    "Enrichment complete in {:.1}s: {} subject(s) processed, written to {}",
                    start.elapsed().as_secs_f64(),
                    report.processed,
                    output.display()
                ),
                BatchStatus::Blocked => log::error!(
                    "Marketplace blocked the run after {} subject(s); progress saved to {}. \
                     Re-run later with --input {} to continue.",
                    report.processed,
                    output.display(),
                    output.display()
                ),
            }
            log::info!(
                "Comparison store {} now holds {} comparable row(s)",
                store_path.display(),
                controller.store().row_counts()?.0
            );
            log::debug!(
                "Dataset {} written {} time(s)",
                controller.sink().path().display(),
                controller.sink().writes()
            );
        }
        Commands::Geocode {
            input,
            output,
            columns,
            nominatim_url,
            country_codes,
            rate_limit_ms,
            limit,
        } => {
            let output = output.unwrap_or_else(|| input.clone());
            let load_from = if output.exists() { &output } else { &input };
            let mut dataset = Dataset::from_csv_path(load_from, load_columns(columns.as_deref())?)?;

            let mut geocoder = NominatimGeocoder::new(&nominatim_url, GEOCODER_USER_AGENT)?
                .with_rate_limit(Duration::from_millis(rate_limit_ms));
            if let Some(codes) = country_codes.as_deref() {
                geocoder = geocoder.with_country_codes(codes);
            }
            let mut sink = CsvDatasetSink::new(&output);

            let report = geocode_missing(
                &mut dataset,
                &mut geocoder,
                &mut sink,
                limit,
                Some(IndicatifProgress::rows_bar(&multi, "Geocoding")),
            )
            .await?;

            log::info!(
                "Geocoded {} row(s) into {}",
                report.resolved,
                output.display()
            );
        }
        Commands::Rectangle { lat, lon, radius } => {
            let rect = rectangle_from_point(Point::new(lat, lon), radius)?;
            println!("south-west: {}", rect.south_west());
            println!("north-east: {}", rect.north_east());
            println!("{rect}");
        }
        Commands::Marketplaces => {
            let marketplaces = all_marketplaces();
            println!("{:<16} {:<8} NAME", "ID", "ENABLED");
            println!("{}", "-".repeat(50));
            for market in &marketplaces {
                println!(
                    "{:<16} {:<8} {} ({})",
                    market.id, market.enabled, market.name, market.base_url
                );
            }
        }
    }

    Ok(())
}
