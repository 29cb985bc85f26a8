//! Append-only `DuckDB` comparison store.

use std::path::Path;

use chrono::{DateTime, Utc};
use comps_models::ComparisonResult;
use duckdb::{Connection, params};

use crate::DbError;

/// Receives every comparable set fetched for a subject.
pub trait ComparisonStore: Send {
    /// Appends `result`, creating the schema on first use. Returns the
    /// number of comparable rows written.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the rows cannot be written.
    fn append(&mut self, result: &ComparisonResult) -> Result<usize, DbError>;
}

/// [`ComparisonStore`] backed by a `DuckDB` file.
pub struct DuckDbComparisonStore {
    conn: Connection,
}

impl DuckDbComparisonStore {
    /// Opens (or creates) the store at `path` and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        create_schema(&conn)?;

        log::debug!("Opened comparison store at {}", path.display());

        Ok(Self { conn })
    }

    /// Opens a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Row counts of the `comparisons` and `comparison_results` tables.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if either count query fails.
    pub fn row_counts(&self) -> Result<(u64, u64), DbError> {
        let count = |table: &str| -> Result<u64, DbError> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
            Ok(u64::try_from(n).unwrap_or_default())
        };
        Ok((count("comparisons")?, count("comparison_results")?))
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS comparisons (
            subject_id TEXT NOT NULL,
            source_tag TEXT NOT NULL,
            portfolio_tag TEXT NOT NULL,
            fetched_at TIMESTAMPTZ NOT NULL,
            latitude DOUBLE NOT NULL,
            longitude DOUBLE NOT NULL,
            area DOUBLE NOT NULL,
            price DOUBLE NOT NULL,
            unit_price DOUBLE NOT NULL,
            floor_level INTEGER,
            renovated BOOLEAN,
            source_url TEXT
        );

        CREATE TABLE IF NOT EXISTS comparison_results (
            subject_id TEXT NOT NULL,
            source_tag TEXT NOT NULL,
            portfolio_tag TEXT NOT NULL,
            fetched_at TIMESTAMPTZ NOT NULL,
            comparable_count BIGINT NOT NULL,
            mean_unit_price DOUBLE,
            median_unit_price DOUBLE,
            min_unit_price DOUBLE,
            max_unit_price DOUBLE,
            std_unit_price DOUBLE,
            z_score DOUBLE,
            radius_used DOUBLE NOT NULL,
            normalized_mean DOUBLE,
            estimated_value DOUBLE
        );",
    )?;
    Ok(())
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f+00").to_string()
}

impl ComparisonStore for DuckDbComparisonStore {
    fn append(&mut self, result: &ComparisonResult) -> Result<usize, DbError> {
        let key = &result.subject;
        let fetched_at = timestamp(&result.fetched_at);

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO comparisons (
                    subject_id, source_tag, portfolio_tag, fetched_at,
                    latitude, longitude, area, price, unit_price,
                    floor_level, renovated, source_url
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for comparable in &result.comparables {
                stmt.execute(params![
                    key.unique_id,
                    key.source_tag,
                    key.portfolio_tag,
                    fetched_at,
                    comparable.location.lat,
                    comparable.location.lon,
                    comparable.area,
                    comparable.price,
                    comparable.unit_price(),
                    comparable.floor_level,
                    comparable.renovated,
                    comparable.source_url,
                ])?;
            }

            tx.execute(
                "INSERT INTO comparison_results (
                    subject_id, source_tag, portfolio_tag, fetched_at,
                    comparable_count, mean_unit_price, median_unit_price,
                    min_unit_price, max_unit_price, std_unit_price, z_score,
                    radius_used, normalized_mean, estimated_value
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    key.unique_id,
                    key.source_tag,
                    key.portfolio_tag,
                    fetched_at,
                    i64::try_from(result.count).unwrap_or(i64::MAX),
                    result.mean,
                    result.median,
                    result.min,
                    result.max,
                    result.std,
                    result.z_score,
                    result.radius_used,
                    result.normalized_mean,
                    result.estimated_value,
                ],
            )?;
        }
        tx.commit()?;

        log::debug!(
            "Stored {} comparable(s) for {key}",
            result.comparables.len()
        );

        Ok(result.comparables.len())
    }
}
