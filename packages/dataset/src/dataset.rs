//! In-memory subject table.

use std::io::{Read, Write};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use comps_models::{ComparisonResult, Point, Subject, parse_floor_label, parse_renovated};

use crate::columns::ColumnMap;
use crate::DatasetError;
use crate::summary::{self, SUMMARY_COLUMNS, URL_SEPARATOR};

/// Why a row cannot be turned into a [`Subject`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    /// A required cell is empty.
    #[error("'{column}' is empty")]
    Missing {
        /// Column name.
        column: String,
    },

    /// A cell could not be parsed or is out of range.
    #[error("'{column}' has invalid value '{value}'")]
    Invalid {
        /// Column name.
        column: String,
        /// Offending cell contents.
        value: String,
    },
}

/// A table of string cells with a header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    columns: ColumnMap,
}

impl Dataset {
    /// Builds a dataset from headers and rows. Short rows are padded and
    /// cells beyond the header width are dropped.
    #[must_use]
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>, columns: ColumnMap) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(index, mut row)| {
                if row.len() > width {
                    log::warn!(
                        "Row {}: dropping {} cell(s) beyond the {width} header column(s)",
                        index + 1,
                        row.len() - width
                    );
                }
                row.resize(width, String::new());
                row
            })
            .collect();
        Self {
            headers,
            rows,
            columns,
        }
    }

    /// Reads a CSV file.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Io`] if the file cannot be opened, or
    /// [`DatasetError::Csv`] if it is not valid CSV.
    pub fn from_csv_path(path: &Path, columns: ColumnMap) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path).map_err(|e| DatasetError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let dataset = Self::from_csv_reader(file, columns).map_err(|e| DatasetError::Csv {
            path: path.display().to_string(),
            source: e,
        })?;

        log::info!(
            "Loaded {} row(s), {} column(s) from {}",
            dataset.len(),
            dataset.headers.len(),
            path.display()
        );

        Ok(dataset)
    }

    /// Reads CSV from any source.
    ///
    /// # Errors
    ///
    /// Returns [`csv::Error`] if the input is not valid CSV.
    pub fn from_csv_reader(reader: impl Read, columns: ColumnMap) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_owned())
            .collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(str::to_owned).collect());
        }

        Ok(Self::new(headers, rows, columns))
    }

    /// Writes the table as CSV.
    ///
    /// # Errors
    ///
    /// Returns [`csv::Error`] if writing fails.
    pub fn write_csv(&self, writer: impl Write) -> Result<(), csv::Error> {
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub const fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, matched case-insensitively.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Trimmed cell contents; `None` for empty cells and unknown columns.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows
            .get(row)?
            .get(index)
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
    }

    /// Writes a cell, appending the column if it does not exist yet.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn set(&mut self, row: usize, column: &str, value: String) {
        let index = self.ensure_column(column);
        self.rows[row][index] = value;
    }

    fn ensure_column(&mut self, column: &str) -> usize {
        if let Some(index) = self.column_index(column) {
            return index;
        }
        self.headers.push(column.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }

    fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.has_column(name))
            .map(|name| (*name).to_string())
            .collect()
    }

    /// Checks that every column enrichment reads is present.
    ///
    /// The location may come from the coords column or from the
    /// latitude/longitude pair.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::MissingColumns`] naming every absent column.
    pub fn validate_for_enrichment(&self) -> Result<(), DatasetError> {
        let c = &self.columns;
        let mut missing = self.missing(&[
            c.id.as_str(),
            c.source.as_str(),
            c.portfolio.as_str(),
            c.sqm.as_str(),
            c.price.as_str(),
        ]);
        if !self.has_column(&c.coords) {
            missing.extend(self.missing(&[c.lat.as_str(), c.lon.as_str()]));
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DatasetError::MissingColumns { columns: missing })
        }
    }

    /// Checks that the address column is present.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::MissingColumns`] if it is not.
    pub fn validate_for_geocoding(&self) -> Result<(), DatasetError> {
        let missing = self.missing(&[self.columns.address.as_str()]);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DatasetError::MissingColumns { columns: missing })
        }
    }

    /// Parses row `row` into a [`Subject`].
    ///
    /// # Errors
    ///
    /// Returns [`RowError`] naming the first unusable cell.
    pub fn subject(&self, row: usize) -> Result<Subject, RowError> {
        let c = &self.columns;

        let unique_id = self.required(row, &c.id)?.to_string();
        let source_tag = self.required(row, &c.source)?.to_string();
        let portfolio_tag = self.required(row, &c.portfolio)?.to_string();
        let location = self.location(row)?.ok_or_else(|| RowError::Missing {
            column: if self.has_column(&c.coords) {
                c.coords.clone()
            } else {
                format!("{}/{}", c.lat, c.lon)
            },
        })?;
        let area = self.positive(row, &c.sqm)?;
        let price = self.positive(row, &c.price)?;

        let floor_level = self.get(row, &c.level).and_then(parse_floor_label);
        let renovated = self.get(row, &c.renovated).and_then(parse_renovated);
        let enriched_at = self
            .get(row, &c.enriched_at)
            .map(|value| {
                parse_timestamp(value).ok_or_else(|| RowError::Invalid {
                    column: c.enriched_at.clone(),
                    value: value.to_string(),
                })
            })
            .transpose()?;

        Ok(Subject {
            unique_id,
            source_tag,
            portfolio_tag,
            location,
            area,
            price,
            floor_level,
            renovated,
            enriched_at,
        })
    }

    /// Every row parsed into a [`Subject`], in source order.
    #[must_use]
    pub fn subjects(&self) -> Vec<Result<Subject, RowError>> {
        (0..self.len()).map(|row| self.subject(row)).collect()
    }

    /// Location of a row, from the coords column when it is filled and
    /// from the latitude/longitude columns otherwise. `Ok(None)` when no
    /// location is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`RowError::Invalid`] for an unparseable or out-of-range
    /// coordinate.
    pub fn location(&self, row: usize) -> Result<Option<Point>, RowError> {
        let c = &self.columns;

        if let Some(value) = self.get(row, &c.coords) {
            return Point::parse_pair(value)
                .filter(in_range)
                .map(Some)
                .ok_or_else(|| RowError::Invalid {
                    column: c.coords.clone(),
                    value: value.to_string(),
                });
        }

        match (self.get(row, &c.lat), self.get(row, &c.lon)) {
            (Some(lat), Some(lon)) => {
                let pair = format!("{lat},{lon}");
                Point::parse_pair(&pair)
                    .filter(in_range)
                    .map(Some)
                    .ok_or_else(|| RowError::Invalid {
                        column: format!("{}/{}", c.lat, c.lon),
                        value: pair,
                    })
            }
            _ => Ok(None),
        }
    }

    /// Records a geocoded location, in the coords column if the dataset has
    /// one and in the latitude/longitude columns otherwise.
    pub fn set_location(&mut self, row: usize, point: Point) {
        if self.has_column(&self.columns.coords) {
            let coords = self.columns.coords.clone();
            self.set(row, &coords, format!("{},{}", point.lat, point.lon));
        } else {
            let (lat, lon) = (self.columns.lat.clone(), self.columns.lon.clone());
            self.set(row, &lat, point.lat.to_string());
            self.set(row, &lon, point.lon.to_string());
        }
    }

    /// Copies the summary of `result` onto row `row` and stamps it as
    /// enriched at `result.fetched_at`.
    pub fn apply_summary(&mut self, row: usize, result: &ComparisonResult, subject_unit_price: f64) {
        for column in SUMMARY_COLUMNS {
            self.ensure_column(column);
        }

        self.set(row, summary::COMPARISON_COUNT, result.count.to_string());
        self.set(row, summary::COMPARISON_MEAN, money(result.mean));
        self.set(row, summary::COMPARISON_MEDIAN, money(result.median));
        self.set(row, summary::COMPARISON_MIN, money(result.min));
        self.set(row, summary::COMPARISON_MAX, money(result.max));
        self.set(row, summary::COMPARISON_STD, money(result.std));
        self.set(
            row,
            summary::COMPARISON_Z_SCORE,
            result.z_score.map(|z| format!("{z:.4}")).unwrap_or_default(),
        );
        self.set(row, summary::SEARCH_RADIUS, result.radius_used.to_string());
        self.set(row, summary::NORMALIZED_MEAN, money(result.normalized_mean));
        self.set(row, summary::ESTIMATED_VALUE, money(result.estimated_value));
        self.set(
            row,
            summary::REFERENCE_URLS,
            result.reference_urls().join(URL_SEPARATOR),
        );
        self.set(row, summary::UNIT_PRICE, money(Some(subject_unit_price)));

        let enriched_at = self.columns.enriched_at.clone();
        self.set(
            row,
            &enriched_at,
            result.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }

    fn required(&self, row: usize, column: &str) -> Result<&str, RowError> {
        self.get(row, column).ok_or_else(|| RowError::Missing {
            column: column.to_string(),
        })
    }

    fn positive(&self, row: usize, column: &str) -> Result<f64, RowError> {
        let value = self.required(row, column)?;
        parse_number(value)
            .filter(|n| *n > 0.0)
            .ok_or_else(|| RowError::Invalid {
                column: column.to_string(),
                value: value.to_string(),
            })
    }
}

fn in_range(point: &Point) -> bool {
    (-90.0..=90.0).contains(&point.lat) && (-180.0..=180.0).contains(&point.lon)
}

fn money(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_default()
}

/// Parses amounts such as `"85"`, `"85.5"`, `"85,5"`, `"120.000"`,
/// `"120.000,00"` or `"€ 120,000"`. A lone separator followed by exactly
/// three digits is read as a thousands separator.
fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        // "120,000": thousands separator
        (None, Some(comma)) if cleaned.len() - comma == 4 => cleaned.replace(',', ""),
        (None, Some(_)) => cleaned.replace(',', "."),
        // "120.000" or "1.250.000": thousands separator
        (Some(dot), None) if cleaned.matches('.').count() > 1 || cleaned.len() - dot == 4 => {
            cleaned.replace('.', "")
        }
        _ => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use comps_models::{Comparable, SubjectKey};

    use super::*;

    const CSV: &str = "\
id,source,portfolio,coords,sqm,price,level,renovated,enriched_at,notes
1,bank,p1,\"37.98,23.72\",85,\"120.000,00\",3rd,yes,,keep me
2,bank,p1,,50,90000,Ισόγειο,,,
3,bank,p1,\"37.97,23.71\",0,90000,,,,
4,bank,p1,\"37.97,23.71\",40,70000,,,2024-05-01T10:00:00Z,
";

    fn load(csv: &str) -> Dataset {
        Dataset::from_csv_reader(csv.as_bytes(), ColumnMap::default()).unwrap()
    }

    fn result(comparables: usize) -> ComparisonResult {
        ComparisonResult {
            subject: SubjectKey {
                source_tag: "bank".to_string(),
                portfolio_tag: "p1".to_string(),
                unique_id: "1".to_string(),
            },
            comparables: (0..comparables)
                .map(|i| Comparable {
                    location: Point::new(37.98, 23.72),
                    area: 50.0,
                    price: 100_000.0,
                    floor_level: None,
                    renovated: None,
                    source_url: format!("https://market.test/{i}"),
                })
                .collect(),
            count: comparables,
            mean: Some(2000.0),
            median: Some(2000.0),
            min: Some(2000.0),
            max: Some(2000.0),
            std: None,
            z_score: None,
            radius_used: 225.0,
            normalized_mean: Some(1800.0),
            estimated_value: Some(153_000.0),
            fetched_at: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn parses_typed_subject() {
        let dataset = load(CSV);
        let subject = dataset.subject(0).unwrap();
        assert_eq!(subject.unique_id, "1");
        assert!((subject.area - 85.0).abs() < f64::EPSILON);
        assert!((subject.price - 120_000.0).abs() < f64::EPSILON);
        assert_eq!(subject.floor_level, Some(3));
        assert_eq!(subject.renovated, Some(true));
        assert!(subject.enriched_at.is_none());
    }

    #[test]
    fn reports_row_problems() {
        let dataset = load(CSV);
        assert_eq!(
            dataset.subject(1),
            Err(RowError::Missing {
                column: "coords".to_string()
            })
        );
        assert!(matches!(dataset.subject(2), Err(RowError::Invalid { .. })));
        assert!(dataset.subject(3).unwrap().enriched_at.is_some());
    }

    #[test]
    fn latitude_longitude_columns_are_accepted() {
        let dataset = load("id,source,portfolio,lat,lon,sqm,price\n7,s,p,37.9,23.7,60,1000\n");
        dataset.validate_for_enrichment().unwrap();
        let subject = dataset.subject(0).unwrap();
        assert!((subject.location.lat - 37.9).abs() < 1e-9);
    }

    #[test]
    fn missing_columns_are_all_named() {
        let dataset = load("id,source,sqm\n1,s,50\n");
        match dataset.validate_for_enrichment() {
            Err(DatasetError::MissingColumns { columns }) => {
                assert_eq!(columns, vec!["portfolio", "price", "lat", "lon"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn summary_appends_columns_and_keeps_original_cells() {
        let mut dataset = load(CSV);
        dataset.apply_summary(0, &result(2), 1411.76);

        assert_eq!(dataset.get(0, "notes"), Some("keep me"));
        assert_eq!(dataset.get(0, summary::COMPARISON_COUNT), Some("2"));
        assert_eq!(dataset.get(0, summary::SEARCH_RADIUS), Some("225"));
        assert_eq!(dataset.get(0, summary::ESTIMATED_VALUE), Some("153000.00"));
        assert_eq!(dataset.get(0, summary::COMPARISON_STD), None);
        assert_eq!(
            dataset.get(0, summary::REFERENCE_URLS),
            Some("https://market.test/0 | https://market.test/1")
        );
        assert_eq!(dataset.get(0, "enriched_at"), Some("2025-01-02T03:04:05Z"));
        assert_eq!(dataset.get(1, summary::COMPARISON_COUNT), None);

        // The stamp parses back, so the row is skipped next time.
        assert!(dataset.subject(0).unwrap().enriched_at.is_some());
    }

    #[test]
    fn csv_round_trip_preserves_rows() {
        let dataset = load(CSV);
        let mut out = Vec::new();
        dataset.write_csv(&mut out).unwrap();
        let reloaded = Dataset::from_csv_reader(out.as_slice(), ColumnMap::default()).unwrap();
        assert_eq!(reloaded, dataset);
    }

    #[test]
    fn set_location_prefers_coords_column() {
        let mut dataset = load(CSV);
        dataset.set_location(1, Point::new(37.5, 23.5));
        assert_eq!(dataset.get(1, "coords"), Some("37.5,23.5"));

        let mut plain = load("id,address\n1,Somewhere\n");
        plain.set_location(0, Point::new(37.5, 23.5));
        assert_eq!(plain.get(0, "lat"), Some("37.5"));
        assert_eq!(plain.get(0, "lon"), Some("23.5"));
    }

    #[test]
    fn number_formats() {
        assert_eq!(parse_number("85"), Some(85.0));
        assert_eq!(parse_number("85,5"), Some(85.5));
        assert_eq!(parse_number("120.000,00"), Some(120_000.0));
        assert_eq!(parse_number("€ 120,000"), Some(120_000.0));
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("85.5"), Some(85.5));
        assert_eq!(parse_number("120.000"), Some(120_000.0));
        assert_eq!(parse_number("1.250.000"), Some(1_250_000.0));
        assert_eq!(parse_number("1,250,000"), Some(1_250_000.0));
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn dot_grouped_price_is_read_as_thousands() {
        let dataset = Dataset::from_csv_reader(
            "id,source,portfolio,coords,sqm,price
1,bank,p1,\"37.98,23.72\",60,120.000
"
                .as_bytes(),
            ColumnMap::default(),
        )
        .unwrap();
        let subject = dataset.subject(0).unwrap();
        assert!((subject.price - 120_000.0).abs() < f64::EPSILON);
        assert!((subject.unit_price() - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn overlong_rows_are_truncated_to_header_width() {
        let mut dataset =
            Dataset::from_csv_reader("id,sqm
1,50,stray
2,60
".as_bytes(), ColumnMap::default())
                .unwrap();
        dataset.set(0, "unit_price", "2000.00".to_string());

        assert_eq!(dataset.get(0, "unit_price"), Some("2000.00"));
        assert_eq!(dataset.get(0, "sqm"), Some("50"));
        let mut out = Vec::new();
        dataset.write_csv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "id,sqm,unit_price\n1,50,2000.00\n2,60,\n"
        );
    }
}
