//! Adaptive radius search.
//!
//! Starting at `base_radius`, each iteration queries the listing source
//! with the rectangle around the subject and grows the radius by
//! `growth_factor` until at least `min_comparables` listings come back or
//! `max_iterations` queries have been made. The radius reported is the one
//! the returned set was fetched with, never the next unused one.

use comps_geo::rectangle::rectangle_from_point;
use comps_models::{Comparable, Point};
use comps_source::{FetchOutcome, ListingSource};

use crate::EnrichError;

/// Tuning of the expanding search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    /// Radius of the first query, in metres.
    pub base_radius: f64,
    /// Multiplier applied to the radius after an insufficient result.
    pub growth_factor: f64,
    /// Maximum number of queries per subject.
    pub max_iterations: u32,
    /// Comparable count that ends the search early.
    pub min_comparables: usize,
    /// Half-width of the area range around the subject's area. When absent
    /// the fallback band is used.
    pub area_tolerance: Option<f64>,
    /// Lower bound of the fallback area band.
    pub fallback_min_area: f64,
    /// Upper bound of the fallback area band.
    pub fallback_max_area: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            base_radius: 100.0,
            growth_factor: 1.5,
            max_iterations: 4,
            min_comparables: 5,
            area_tolerance: None,
            fallback_min_area: 30.0,
            fallback_max_area: 200.0,
        }
    }
}

impl SearchParams {
    /// Checks that the parameters describe a terminating, non-shrinking
    /// search.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::InvalidArgument`] naming the first bad value.
    pub fn validate(&self) -> Result<(), EnrichError> {
        let invalid = |message: String| Err(EnrichError::InvalidArgument { message });

        if !self.base_radius.is_finite() || self.base_radius <= 0.0 {
            return invalid(format!("base radius must be > 0, got {}", self.base_radius));
        }
        if !self.growth_factor.is_finite() || self.growth_factor < 1.0 {
            return invalid(format!(
                "growth factor must be >= 1, got {}",
                self.growth_factor
            ));
        }
        if self.max_iterations == 0 {
            return invalid("max iterations must be >= 1".to_string());
        }
        if let Some(tolerance) = self.area_tolerance
            && (!tolerance.is_finite() || tolerance < 0.0)
        {
            return invalid(format!("area tolerance must be >= 0, got {tolerance}"));
        }
        if !(0.0..=self.fallback_max_area).contains(&self.fallback_min_area) {
            return invalid(format!(
                "fallback area band [{}, {}] is not ordered",
                self.fallback_min_area, self.fallback_max_area
            ));
        }
        Ok(())
    }

    /// Area range queried for a subject of `area` square metres. The lower
    /// bound is clamped at zero.
    #[must_use]
    pub fn area_band(&self, area: f64) -> (f64, f64) {
        self.area_tolerance.map_or(
            (self.fallback_min_area, self.fallback_max_area),
            |tolerance| ((area - tolerance).max(0.0), area + tolerance),
        )
    }
}

/// Result of one subject's search.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum SearchOutcome {
    /// The search ended normally; `comparables` may be empty.
    Found {
        comparables: Vec<Comparable>,
        /// Radius the comparables were fetched with.
        radius_m: f64,
        /// Queries made.
        iterations: u32,
    },
    /// The listing source refused service.
    Blocked {
        /// Radius of the refused query.
        radius_m: f64,
        /// Queries made, including the refused one.
        iterations: u32,
    },
}

/// Runs the expanding search around `center` for a subject of `area`
/// square metres.
///
/// # Errors
///
/// Returns [`EnrichError`] if the parameters are invalid, the rectangle
/// cannot be computed or the source rejects the request.
pub async fn adaptive_search<S: ListingSource>(
    source: &mut S,
    center: Point,
    area: f64,
    params: &SearchParams,
) -> Result<SearchOutcome, EnrichError> {
    params.validate()?;

    let (min_area, max_area) = params.area_band(area);
    let mut radius = params.base_radius;
    let mut iteration = 0u32;

    loop {
        let rect = rectangle_from_point(center, radius)?;
        let outcome = source.search(&rect, min_area, max_area).await?;
        iteration += 1;

        let comparables = match outcome {
            FetchOutcome::Blocked => {
                return Ok(SearchOutcome::Blocked {
                    radius_m: radius,
                    iterations: iteration,
                });
            }
            FetchOutcome::Comparables(comparables) => comparables,
        };

        log::debug!(
            "Radius {radius:.0}m around {center}: {} comparable(s)",
            comparables.len()
        );

        if comparables.len() >= params.min_comparables || iteration >= params.max_iterations {
            return Ok(SearchOutcome::Found {
                comparables,
                radius_m: radius,
                iterations: iteration,
            });
        }

        radius *= params.growth_factor;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use comps_models::GeoRectangle;
    use comps_source::SourceError;

    use super::*;

    /// Answers each search with the next scripted outcome and records the
    /// queries it received.
    struct ScriptedSource {
        script: VecDeque<FetchOutcome>,
        queries: Vec<(GeoRectangle, f64, f64)>,
    }

    impl ScriptedSource {
        fn new(script: Vec<FetchOutcome>) -> Self {
            Self {
                script: script.into(),
                queries: Vec::new(),
            }
        }
    }

    impl ListingSource for ScriptedSource {
        async fn search(
            &mut self,
            rect: &GeoRectangle,
            min_area: f64,
            max_area: f64,
        ) -> Result<FetchOutcome, SourceError> {
            self.queries.push((*rect, min_area, max_area));
            Ok(self
                .script
                .pop_front()
                .unwrap_or(FetchOutcome::Comparables(Vec::new())))
        }
    }

    fn found(n: usize) -> FetchOutcome {
        FetchOutcome::Comparables(
            (0..n)
                .map(|i| Comparable {
                    location: Point::new(37.98, 23.72),
                    area: 50.0,
                    price: 100_000.0,
                    floor_level: None,
                    renovated: None,
                    source_url: format!("https://market.test/{i}"),
                })
                .collect(),
        )
    }

    const CENTER: Point = Point::new(37.9838, 23.7275);

    fn params() -> SearchParams {
        SearchParams {
            area_tolerance: Some(10.0),
            ..SearchParams::default()
        }
    }

    fn rect_width(rect: &GeoRectangle) -> f64 {
        rect.max_lat - rect.min_lat
    }

    #[tokio::test]
    async fn stops_as_soon_as_enough_comparables() {
        let mut source = ScriptedSource::new(vec![found(2), found(6), found(9)]);
        let outcome = adaptive_search(&mut source, CENTER, 50.0, &params())
            .await
            .unwrap();

        match outcome {
            SearchOutcome::Found {
                comparables,
                radius_m,
                iterations,
            } => {
                assert_eq!(comparables.len(), 6);
                assert!((radius_m - 150.0).abs() < 1e-9);
                assert_eq!(iterations, 2);
            }
            SearchOutcome::Blocked { .. } => panic!("unexpected Blocked"),
        }
        assert_eq!(source.queries.len(), 2);
    }

    #[tokio::test]
    async fn returns_last_used_radius_after_max_iterations() {
        let mut source = ScriptedSource::new(vec![found(0), found(1), found(1), found(3)]);
        let p = params();
        let outcome = adaptive_search(&mut source, CENTER, 50.0, &p).await.unwrap();

        let SearchOutcome::Found {
            comparables,
            radius_m,
            iterations,
        } = outcome
        else {
            panic!("unexpected Blocked");
        };
        assert_eq!(comparables.len(), 3);
        assert_eq!(iterations, p.max_iterations);
        let expected = p.base_radius * p.growth_factor.powi(3);
        assert!((radius_m - expected).abs() < 1e-9);
        assert_eq!(source.queries.len(), 4);
    }

    #[tokio::test]
    async fn rectangles_grow_monotonically() {
        let mut source = ScriptedSource::new(Vec::new());
        let _ = adaptive_search(&mut source, CENTER, 50.0, &params())
            .await
            .unwrap();

        let widths: Vec<f64> = source.queries.iter().map(|(r, _, _)| rect_width(r)).collect();
        assert_eq!(widths.len(), 4);
        assert!(widths.windows(2).all(|w| w[0] < w[1]));
        assert!(source.queries.iter().all(|(r, _, _)| r.contains(CENTER)));
    }

    #[tokio::test]
    async fn blocked_stops_the_search() {
        let mut source = ScriptedSource::new(vec![found(1), FetchOutcome::Blocked, found(9)]);
        let outcome = adaptive_search(&mut source, CENTER, 50.0, &params())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SearchOutcome::Blocked {
                radius_m: 150.0,
                iterations: 2
            }
        );
        assert_eq!(source.queries.len(), 2);
    }

    #[tokio::test]
    async fn area_range_is_clamped_at_zero() {
        let mut source = ScriptedSource::new(vec![found(5)]);
        let _ = adaptive_search(&mut source, CENTER, 5.0, &params())
            .await
            .unwrap();

        let (_, min_area, max_area) = source.queries[0];
        assert!(min_area.abs() < f64::EPSILON);
        assert!((max_area - 15.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn fallback_band_without_tolerance() {
        let mut source = ScriptedSource::new(vec![found(5)]);
        let _ = adaptive_search(&mut source, CENTER, 85.0, &SearchParams::default())
            .await
            .unwrap();

        let (_, min_area, max_area) = source.queries[0];
        assert!((min_area - 30.0).abs() < f64::EPSILON);
        assert!((max_area - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_shrinking_or_empty_searches() {
        let bad = [
            SearchParams {
                base_radius: 0.0,
                ..SearchParams::default()
            },
            SearchParams {
                growth_factor: 0.9,
                ..SearchParams::default()
            },
            SearchParams {
                max_iterations: 0,
                ..SearchParams::default()
            },
            SearchParams {
                fallback_min_area: 300.0,
                ..SearchParams::default()
            },
        ];
        for params in bad {
            assert!(matches!(
                params.validate(),
                Err(EnrichError::InvalidArgument { .. })
            ));
        }
        SearchParams::default().validate().unwrap();
    }
}
