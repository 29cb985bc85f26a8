//! Nominatim / OpenStreetMap geocoder client.
//!
//! Nominatim has strict rate limits: **1 request per second** maximum on
//! the public instance. [`NominatimGeocoder`] paces itself accordingly.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use std::time::Duration;

use comps_models::Point;
use tokio::time::Instant;

use crate::{GeoError, Geocoder};

/// Public Nominatim search endpoint.
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Minimum spacing between requests to the public instance.
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_secs(1);

/// Geocoder backed by a Nominatim instance.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    rate_limit: Duration,
    country_codes: Option<String>,
    last_request: Option<Instant>,
}

impl NominatimGeocoder {
    /// Creates a geocoder for `base_url` identifying itself as `user_agent`.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            rate_limit: DEFAULT_RATE_LIMIT,
            country_codes: None,
            last_request: None,
        })
    }

    /// Restricts matches to the given comma-separated ISO country codes.
    #[must_use]
    pub fn with_country_codes(mut self, codes: &str) -> Self {
        self.country_codes = Some(codes.to_string());
        self
    }

    /// Overrides the minimum delay between requests.
    #[must_use]
    pub const fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    async fn pace(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.rate_limit {
                tokio::time::sleep(self.rate_limit - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

impl Geocoder for NominatimGeocoder {
    async fn resolve(&mut self, address: &str) -> Result<Point, GeoError> {
        self.pace().await;

        let mut query = vec![("q", address), ("format", "jsonv2"), ("limit", "1")];
        if let Some(codes) = self.country_codes.as_deref() {
            query.push(("countrycodes", codes));
        }

        let resp = self.client.get(&self.base_url).query(&query).send().await?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeoError::RateLimited);
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)?.ok_or_else(|| GeoError::NotFound {
            address: address.to_string(),
        })
    }
}

/// Parses a Nominatim JSON response into the first match, if any.
fn parse_response(body: &serde_json::Value) -> Result<Option<Point>, GeoError> {
    let results = body.as_array().ok_or_else(|| GeoError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let lat = first["lat"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeoError::Parse {
            message: "Missing lat in Nominatim response".to_string(),
        })?;

    let lon = first["lon"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| GeoError::Parse {
            message: "Missing lon in Nominatim response".to_string(),
        })?;

    log::debug!(
        "Nominatim matched {:?} at ({lat}, {lon})",
        first["display_name"].as_str().unwrap_or_default()
    );

    Ok(Some(Point::new(lat, lon)))
}
