//! Config-driven marketplace adapter definition.
//!
//! [`MarketplaceConfig`] captures everything specific to one marketplace:
//! endpoints, query parameter names, headers, the listing field mapping,
//! and session/retry tuning. One generic adapter serves all of them.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryPolicy;

/// A complete marketplace definition, loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketplaceConfig {
    /// Unique identifier (e.g., `"spitogatos"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether the marketplace may be selected by default.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Scheme and host, without trailing slash.
    pub base_url: String,
    /// Page requested to obtain session cookies.
    pub handshake_path: String,
    /// Search endpoint.
    pub search_path: String,
    /// Dotted path of the listings array in a search response.
    #[serde(default = "default_listings_field")]
    pub listings_field: String,
    /// Names of the geographic and area query parameters.
    pub query: QueryParams,
    /// Parameters sent unchanged with every search.
    #[serde(default)]
    pub static_params: BTreeMap<String, String>,
    /// Headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Where each comparable attribute lives in a listing entry.
    pub fields: FieldMapping,
    /// Session and pacing tuning.
    #[serde(default)]
    pub session: SessionConfig,
    /// Retry tuning.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Query parameter names understood by the search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryParams {
    /// Southern latitude bound.
    pub lat_low: String,
    /// Northern latitude bound.
    pub lat_high: String,
    /// Western longitude bound.
    pub lon_low: String,
    /// Eastern longitude bound.
    pub lon_high: String,
    /// Minimum living area. Omitted from the query when the bound is `0`.
    pub area_low: String,
    /// Maximum living area.
    pub area_high: String,
    /// Decimal places used for coordinates.
    #[serde(default = "default_coordinate_precision")]
    pub coordinate_precision: usize,
}

/// Dotted paths of comparable attributes inside one listing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    /// Latitude.
    pub latitude: String,
    /// Longitude.
    pub longitude: String,
    /// Living area.
    pub area: String,
    /// Price.
    pub price: String,
    /// Floor level (number or label).
    #[serde(default)]
    pub floor: Option<String>,
    /// Renovation flag (boolean or label).
    #[serde(default)]
    pub renovated: Option<String>,
    /// Listing link, absolute or relative to `url_prefix`.
    #[serde(default)]
    pub url: Option<String>,
    /// Prefix for relative listing links.
    #[serde(default)]
    pub url_prefix: Option<String>,
}

/// Session lifecycle and pacing.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Search requests per session before rotating (`0` = never).
    #[serde(default = "default_requests_per_session")]
    pub requests_per_session: u32,
    /// Minimum spacing between any two outbound requests.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// `User-Agent` header.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            requests_per_session: default_requests_per_session(),
            pacing_ms: default_pacing_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl SessionConfig {
    /// Minimum spacing between requests.
    #[must_use]
    pub const fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Retry budget for one search.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Wait before every retry.
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// The equivalent [`RetryPolicy`].
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

impl MarketplaceConfig {
    /// Absolute URL of the handshake page.
    #[must_use]
    pub fn handshake_url(&self) -> String {
        format!("{}{}", self.base_url, self.handshake_path)
    }

    /// Absolute URL of the search endpoint.
    #[must_use]
    pub fn search_url(&self) -> String {
        format!("{}{}", self.base_url, self.search_path)
    }
}

const fn default_true() -> bool {
    true
}

fn default_listings_field() -> String {
    "listings".to_string()
}

const fn default_coordinate_precision() -> usize {
    6
}

const fn default_requests_per_session() -> u32 {
    25
}

const fn default_pacing_ms() -> u64 {
    3_000
}

const fn default_timeout_secs() -> u64 {
    20
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/138.0.0.0 Safari/537.36"
        .to_string()
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_retry_delay_ms() -> u64 {
    5_000
}

/// Parses a marketplace definition from TOML.
///
/// # Errors
///
/// Returns [`crate::SourceError::Config`] if the TOML is malformed or the
/// definition is inconsistent.
pub fn parse_marketplace_toml(toml_str: &str) -> Result<MarketplaceConfig, crate::SourceError> {
    let config: MarketplaceConfig =
        toml::de::from_str(toml_str).map_err(|e| crate::SourceError::Config {
            message: e.to_string(),
        })?;

    if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
        return Err(crate::SourceError::Config {
            message: format!("{}: base_url must be http(s)", config.id),
        });
    }

    Ok(config)
}
