//! Generic marketplace adapter.
//!
//! [`MarketplaceSource`] implements [`ListingSource`] for any marketplace
//! described by a [`MarketplaceConfig`]. Every outbound request is paced,
//! the session is (re-)established with a warm-up request whenever it is
//! fresh, and each search runs under the bounded retry policy. A search
//! that exhausts its retries yields [`FetchOutcome::Blocked`].

use std::time::Duration;

use comps_models::{Comparable, GeoRectangle, Point, parse_floor_label, parse_renovated};
use tokio::time::Instant;

use crate::classify::{ResponseClass, classify_response, lookup};
use crate::config::{FieldMapping, MarketplaceConfig};
use crate::retry::{RetryOperation, RetryOutcome, RetryPolicy, Verdict, retry_bounded};
use crate::session::Session;
use crate::transport::{HttpRequest, HttpTransport, RawResponse, Transport, TransportError};
use crate::{FetchOutcome, ListingSource, SourceError};

/// Listing source bound to one marketplace and one transport.
///
/// Owns the session, the request pacing clock and (through the transport)
/// the cookie jar. Not meant to be shared between concurrent callers.
pub struct MarketplaceSource<T: Transport> {
    config: MarketplaceConfig,
    transport: T,
    session: Session,
    policy: RetryPolicy,
    pacing: Duration,
    last_request: Option<Instant>,
}

impl MarketplaceSource<HttpTransport> {
    /// Creates a source talking HTTP to the configured marketplace.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn connect(config: MarketplaceConfig) -> Result<Self, SourceError> {
        let transport = HttpTransport::new(&config.session.user_agent, config.session.timeout())?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> MarketplaceSource<T> {
    /// Creates a source using an arbitrary transport.
    #[must_use]
    pub fn with_transport(config: MarketplaceConfig, transport: T) -> Self {
        let session = Session::new(config.session.requests_per_session);
        let policy = config.retry.policy();
        let pacing = config.session.pacing();
        Self {
            config,
            transport,
            session,
            policy,
            pacing,
            last_request: None,
        }
    }

    /// The marketplace definition in use.
    #[must_use]
    pub const fn config(&self) -> &MarketplaceConfig {
        &self.config
    }

    /// Session bookkeeping (request and handshake counters).
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// The transport, mainly for inspection.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Waits until at least the pacing delay has passed since the previous
    /// outbound request.
    async fn pace(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.pacing {
                tokio::time::sleep(self.pacing - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    fn base_headers(&self) -> Vec<(String, String)> {
        self.config
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Starts a new session: empty cookie jar, then one warm-up request.
    ///
    /// The session only becomes active on a 2xx/3xx answer; otherwise the
    /// rejected response is returned for classification.
    async fn handshake(&mut self) -> Result<RawResponse, TransportError> {
        self.transport.clear_cookies()?;
        self.pace().await;

        let request = HttpRequest {
            url: self.config.handshake_url(),
            query: Vec::new(),
            headers: self.base_headers(),
        };
        let response = self.transport.get(&request).await?;

        if (200..400).contains(&response.status) {
            self.session.activate();
            log::info!(
                "{}: session established (handshake #{})",
                self.config.name,
                self.session.handshakes()
            );
        } else {
            log::warn!(
                "{}: handshake rejected with HTTP {}",
                self.config.name,
                response.status
            );
        }

        Ok(response)
    }

    async fn send_search(&mut self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
        if self.session.needs_handshake() {
            let response = self.handshake().await?;
            if self.session.needs_handshake() {
                return Ok(response);
            }
        }

        self.pace().await;
        let result = self.transport.get(request).await;
        self.session.record_request();
        result
    }

    async fn refresh(&mut self) {
        self.session.expire();
        match self.handshake().await {
            Ok(_) if !self.session.needs_handshake() => {}
            Ok(response) => log::warn!(
                "{}: refresh handshake returned HTTP {}, will retry on next request",
                self.config.name,
                response.status
            ),
            Err(e) => log::warn!(
                "{}: refresh handshake failed ({e}), will retry on next request",
                self.config.name
            ),
        }
    }

    /// Builds the search request and the human-facing map-search URL used
    /// as `Referer` and as fallback listing link.
    fn search_request(
        &self,
        rect: &GeoRectangle,
        min_area: f64,
        max_area: f64,
    ) -> Result<(HttpRequest, String), SourceError> {
        let names = &self.config.query;
        let precision = names.coordinate_precision;

        let mut query: Vec<(String, String)> = self
            .config
            .static_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        query.push((names.lat_low.clone(), format!("{:.precision$}", rect.min_lat)));
        query.push((names.lat_high.clone(), format!("{:.precision$}", rect.max_lat)));
        query.push((names.lon_low.clone(), format!("{:.precision$}", rect.min_lon)));
        query.push((names.lon_high.clone(), format!("{:.precision$}", rect.max_lon)));
        if min_area > 0.0 {
            query.push((names.area_low.clone(), format!("{:.0}", min_area.floor())));
        }
        query.push((names.area_high.clone(), format!("{:.0}", max_area.ceil())));

        let referer = reqwest::Url::parse_with_params(&self.config.handshake_url(), &query)
            .map_err(|e| SourceError::Config {
                message: format!("{}: invalid handshake URL: {e}", self.config.id),
            })?
            .to_string();

        let mut headers = self.base_headers();
        headers.push(("Referer".to_string(), referer.clone()));

        Ok((
            HttpRequest {
                url: self.config.search_url(),
                query,
                headers,
            },
            referer,
        ))
    }
}

impl<T: Transport> ListingSource for MarketplaceSource<T> {
    async fn search(
        &mut self,
        rect: &GeoRectangle,
        min_area: f64,
        max_area: f64,
    ) -> Result<FetchOutcome, SourceError> {
        if !min_area.is_finite() || !max_area.is_finite() || min_area < 0.0 || min_area > max_area
        {
            return Err(SourceError::InvalidArgument {
                message: format!("invalid area range [{min_area}, {max_area}]"),
            });
        }

        let (request, referer) = self.search_request(rect, min_area, max_area)?;
        let policy = self.policy;

        log::debug!(
            "{}: searching {rect} for {min_area:.0}-{max_area:.0} sqm",
            self.config.name
        );

        let mut attempt = SearchAttempt {
            source: self,
            request,
            referer,
        };

        match retry_bounded(&mut attempt, &policy).await {
            RetryOutcome::Completed(comparables) => {
                log::debug!(
                    "{}: {} comparable(s) in {rect}",
                    self.config.name,
                    comparables.len()
                );
                Ok(FetchOutcome::Comparables(comparables))
            }
            RetryOutcome::Exhausted { attempts, last } => {
                // Start the next search from a clean session.
                self.session.expire();
                log::error!(
                    "{}: blocked after {attempts} attempt(s), last failure: {last}",
                    self.config.name
                );
                Ok(FetchOutcome::Blocked)
            }
        }
    }
}

/// One search request under retry.
struct SearchAttempt<'a, T: Transport> {
    source: &'a mut MarketplaceSource<T>,
    request: HttpRequest,
    referer: String,
}

impl<T: Transport> RetryOperation for SearchAttempt<'_, T> {
    type Raw = Result<RawResponse, TransportError>;
    type Output = Vec<Comparable>;

    async fn call(&mut self) -> Self::Raw {
        self.source.send_search(&self.request).await
    }

    fn classify(&self, raw: Self::Raw) -> Verdict<Vec<Comparable>> {
        let response = match raw {
            Ok(response) => response,
            Err(e) => return Verdict::Transient(e.to_string()),
        };

        let class = classify_response(
            response.status,
            &response.body,
            &self.source.config.listings_field,
        );
        if class.is_expired() {
            log::debug!(
                "{}: HTTP {} classified as {}",
                self.source.config.name,
                response.status,
                class.as_ref()
            );
        }
        match class {
            ResponseClass::Ok(entries) => Verdict::Success(parse_listings(
                &entries,
                &self.source.config.fields,
                &self.referer,
            )),
            ResponseClass::Malformed(reason) => Verdict::Transient(reason),
            ResponseClass::ExpiredStatus(status) => Verdict::Expired(format!("HTTP {status}")),
            ResponseClass::ExpiredKeyword(keyword) => {
                Verdict::Expired(format!("body mentions '{keyword}'"))
            }
            ResponseClass::ExpiredEmptyish => Verdict::Expired(format!(
                "near-empty body ({} bytes)",
                response.body.len()
            )),
        }
    }

    async fn refresh(&mut self) {
        self.source.refresh().await;
    }
}

/// Converts listing entries into comparables, dropping entries without a
/// usable location, area or price.
fn parse_listings(
    entries: &[serde_json::Value],
    fields: &FieldMapping,
    fallback_url: &str,
) -> Vec<Comparable> {
    let comparables: Vec<Comparable> = entries
        .iter()
        .filter_map(|entry| parse_listing(entry, fields, fallback_url))
        .collect();

    let skipped = entries.len() - comparables.len();
    if skipped > 0 {
        log::warn!("Skipped {skipped} listing(s) without location, area or price");
    }

    comparables
}

fn parse_listing(
    entry: &serde_json::Value,
    fields: &FieldMapping,
    fallback_url: &str,
) -> Option<Comparable> {
    let lat = lookup(entry, &fields.latitude).and_then(number)?;
    let lon = lookup(entry, &fields.longitude).and_then(number)?;
    let area = lookup(entry, &fields.area).and_then(number)?;
    let price = lookup(entry, &fields.price).and_then(number)?;

    if area <= 0.0 || price <= 0.0 {
        return None;
    }

    let floor_level = fields
        .floor
        .as_deref()
        .and_then(|path| lookup(entry, path))
        .and_then(floor_value);
    let renovated = fields
        .renovated
        .as_deref()
        .and_then(|path| lookup(entry, path))
        .and_then(renovated_value);
    let source_url = fields
        .url
        .as_deref()
        .and_then(|path| lookup(entry, path))
        .and_then(serde_json::Value::as_str)
        .filter(|url| !url.is_empty())
        .map_or_else(
            || fallback_url.to_string(),
            |url| {
                if url.starts_with("http://") || url.starts_with("https://") {
                    url.to_string()
                } else {
                    format!("{}{url}", fields.url_prefix.as_deref().unwrap_or_default())
                }
            },
        );

    Some(Comparable {
        location: Point::new(lat, lon),
        area,
        price,
        floor_level,
        renovated,
        source_url,
    })
}

fn number(value: &serde_json::Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .filter(|n| n.is_finite())
}

fn floor_value(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        serde_json::Value::String(s) => parse_floor_label(s),
        serde_json::Value::Object(map) => map
            .get("value")
            .or_else(|| map.get("name"))
            .and_then(floor_value),
        _ => None,
    }
}

fn renovated_value(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => n.as_i64().map(|n| n != 0),
        serde_json::Value::String(s) => parse_renovated(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::config::parse_marketplace_toml;
    use crate::session::SessionPhase;

    const CONFIG: &str = r#"
        id = "test"
        name = "Test Market"
        base_url = "https://market.test"
        handshake_path = "/map"
        search_path = "/api/search"
        listings_field = "data"

        [query]
        lat_low = "latLow"
        lat_high = "latHigh"
        lon_low = "lonLow"
        lon_high = "lonHigh"
        area_low = "areaLow"
        area_high = "areaHigh"

        [static_params]
        listingType = "sale"

        [fields]
        latitude = "latitude"
        longitude = "longitude"
        area = "sq_meters"
        price = "price"
        floor = "floor"
        renovated = "renovated"
        url = "url"
        url_prefix = "https://market.test"

        [session]
        requests_per_session = 10
        pacing_ms = 0

        [retry]
        max_retries = 2
        delay_ms = 0
    "#;

    #[derive(Default)]
    struct ScriptedTransport {
        responses: VecDeque<Result<RawResponse, TransportError>>,
        requests: Vec<HttpRequest>,
        sent_at: Vec<Instant>,
        cookie_clears: u32,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<RawResponse, TransportError>>) -> Self {
            Self {
                responses: responses.into(),
                ..Self::default()
            }
        }

        fn urls(&self) -> Vec<&str> {
            self.requests.iter().map(|r| r.url.as_str()).collect()
        }
    }

    impl Transport for ScriptedTransport {
        async fn get(&mut self, request: &HttpRequest) -> Result<RawResponse, TransportError> {
            self.requests.push(request.clone());
            self.sent_at.push(Instant::now());
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".to_string())))
        }

        fn clear_cookies(&mut self) -> Result<(), TransportError> {
            self.cookie_clears += 1;
            Ok(())
        }
    }

    fn ok(body: &str) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    fn status(code: u16) -> Result<RawResponse, TransportError> {
        Ok(RawResponse {
            status: code,
            body: String::new(),
        })
    }

    fn handshake_ok() -> Result<RawResponse, TransportError> {
        ok(&"<html>map</html>".repeat(20))
    }

    const LISTINGS: &str = r#"{"data": [
        {"latitude": 37.98, "longitude": 23.72, "sq_meters": 50, "price": 100000,
         "floor": "3", "renovated": true, "url": "/en/property/1"},
        {"latitude": "37.99", "longitude": "23.73", "sq_meters": "80", "price": 160000},
        {"latitude": 37.97, "longitude": 23.71, "sq_meters": 0, "price": 90000},
        {"longitude": 23.70, "sq_meters": 40, "price": 90000}
    ]}"#;

    fn source(responses: Vec<Result<RawResponse, TransportError>>) -> MarketplaceSource<ScriptedTransport> {
        let config = parse_marketplace_toml(CONFIG).unwrap();
        MarketplaceSource::with_transport(config, ScriptedTransport::new(responses))
    }

    fn gaps(transport: &ScriptedTransport) -> Vec<Duration> {
        transport
            .sent_at
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    fn roughly(gap: Duration, expected: Duration) -> bool {
        gap >= expected && gap < expected + Duration::from_millis(10)
    }

    fn rect() -> GeoRectangle {
        GeoRectangle::from_corners(Point::new(37.97, 23.71), Point::new(37.99, 23.73))
    }

    fn comparables(outcome: FetchOutcome) -> Vec<Comparable> {
        match outcome {
            FetchOutcome::Comparables(c) => c,
            FetchOutcome::Blocked => panic!("unexpected Blocked"),
        }
    }

    #[tokio::test]
    async fn handshakes_then_parses_listings() {
        let mut src = source(vec![handshake_ok(), ok(LISTINGS)]);
        let found = comparables(src.search(&rect(), 40.0, 60.0).await.unwrap());

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].floor_level, Some(3));
        assert_eq!(found[0].renovated, Some(true));
        assert_eq!(found[0].source_url, "https://market.test/en/property/1");
        assert_eq!(found[1].floor_level, None);
        assert_eq!(found[1].renovated, None);
        assert!(found[1].source_url.starts_with("https://market.test/map?"));

        assert_eq!(
            src.transport().urls(),
            vec!["https://market.test/map", "https://market.test/api/search"]
        );
        assert_eq!(src.session().phase(), SessionPhase::Active);
        assert_eq!(src.session().total_requests(), 1);
    }

    #[tokio::test]
    async fn search_query_carries_rectangle_and_area_band() {
        let mut src = source(vec![handshake_ok(), ok(r#"{"data": []}"#)]);
        let _ = src.search(&rect(), 40.2, 59.5).await.unwrap();

        let query = &src.transport().requests[1].query;
        let get = |name: &str| {
            query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("listingType"), Some("sale"));
        assert_eq!(get("latLow"), Some("37.970000"));
        assert_eq!(get("lonHigh"), Some("23.730000"));
        assert_eq!(get("areaLow"), Some("40"));
        assert_eq!(get("areaHigh"), Some("60"));
        assert!(
            src.transport().requests[1]
                .headers
                .iter()
                .any(|(k, _)| k == "Referer")
        );
    }

    #[tokio::test]
    async fn zero_minimum_area_is_not_sent() {
        let mut src = source(vec![handshake_ok(), ok(r#"{"data": []}"#)]);
        let _ = src.search(&rect(), 0.0, 15.0).await.unwrap();
        let query = &src.transport().requests[1].query;
        assert!(!query.iter().any(|(k, _)| k == "areaLow"));
    }

    #[tokio::test]
    async fn empty_result_is_not_blocked() {
        let mut src = source(vec![handshake_ok(), ok(r#"{"data": []}"#)]);
        let outcome = src.search(&rect(), 40.0, 60.0).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Comparables(Vec::new()));
    }

    #[tokio::test]
    async fn expiry_refreshes_session_and_retries_same_query() {
        let mut src = source(vec![
            handshake_ok(),
            status(403),
            handshake_ok(),
            ok(LISTINGS),
        ]);
        let found = comparables(src.search(&rect(), 40.0, 60.0).await.unwrap());

        assert_eq!(found.len(), 2);
        assert_eq!(src.session().handshakes(), 2);
        let requests = &src.transport().requests;
        assert_eq!(requests[1].query, requests[3].query);
        assert_eq!(src.transport().cookie_clears, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_yield_blocked() {
        let mut src = source(vec![
            handshake_ok(),
            status(403),
            handshake_ok(),
            ok("<html>denied</html>"),
            handshake_ok(),
            ok(r#"{"error": "Unauthorized"}"#),
        ]);
        let outcome = src.search(&rect(), 40.0, 60.0).await.unwrap();

        assert_eq!(outcome, FetchOutcome::Blocked);
        // Three search attempts, each preceded by a handshake.
        assert_eq!(src.transport().requests.len(), 6);
        assert_eq!(src.session().phase(), SessionPhase::Fresh);
    }

    #[tokio::test]
    async fn single_network_error_retries_without_refresh() {
        let mut src = source(vec![
            handshake_ok(),
            Err(TransportError::Timeout("slow".to_string())),
            ok(LISTINGS),
        ]);
        let found = comparables(src.search(&rect(), 40.0, 60.0).await.unwrap());
        assert_eq!(found.len(), 2);
        assert_eq!(src.session().handshakes(), 1);
    }

    #[tokio::test]
    async fn repeated_network_errors_refresh_session() {
        let mut src = source(vec![
            handshake_ok(),
            Err(TransportError::Connect("reset".to_string())),
            Err(TransportError::Connect("reset".to_string())),
            handshake_ok(),
            ok(LISTINGS),
        ]);
        let found = comparables(src.search(&rect(), 40.0, 60.0).await.unwrap());
        assert_eq!(found.len(), 2);
        assert_eq!(src.session().handshakes(), 2);
    }

    #[tokio::test]
    async fn session_rotates_after_quota() {
        let config = parse_marketplace_toml(&CONFIG.replace(
            "requests_per_session = 10",
            "requests_per_session = 2",
        ))
        .unwrap();
        let transport = ScriptedTransport::new(vec![
            handshake_ok(),
            ok(r#"{"data": []}"#),
            ok(r#"{"data": []}"#),
            handshake_ok(),
            ok(r#"{"data": []}"#),
        ]);
        let mut src = MarketplaceSource::with_transport(config, transport);

        for _ in 0..3 {
            let outcome = src.search(&rect(), 40.0, 60.0).await.unwrap();
            assert!(!outcome.is_blocked());
        }
        assert_eq!(src.session().handshakes(), 2);
        assert_eq!(
            src.transport().urls(),
            vec![
                "https://market.test/map",
                "https://market.test/api/search",
                "https://market.test/api/search",
                "https://market.test/map",
                "https://market.test/api/search",
            ]
        );
    }

    #[tokio::test]
    async fn rejects_inverted_area_range() {
        let mut src = source(Vec::new());
        assert!(matches!(
            src.search(&rect(), 60.0, 40.0).await,
            Err(SourceError::InvalidArgument { .. })
        ));
        assert!(src.transport().requests.is_empty());
    }

    #[test]
    fn floor_values_accept_numbers_labels_and_objects() {
        assert_eq!(floor_value(&serde_json::json!(2)), Some(2));
        assert_eq!(floor_value(&serde_json::json!("Ισόγειο")), Some(0));
        assert_eq!(floor_value(&serde_json::json!({"name": "1st"})), Some(1));
        assert_eq!(floor_value(&serde_json::json!(null)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_requests_are_spaced_by_pacing() {
        let mut config = parse_marketplace_toml(CONFIG).unwrap();
        config.session.pacing_ms = 200;
        let mut source = MarketplaceSource::with_transport(
            config,
            ScriptedTransport::new(vec![handshake_ok(), ok(LISTINGS), ok(LISTINGS)]),
        );

        comparables(source.search(&rect(), 30.0, 200.0).await.unwrap());
        comparables(source.search(&rect(), 30.0, 200.0).await.unwrap());

        let gaps = gaps(source.transport());
        assert_eq!(gaps.len(), 2);
        assert!(
            gaps.iter()
                .all(|gap| roughly(*gap, Duration::from_millis(200))),
            "gaps: {gaps:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_configured_delay() {
        let mut config = parse_marketplace_toml(CONFIG).unwrap();
        config.retry.delay_ms = 500;
        let mut source = MarketplaceSource::with_transport(
            config,
            ScriptedTransport::new(vec![
                handshake_ok(),
                Err(TransportError::Other("connection reset".to_string())),
                ok(LISTINGS),
            ]),
        );

        let found = comparables(source.search(&rect(), 30.0, 200.0).await.unwrap());
        assert_eq!(found.len(), 2);

        let gaps = gaps(source.transport());
        assert_eq!(gaps.len(), 2);
        // Handshake and first search are back to back; the retry waits.
        assert!(gaps[0] < Duration::from_millis(10), "gaps: {gaps:?}");
        assert!(roughly(gaps[1], Duration::from_millis(500)), "gaps: {gaps:?}");
    }
}
