//! Response classification.
//!
//! Anti-automation marketplaces rarely say "you are blocked" in a uniform
//! way. A response is checked against an ordered list of rules and the
//! first matching rule decides:
//!
//! 1. HTTP 401 or 403 → [`ResponseClass::ExpiredStatus`].
//! 2. A body that is not structured data and mentions one of
//!    [`EXPIRY_KEYWORDS`] (case-insensitive) → [`ResponseClass::ExpiredKeyword`].
//! 3. Structured data without the listings field whose `error`/`message`
//!    text mentions one of the keywords → [`ResponseClass::ExpiredKeyword`].
//! 4. A body shorter than [`EMPTYISH_BODY_LEN`] bytes that is not structured
//!    data → [`ResponseClass::ExpiredEmptyish`] (typically a block page).
//!
//! A structured payload carrying the listings field is never keyword-sniffed.

use strum_macros::AsRefStr;

/// Words whose presence in a denial body means the session is no longer
/// accepted.
pub const EXPIRY_KEYWORDS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "session",
    "cookie",
    "authentication",
];

/// Bodies shorter than this that do not parse are treated as block pages.
pub const EMPTYISH_BODY_LEN: usize = 100;

/// Fields inspected by rule 3.
const ERROR_FIELDS: &[&str] = &["error", "message"];

/// Outcome of classifying one marketplace response.
#[derive(Debug, Clone, PartialEq, AsRefStr)]
pub enum ResponseClass {
    /// A successful payload; holds the listing entries.
    Ok(Vec<serde_json::Value>),
    /// Rule 1: denial status code.
    ExpiredStatus(u16),
    /// Rules 2 and 3: a denial keyword was found.
    ExpiredKeyword(String),
    /// Rule 4: tiny unstructured body.
    ExpiredEmptyish,
    /// None of the expiry rules matched but the payload is unusable.
    Malformed(String),
}

impl ResponseClass {
    /// Returns `true` for the three expiry variants.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        matches!(
            self,
            Self::ExpiredStatus(_) | Self::ExpiredKeyword(_) | Self::ExpiredEmptyish
        )
    }
}

/// Classifies a raw response. `listings_field` is a dotted path to the
/// listings array inside a successful payload (e.g. `"data"` or
/// `"result.listings"`).
#[must_use]
pub fn classify_response(status: u16, body: &str, listings_field: &str) -> ResponseClass {
    if status == 401 || status == 403 {
        return ResponseClass::ExpiredStatus(status);
    }

    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) else {
        if let Some(keyword) = find_keyword(body) {
            return ResponseClass::ExpiredKeyword(keyword.to_string());
        }
        if body.len() < EMPTYISH_BODY_LEN {
            return ResponseClass::ExpiredEmptyish;
        }
        return ResponseClass::Malformed(format!(
            "HTTP {status}: unstructured body of {} bytes",
            body.len()
        ));
    };

    match lookup(&parsed, listings_field) {
        Some(serde_json::Value::Array(entries)) if is_success(status) => {
            ResponseClass::Ok(entries.clone())
        }
        Some(serde_json::Value::Null) if is_success(status) => ResponseClass::Ok(Vec::new()),
        Some(_) => ResponseClass::Malformed(format!(
            "HTTP {status}: listings field '{listings_field}' is unusable"
        )),
        None => {
            for field in ERROR_FIELDS {
                if let Some(text) = parsed.get(field).map(value_text)
                    && let Some(keyword) = find_keyword(&text)
                {
                    return ResponseClass::ExpiredKeyword(keyword.to_string());
                }
            }
            ResponseClass::Malformed(format!(
                "HTTP {status}: payload has no '{listings_field}' field"
            ))
        }
    }
}

/// Resolves a dotted path inside a JSON value.
#[must_use]
pub fn lookup<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| current.get(segment))
}

const fn is_success(status: u16) -> bool {
    status >= 200 && status < 300
}

fn find_keyword(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    EXPIRY_KEYWORDS
        .iter()
        .copied()
        .find(|keyword| lowered.contains(keyword))
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
