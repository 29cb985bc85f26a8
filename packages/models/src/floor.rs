//! Parsing of free-text floor and renovation values.
//!
//! Datasets and marketplaces describe floors as plain numbers (`"3"`,
//! `"-1"`), English ordinals (`"3rd floor"`, `"ground"`) or Greek labels
//! (`"Υπόγειο"`, `"Ισόγειο"`, `"1ος"`). Everything unrecognised is treated
//! as unknown rather than guessed.

use std::sync::LazyLock;

use regex::Regex;

static LEADING_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?\d+)(?:\.0+)?\s*(?:st|nd|rd|th|ος|ο|ης|η)?\b").expect("valid regex")
});

/// Labels below ground. Checked before ground labels because the Greek
/// semi-basement label contains the basement label.
const BASEMENT_LABELS: &[&str] = &[
    "basement",
    "semi-basement",
    "semi basement",
    "υπόγειο",
    "υπογειο",
    "ημιυπόγειο",
    "ημιυπογειο",
];

const GROUND_LABELS: &[&str] = &[
    "ground",
    "ground floor",
    "gf",
    "g",
    "ισόγειο",
    "ισογειο",
    "mezzanine",
    "ημιώροφος",
    "ημιωροφος",
];

/// Parses a floor label into a level (`0` = ground, negative = basement).
///
/// Returns `None` when the label is empty or not recognised.
#[must_use]
pub fn parse_floor_label(value: &str) -> Option<i32> {
    let label = value.trim().to_lowercase();
    if label.is_empty() {
        return None;
    }

    if BASEMENT_LABELS.iter().any(|l| label.contains(l)) {
        return Some(-1);
    }
    if GROUND_LABELS.iter().any(|l| label == *l || label.starts_with(&format!("{l} "))) {
        return Some(0);
    }

    LEADING_NUMBER_RE
        .captures(&label)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i32>().ok())
}

/// Parses a renovation flag.
///
/// Accepts boolean-ish values (`true`/`false`, `yes`/`no`, `1`/`0`) as well
/// as descriptive labels such as `renovated` or `new`.
#[must_use]
pub fn parse_renovated(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "1.0" | "renovated" | "new" | "ανακαινισμένο"
        | "ανακαινισμενο" | "ναι" => Some(true),
        "false" | "no" | "n" | "0" | "0.0" | "not renovated" | "old" | "όχι" | "οχι" => {
            Some(false)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_levels() {
        assert_eq!(parse_floor_label("3"), Some(3));
        assert_eq!(parse_floor_label("-1"), Some(-1));
        assert_eq!(parse_floor_label("2.0"), Some(2));
        assert_eq!(parse_floor_label(" 7 "), Some(7));
    }

    #[test]
    fn parses_ordinal_labels() {
        assert_eq!(parse_floor_label("3rd floor"), Some(3));
        assert_eq!(parse_floor_label("1st"), Some(1));
        assert_eq!(parse_floor_label("1ος"), Some(1));
        assert_eq!(parse_floor_label("4ος όροφος"), Some(4));
    }

    #[test]
    fn parses_named_levels() {
        assert_eq!(parse_floor_label("Ground floor"), Some(0));
        assert_eq!(parse_floor_label("Ισόγειο"), Some(0));
        assert_eq!(parse_floor_label("Υπόγειο"), Some(-1));
        assert_eq!(parse_floor_label("Ημιυπόγειο"), Some(-1));
        assert_eq!(parse_floor_label("Basement"), Some(-1));
    }

    #[test]
    fn unknown_labels_are_none() {
        assert_eq!(parse_floor_label(""), None);
        assert_eq!(parse_floor_label("penthouse"), None);
        assert_eq!(parse_floor_label("n/a"), None);
    }

    #[test]
    fn parses_renovation_flags() {
        assert_eq!(parse_renovated("Yes"), Some(true));
        assert_eq!(parse_renovated("renovated"), Some(true));
        assert_eq!(parse_renovated("0"), Some(false));
        assert_eq!(parse_renovated("FALSE"), Some(false));
        assert_eq!(parse_renovated("maybe"), None);
        assert_eq!(parse_renovated(""), None);
    }
}
