// 🔧 Matcher Transforms
// Turn a regex match into a typed field value (dates, names, URLs, counts)

use crate::error::TransformError;
use crate::extractor::{ExtractionContext, FieldValue};
use crate::patterns::FieldKind;
use chrono::{Days, NaiveDate};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Canonical output format for every date field.
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Capture group a transform reads when the pattern defines one.
pub const VALUE_GROUP: &str = "value";

static ORDINAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d)(?:st|nd|rd|th)\b").expect("valid ordinal regex"));

static NAME_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:[,;&]|\band\b)\s*").expect("valid separator regex"));

// ============================================================================
// TRANSFORM DEFINITION
// ============================================================================

/// How a matcher turns its regex match into a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    /// Matched text, trimmed of surrounding whitespace and trailing `,;:`.
    Text,

    /// Parse the match with the first chrono format that accepts it.
    Date { formats: Vec<String> },

    /// "3 days ago", "2 weeks ago" - needs `amount` and `unit` groups.
    RelativeDate,

    /// "today", "yesterday", "tomorrow".
    NamedDay,

    /// Split a delimited run of names into a list.
    NameList,

    /// Every match (its `value` group if present), cleaned and deduplicated.
    MatchList,

    /// Every URL-like match whose host ends in an allowed suffix, deduplicated.
    UrlList { allowed_suffixes: Vec<String> },

    /// Selected capture groups, in order, as a list.
    Captures { groups: Vec<String> },

    /// Number of non-overlapping matches in the text.
    Count,
}

impl Transform {
    /// The value type this transform produces.
    pub fn output_kind(&self) -> FieldKind {
        match self {
            Transform::Text
            | Transform::Date { .. }
            | Transform::RelativeDate
            | Transform::NamedDay => FieldKind::Text,
            Transform::NameList
            | Transform::MatchList
            | Transform::UrlList { .. }
            | Transform::Captures { .. } => FieldKind::List,
            Transform::Count => FieldKind::Count,
        }
    }

    /// Capture groups the pattern must define for this transform to work.
    pub fn required_groups(&self) -> Vec<&str> {
        match self {
            Transform::RelativeDate => vec!["amount", "unit"],
            Transform::Captures { groups } => groups.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Apply to `text`.
    ///
    /// `Ok(None)` means the pattern did not match (or only produced an empty
    /// value). `Err` means every candidate match was rejected by the transform.
    pub fn apply(
        &self,
        regex: &Regex,
        text: &str,
        ctx: &ExtractionContext,
    ) -> Result<Option<FieldValue>, TransformError> {
        match self {
            Transform::Text => first_accepted(regex, text, |caps| {
                Ok(FieldValue::Text(clean_text(value_of(caps))))
            }),
            Transform::Date { formats } => first_accepted(regex, text, |caps| {
                parse_date(value_of(caps), formats).map(canonical_date)
            }),
            Transform::RelativeDate => first_accepted(regex, text, |caps| {
                let amount = group(caps, "amount")?;
                let unit = group(caps, "unit")?;
                resolve_relative(amount, unit, ctx.reference_date).map(canonical_date)
            }),
            Transform::NamedDay => first_accepted(regex, text, |caps| {
                resolve_named_day(value_of(caps), ctx.reference_date).map(canonical_date)
            }),
            Transform::NameList => first_accepted(regex, text, |caps| {
                Ok(FieldValue::List(split_names(value_of(caps))))
            }),
            Transform::Captures { groups } => first_accepted(regex, text, |caps| {
                groups
                    .iter()
                    .map(|g| group(caps, g).map(clean_text))
                    .collect::<Result<Vec<_>, _>>()
                    .map(FieldValue::List)
            }),
            Transform::MatchList => Ok(non_empty(FieldValue::List(collect_matches(regex, text)))),
            Transform::UrlList { allowed_suffixes } => {
                let urls = collect_urls(regex, text, allowed_suffixes);
                Ok(non_empty(FieldValue::List(urls)))
            }
            Transform::Count => Ok(non_empty(FieldValue::Count(regex.find_iter(text).count()))),
        }
    }
}

fn canonical_date(date: NaiveDate) -> FieldValue {
    FieldValue::Text(date.format(CANONICAL_DATE_FORMAT).to_string())
}

/// Walk every match in order; the first one the transform accepts with a
/// non-empty value wins. If matches existed but none was accepted, the last
/// rejection is reported.
fn first_accepted<F>(
    regex: &Regex,
    text: &str,
    mut accept: F,
) -> Result<Option<FieldValue>, TransformError>
where
    F: FnMut(&Captures<'_>) -> Result<FieldValue, TransformError>,
{
    let mut last_error = None;

    for caps in regex.captures_iter(text) {
        match accept(&caps) {
            Ok(value) if !value.is_empty() => return Ok(Some(value)),
            Ok(_) => {}
            Err(err) => last_error = Some(err),
        }
    }

    match last_error {
        Some(err) => Err(err),
        None => Ok(None),
    }
}

fn non_empty(value: FieldValue) -> Option<FieldValue> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn value_of<'t>(caps: &Captures<'t>) -> &'t str {
    caps.name(VALUE_GROUP)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str())
        .unwrap_or("")
}

fn group<'t>(caps: &Captures<'t>, name: &str) -> Result<&'t str, TransformError> {
    caps.name(name)
        .map(|m| m.as_str())
        .ok_or_else(|| TransformError::MissingCapture(name.to_string()))
}

// ============================================================================
// TEXT
// ============================================================================

/// Trim whitespace and trailing separators, collapse internal whitespace.
pub fn clean_text(s: &str) -> String {
    let trimmed = s.trim().trim_end_matches([',', ';', ':']).trim();
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// DATES
// ============================================================================

/// Parse a date candidate against a list of chrono formats.
///
/// Commas, periods and ordinal suffixes are dropped first, so "March 27th, 2025"
/// and "Mar. 27 2025" both parse with `%B %d %Y` / `%b %d %Y`.
pub fn parse_date(candidate: &str, formats: &[String]) -> Result<NaiveDate, TransformError> {
    let cleaned = ORDINAL_SUFFIX.replace_all(candidate, "$1");
    let cleaned = cleaned.replace([',', '.'], " ");
    let cleaned = cleaned
        .split_whitespace()
        .map(|w| if w.eq_ignore_ascii_case("sept") { "Sep" } else { w })
        .collect::<Vec<_>>()
        .join(" ");

    formats
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(&cleaned, f).ok())
        .ok_or_else(|| TransformError::UnparsableDate(candidate.to_string()))
}

/// Resolve "N <unit>s ago" against the reference date. Months count as 30 days;
/// hours and minutes resolve to the reference date itself.
pub fn resolve_relative(
    amount: &str,
    unit: &str,
    reference: NaiveDate,
) -> Result<NaiveDate, TransformError> {
    let raw = || format!("{} {} ago", amount, unit);
    let amount: u64 = amount
        .trim()
        .parse()
        .map_err(|_| TransformError::UnresolvableRelativeDate(raw()))?;

    let unit = unit.trim().to_lowercase();
    let days = match unit.trim_end_matches('s') {
        "minute" | "hour" => 0,
        "day" => amount,
        "week" => amount.saturating_mul(7),
        "month" => amount.saturating_mul(30),
        _ => return Err(TransformError::UnresolvableRelativeDate(raw())),
    };

    reference
        .checked_sub_days(Days::new(days))
        .ok_or_else(|| TransformError::UnresolvableRelativeDate(raw()))
}

/// Resolve "today" / "yesterday" / "tomorrow" against the reference date.
pub fn resolve_named_day(word: &str, reference: NaiveDate) -> Result<NaiveDate, TransformError> {
    let resolved = match word.trim().to_lowercase().as_str() {
        "today" => Some(reference),
        "yesterday" => reference.checked_sub_days(Days::new(1)),
        "tomorrow" => reference.checked_add_days(Days::new(1)),
        _ => None,
    };
    resolved.ok_or_else(|| TransformError::UnresolvableRelativeDate(word.to_string()))
}

// ============================================================================
// NAMES
// ============================================================================

/// Split "John Doe, Jane Roe and R. Smith" into name-like tokens.
///
/// Tokens must start with a letter and hold at most five words; exact
/// duplicates are dropped, first occurrence wins.
pub fn split_names(s: &str) -> Vec<String> {
    let mut seen = HashSet::new();

    NAME_SEPARATOR
        .split(s)
        .map(|token| clean_text(token.trim_matches(|c: char| c == '.' || c.is_whitespace())))
        .filter(|token| is_name_like(token))
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

fn is_name_like(token: &str) -> bool {
    let starts_alpha = token.chars().next().is_some_and(char::is_alphabetic);
    let words = token.split_whitespace().count();
    starts_alpha && token.chars().count() >= 2 && (1..=5).contains(&words)
}

/// Every match in first-seen order, whitespace-collapsed; repeats that differ
/// only in case are dropped.
pub fn collect_matches(regex: &Regex, text: &str) -> Vec<String> {
    let mut seen = HashSet::new();

    regex
        .captures_iter(text)
        .map(|caps| clean_text(value_of(&caps)))
        .filter(|value| !value.is_empty())
        .filter(|value| seen.insert(value.to_lowercase()))
        .collect()
}

// ============================================================================
// URLS
// ============================================================================

/// Collect allowed URLs from every match, in first-seen order.
pub fn collect_urls(regex: &Regex, text: &str, allowed_suffixes: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for m in regex.find_iter(text) {
        // Domain part of an e-mail address, not a site
        if text[..m.start()].ends_with('@') {
            continue;
        }

        let url = clean_url(m.as_str());
        if !has_allowed_suffix(&url, allowed_suffixes) {
            continue;
        }

        if seen.insert(url.to_lowercase()) {
            urls.push(url);
        }
    }

    urls
}

/// Strip whitespace and trailing punctuation picked up from prose.
pub fn clean_url(url: &str) -> String {
    url.trim()
        .trim_end_matches(['.', ',', ')', ';', ':', ']', '!', '?', '"', '\''])
        .to_string()
}

/// Host part of a URL: scheme, credentials, port and path removed.
pub fn host_of(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("");
    let host = authority.rsplit('@').next().unwrap_or(authority);
    host.split(':').next().unwrap_or(host).to_lowercase()
}

/// True if the URL's host ends in one of the allowed suffixes ("com", "co.uk", ...).
pub fn has_allowed_suffix(url: &str, allowed_suffixes: &[String]) -> bool {
    let host = host_of(url);
    allowed_suffixes.iter().any(|suffix| {
        let suffix = suffix.trim_start_matches('.').to_lowercase();
        host.len() > suffix.len()
            && host.ends_with(&suffix)
            && host[..host.len() - suffix.len()].ends_with('.')
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ExtractionContext {
        ExtractionContext::new(NaiveDate::from_ymd_opt(2025, 3, 27).unwrap())
    }

    fn formats(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  123 Main St,  "), "123 Main St");
        assert_eq!(clean_text("Storage \n Auction:"), "Storage Auction");
    }

    #[test]
    fn test_parse_date_variants() {
        let fmts = formats(&["%m/%d/%Y", "%B %d %Y", "%b %d %Y"]);
        let expected = NaiveDate::from_ymd_opt(2025, 3, 27).unwrap();

        assert_eq!(parse_date("03/27/2025", &fmts).unwrap(), expected);
        assert_eq!(parse_date("March 27, 2025", &fmts).unwrap(), expected);
        assert_eq!(parse_date("Mar. 27th, 2025", &fmts).unwrap(), expected);
        assert_eq!(
            parse_date("Sept 3, 2024", &fmts).unwrap(),
            NaiveDate::from_ymd_opt(2024, 9, 3).unwrap()
        );
    }

    #[test]
    fn test_parse_date_rejects_impossible_dates() {
        let fmts = formats(&["%m/%d/%Y"]);
        assert_eq!(
            parse_date("13/45/2025", &fmts),
            Err(TransformError::UnparsableDate("13/45/2025".to_string()))
        );
    }

    #[test]
    fn test_resolve_relative() {
        let reference = NaiveDate::from_ymd_opt(2025, 3, 27).unwrap();
        assert_eq!(
            resolve_relative("3", "days", reference).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 24).unwrap()
        );
        assert_eq!(
            resolve_relative("2", "weeks", reference).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 13).unwrap()
        );
        assert_eq!(
            resolve_relative("1", "month", reference).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 25).unwrap()
        );
        assert_eq!(resolve_relative("5", "hours", reference).unwrap(), reference);
        assert!(resolve_relative("x", "days", reference).is_err());
        assert!(resolve_relative("2", "fortnights", reference).is_err());
    }

    #[test]
    fn test_resolve_named_day() {
        let reference = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(resolve_named_day("Today", reference).unwrap(), reference);
        assert_eq!(
            resolve_named_day("yesterday", reference).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
        assert_eq!(
            resolve_named_day("TOMORROW", reference).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 2).unwrap()
        );
    }

    #[test]
    fn test_split_names() {
        assert_eq!(split_names("John Doe, Jane Roe"), vec!["John Doe", "Jane Roe"]);
        assert_eq!(
            split_names("J. Smith; Mary Jones and Bob Lee & Ann Wu"),
            vec!["J. Smith", "Mary Jones", "Bob Lee", "Ann Wu"]
        );
        assert_eq!(split_names("John Doe, John Doe, 42, , x"), vec!["John Doe"]);
    }

    #[test]
    fn test_clean_url() {
        assert_eq!(clean_url("www.storagetreasures.com)."), "www.storagetreasures.com");
        assert_eq!(clean_url(" https://bid.example.org/lot/1; "), "https://bid.example.org/lot/1");
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://user@Bid.Example.com:8080/path?q=1"), "bid.example.com");
        assert_eq!(host_of("www.lockerfox.com/auctions"), "www.lockerfox.com");
        assert_eq!(host_of("storageauctions.net"), "storageauctions.net");
    }

    #[test]
    fn test_has_allowed_suffix() {
        let allowed = formats(&["com", ".org", "co.uk"]);
        assert!(has_allowed_suffix("https://bid.example.com/x", &allowed));
        assert!(has_allowed_suffix("auctions.example.org", &allowed));
        assert!(has_allowed_suffix("www.bids.co.uk", &allowed));
        assert!(!has_allowed_suffix("example.xyz", &allowed));
        assert!(!has_allowed_suffix("notcom", &allowed));
        assert!(!has_allowed_suffix("example.dotcom", &allowed));
    }

    #[test]
    fn test_collect_urls_dedupes_and_skips_emails() {
        let re = Regex::new(r"(?i)\b(?:https?://|www\.)?[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\S*")
            .unwrap();
        let text = "Bid at www.lockerfox.com, or WWW.LOCKERFOX.COM. Email info@example.com or see bids.example.xyz";
        let urls = collect_urls(&re, text, &formats(&["com"]));
        assert_eq!(urls, vec!["www.lockerfox.com"]);
    }

    #[test]
    fn test_first_accepted_skips_rejected_candidates() {
        let re = Regex::new(r"\d{1,2}/\d{1,2}/\d{4}").unwrap();
        let transform = Transform::Date { formats: formats(&["%m/%d/%Y"]) };

        let value = transform.apply(&re, "Bad 13/45/2025, good 04/01/2025", &ctx()).unwrap();
        assert_eq!(value, Some(FieldValue::Text("2025-04-01".to_string())));

        let err = transform.apply(&re, "Only 13/45/2025", &ctx()).unwrap_err();
        assert!(matches!(err, TransformError::UnparsableDate(_)));

        assert_eq!(transform.apply(&re, "No dates", &ctx()).unwrap(), None);
    }

    #[test]
    fn test_count_transform() {
        let re = Regex::new(r"(?i)\btenants?\b").unwrap();
        let value = Transform::Count
            .apply(&re, "Tenant A. Tenants B and tenant C", &ctx())
            .unwrap();
        assert_eq!(value, Some(FieldValue::Count(3)));
        assert_eq!(Transform::Count.apply(&re, "nobody", &ctx()).unwrap(), None);
    }

    #[test]
    fn test_captures_transform() {
        let re = Regex::new(r"(?P<city>[A-Z][a-z]+),? (?P<state>[A-Z]{2})").unwrap();
        let transform = Transform::Captures {
            groups: formats(&["city", "state"]),
        };
        let value = transform.apply(&re, "in Springfield, IL", &ctx()).unwrap();
        assert_eq!(
            value,
            Some(FieldValue::List(vec!["Springfield".to_string(), "IL".to_string()]))
        );
    }

    #[test]
    fn test_match_list_transform() {
        let re = Regex::new(r"\b[a-z.]+@[a-z]+\.com\b").unwrap();
        let value = Transform::MatchList
            .apply(&re, "Write a.b@lot.com, a.b@lot.com or c@bid.com", &ctx())
            .unwrap();
        assert_eq!(
            value,
            Some(FieldValue::List(vec!["a.b@lot.com".to_string(), "c@bid.com".to_string()]))
        );
        assert_eq!(Transform::MatchList.apply(&re, "no mail", &ctx()).unwrap(), None);
    }

    #[test]
    fn test_every_transform_applies_without_panicking() {
        let re = Regex::new(r"(?P<value>(?P<amount>\d+) (?P<unit>days))").unwrap();
        let transforms = [
            Transform::Text,
            Transform::Date { formats: formats(&["%m/%d/%Y"]) },
            Transform::RelativeDate,
            Transform::NamedDay,
            Transform::NameList,
            Transform::MatchList,
            Transform::UrlList { allowed_suffixes: formats(&["com"]) },
            Transform::Captures { groups: formats(&["amount", "unit"]) },
            Transform::Count,
        ];

        for transform in &transforms {
            let outcome = transform.apply(&re, "posted 3 days ago", &ctx());
            match transform {
                Transform::Text | Transform::MatchList => {
                    assert!(outcome.unwrap().is_some(), "{:?}", transform)
                }
                Transform::Count => assert_eq!(outcome.unwrap(), Some(FieldValue::Count(1))),
                Transform::UrlList { .. } | Transform::NameList => {
                    assert_eq!(outcome.unwrap(), None, "{:?}", transform)
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_output_kinds() {
        assert_eq!(Transform::Text.output_kind(), FieldKind::Text);
        assert_eq!(Transform::NameList.output_kind(), FieldKind::List);
        assert_eq!(Transform::MatchList.output_kind(), FieldKind::List);
        assert_eq!(Transform::Count.output_kind(), FieldKind::Count);
        assert_eq!(Transform::RelativeDate.required_groups(), vec!["amount", "unit"]);
    }
}
