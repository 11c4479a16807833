// 🎯 Field Extractor
// Apply one FieldRule to normalized text: first matcher that succeeds wins

use crate::patterns::{FieldKind, FieldRule};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Provenance reported when no matcher produced a value.
pub const PROVENANCE_NONE: &str = "none";

// ============================================================================
// FIELD VALUE
// ============================================================================

/// Typed value of a field. Serializes as a bare string, array or integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Count(usize),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Default for a kind: `""`, `[]` or `0`
    pub fn default_for(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => FieldValue::Text(String::new()),
            FieldKind::List => FieldValue::List(Vec::new()),
            FieldKind::Count => FieldValue::Count(0),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::List(_) => FieldKind::List,
            FieldValue::Count(_) => FieldKind::Count,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Count(n) => *n == 0,
        }
    }

    /// Text value, or `""` for other kinds
    pub fn as_text(&self) -> &str {
        match self {
            FieldValue::Text(s) => s,
            _ => "",
        }
    }

    /// List value, or an empty slice for other kinds
    pub fn as_list(&self) -> &[String] {
        match self {
            FieldValue::List(items) => items,
            _ => &[],
        }
    }

    /// Count value; lists report their length, text reports 0
    pub fn as_count(&self) -> usize {
        match self {
            FieldValue::Count(n) => *n,
            FieldValue::List(items) => items.len(),
            FieldValue::Text(_) => 0,
        }
    }

    /// Flat string for tabular export; lists are joined with "; "
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items.join("; "),
            FieldValue::Count(n) => n.to_string(),
        }
    }
}

// ============================================================================
// FIELD RESULT
// ============================================================================

/// Outcome of applying one rule to one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResult {
    pub value: FieldValue,

    /// Winning matcher id, or "none"
    pub provenance: String,

    pub found: bool,

    /// Winning matcher's confidence, 0.0 when not found
    pub confidence: f64,
}

impl FieldResult {
    pub fn found(value: FieldValue, provenance: impl Into<String>, confidence: f64) -> Self {
        FieldResult {
            value,
            provenance: provenance.into(),
            found: true,
            confidence,
        }
    }

    pub fn missing(kind: FieldKind) -> Self {
        FieldResult {
            value: FieldValue::default_for(kind),
            provenance: PROVENANCE_NONE.to_string(),
            found: false,
            confidence: 0.0,
        }
    }
}

// ============================================================================
// EXTRACTION CONTEXT
// ============================================================================

/// Per-run inputs that are not part of the text itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionContext {
    /// "Now" for relative dates such as "3 days ago"
    pub reference_date: NaiveDate,

    /// Records below this completeness are flagged for review
    pub review_threshold: f64,
}

impl ExtractionContext {
    pub fn new(reference_date: NaiveDate) -> Self {
        ExtractionContext {
            reference_date,
            review_threshold: 0.5,
        }
    }

    /// Context anchored at today's local date
    pub fn today() -> Self {
        ExtractionContext::new(Local::now().date_naive())
    }

    pub fn with_review_threshold(mut self, threshold: f64) -> Self {
        self.review_threshold = threshold;
        self
    }
}

impl Default for ExtractionContext {
    fn default() -> Self {
        Self::today()
    }
}

// ============================================================================
// EXTRACT
// ============================================================================

/// Apply `rule` to `text`.
///
/// Matchers run in declared order. A matcher that does not match, yields an
/// empty value, or whose transform rejects every candidate is skipped; the
/// first one that produces a value wins and later matchers are never tried.
/// Never fails: with no winner the result carries the kind's default value,
/// `found = false` and provenance `"none"`.
pub fn extract(rule: &FieldRule, text: &str, ctx: &ExtractionContext) -> FieldResult {
    for matcher in rule.matchers() {
        let prepared = matcher.prepare(text);

        match matcher.transform().apply(matcher.regex(), &prepared, ctx) {
            Ok(Some(value)) => {
                debug!(field = rule.name(), matcher = matcher.id(), "field resolved");
                return FieldResult::found(value, matcher.id(), matcher.confidence());
            }
            Ok(None) => {
                trace!(field = rule.name(), matcher = matcher.id(), "no match");
            }
            Err(err) => {
                trace!(
                    field = rule.name(),
                    matcher = matcher.id(),
                    error = %err,
                    "transform rejected candidates"
                );
            }
        }
    }

    debug!(field = rule.name(), "field not found");
    FieldResult::missing(rule.kind())
}

// ============================================================================
// TESTS
// ============================================================================
