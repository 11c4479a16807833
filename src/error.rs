// 🚨 Error Taxonomy
// Configuration errors are fatal, transform errors stay inside the extractor,
// item errors become FailureEntry values at the batch boundary.

use crate::patterns::FieldKind;
use thiserror::Error;

// ============================================================================
// CONFIGURATION ERRORS (Pattern Library construction)
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse rule table: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("field `{0}` is declared more than once")]
    DuplicateField(String),

    #[error("field name must not be empty")]
    EmptyFieldName,

    #[error("field `{0}` is derived from city_state_zip and cannot be declared")]
    ReservedField(String),

    #[error("field `{field}`: matcher id `{matcher}` is used more than once")]
    DuplicateMatcher { field: String, matcher: String },

    #[error("field `{field}`: matcher id `{matcher}` is empty or reserved")]
    InvalidMatcherId { field: String, matcher: String },

    #[error("field `{field}`: matcher `{matcher}` has an invalid pattern")]
    InvalidPattern {
        field: String,
        matcher: String,
        #[source]
        source: regex::Error,
    },

    #[error("field `{field}`: matcher `{matcher}` produces {found} values, field expects {expected}")]
    KindMismatch {
        field: String,
        matcher: String,
        expected: FieldKind,
        found: FieldKind,
    },

    #[error("field `{field}`: matcher `{matcher}` needs capture group `{group}`")]
    MissingGroup {
        field: String,
        matcher: String,
        group: String,
    },

    #[error("field `{field}`: matcher `{matcher}` confidence {value} is outside 0.0..=1.0")]
    InvalidConfidence {
        field: String,
        matcher: String,
        value: f64,
    },
}

// ============================================================================
// TRANSFORM ERRORS (absorbed by the Field Extractor)
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("candidate `{0}` matches no configured date format")]
    UnparsableDate(String),

    #[error("relative date `{0}` cannot be resolved")]
    UnresolvableRelativeDate(String),

    #[error("capture group `{0}` did not participate in the match")]
    MissingCapture(String),
}

// ============================================================================
// ITEM ERRORS (converted to FailureEntry by the Batch Runner)
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ItemError {
    #[error("payload is {0}, expected text or HTML")]
    NotText(&'static str),

    #[error("processing panicked: {0}")]
    Panicked(String),
}
