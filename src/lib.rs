// Notice Extract - Core Library
// Structured-field extraction from notice text: normalize → match → assemble → batch

pub mod error;
pub mod normalizer;  // Text Normalizer
pub mod transforms;  // capture → typed value
pub mod patterns;    // Pattern Library - rules as data
pub mod extractor;   // Field Extractor - first matcher wins
pub mod record;      // Record Assembler
pub mod batch;       // Batch Runner
pub mod export;      // JSON / JSONL / CSV glue

// Re-export commonly used types
pub use error::{ConfigError, ItemError, TransformError};
pub use normalizer::normalize;
pub use transforms::Transform;
pub use patterns::{
    fields, FieldKind, FieldRule, Matcher, MatcherConfig, PatternLibrary, RuleConfig,
};
pub use extractor::{extract, ExtractionContext, FieldResult, FieldValue, PROVENANCE_NONE};
pub use record::{assemble, Record};
pub use batch::{
    run_batch, BatchOptions, BatchResult, BatchRunner, BatchSummary, FailureEntry, RawItem,
};
pub use export::{load_items, parse_items, write_csv, write_json};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
