// 📦 Batch Runner
// Every RawItem → exactly one Record or one FailureEntry, never both

use crate::error::ItemError;
use crate::extractor::ExtractionContext;
use crate::patterns::PatternLibrary;
use crate::record::{assemble, Record};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use tracing::{info, warn};

/// Object keys accepted as the payload of a RawItem, in lookup order.
const PAYLOAD_KEYS: [&str; 3] = ["payload", "text", "content"];

// ============================================================================
// RAW ITEM
// ============================================================================

/// One unprocessed input: text or HTML plus an optional source id.
///
/// The payload is kept as a JSON value so structurally unusable input
/// (null, numbers, objects) reaches the runner and is reported per item
/// instead of failing the whole load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    #[serde(default, alias = "text", alias = "content")]
    pub payload: Value,
}

impl RawItem {
    pub fn text(text: impl Into<String>) -> Self {
        RawItem {
            source_id: None,
            payload: Value::String(text.into()),
        }
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Lenient conversion from arbitrary JSON.
    ///
    /// An object carrying a `payload`/`text`/`content` key is read as a
    /// RawItem; any other value is taken as the payload itself.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) if PAYLOAD_KEYS.iter().any(|k| map.contains_key(*k)) => {
                let payload = PAYLOAD_KEYS
                    .iter()
                    .find_map(|k| map.remove(*k))
                    .unwrap_or(Value::Null);
                let source_id = match map.remove("source_id") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s),
                    Some(other) => Some(other.to_string()),
                };
                RawItem { source_id, payload }
            }
            other => RawItem {
                source_id: None,
                payload: other,
            },
        }
    }

    /// Borrow the text, or report what the payload is instead
    pub fn as_text(&self) -> Result<&str, ItemError> {
        match &self.payload {
            Value::String(s) => Ok(s),
            Value::Null => Err(ItemError::NotText("null")),
            Value::Bool(_) => Err(ItemError::NotText("a boolean")),
            Value::Number(_) => Err(ItemError::NotText("a number")),
            Value::Array(_) => Err(ItemError::NotText("an array")),
            Value::Object(_) => Err(ItemError::NotText("an object")),
        }
    }
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    /// Position of the failed item in the batch input
    pub index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub records: Vec<Record>,
    pub failures: Vec<FailureEntry>,
}

impl BatchResult {
    /// Number of input items this result accounts for
    pub fn total(&self) -> usize {
        self.records.len() + self.failures.len()
    }

    pub fn summary(&self) -> BatchSummary {
        let total = self.total();
        let record_count = self.records.len();

        let needs_review = self.records.iter().filter(|r| r.needs_review).count();

        let mut seen = HashSet::new();
        let duplicates = self
            .records
            .iter()
            .filter(|r| !seen.insert(r.fingerprint.as_str()))
            .count();

        let average_completeness = if record_count == 0 {
            0.0
        } else {
            self.records.iter().map(|r| r.completeness).sum::<f64>() / record_count as f64
        };

        let mut found_counts: BTreeMap<String, usize> = BTreeMap::new();
        for record in &self.records {
            for (name, result) in &record.fields {
                *found_counts.entry(name.clone()).or_insert(0) += usize::from(result.found);
            }
        }
        let field_found_rates = found_counts
            .into_iter()
            .map(|(name, found)| (name, found as f64 / record_count as f64))
            .collect();

        BatchSummary {
            total_items: total,
            record_count,
            failure_count: self.failures.len(),
            needs_review_count: needs_review,
            duplicate_count: duplicates,
            average_completeness,
            field_found_rates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_items: usize,
    pub record_count: usize,
    pub failure_count: usize,
    pub needs_review_count: usize,

    /// Records whose fingerprint was already seen earlier in the batch
    pub duplicate_count: usize,

    pub average_completeness: f64,

    /// Share of records in which each field was found
    pub field_found_rates: BTreeMap<String, f64>,
}

impl BatchSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} items: {} records, {} failures | {:.1}% completeness, {} need review, {} duplicates",
            self.total_items,
            self.record_count,
            self.failure_count,
            self.average_completeness * 100.0,
            self.needs_review_count,
            self.duplicate_count
        )
    }
}

// ============================================================================
// RUNNER
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOptions {
    /// Process items on the rayon pool instead of sequentially
    pub parallel: bool,

    /// Dedicated pool size; `None` uses rayon's global pool
    pub threads: Option<usize>,

    /// Anchor for relative dates; defaults to today
    pub reference_date: Option<NaiveDate>,
}

impl BatchOptions {
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.parallel = true;
        self.threads = Some(threads);
        self
    }

    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }
}

/// Runs batches against one immutable PatternLibrary.
///
/// The extraction context (and so "today" for relative dates) is fixed
/// when the runner is built, so repeated runs give identical output.
pub struct BatchRunner<'a> {
    library: &'a PatternLibrary,
    context: ExtractionContext,
    options: BatchOptions,
}

impl<'a> BatchRunner<'a> {
    pub fn new(library: &'a PatternLibrary) -> Self {
        Self::with_options(library, BatchOptions::default())
    }

    pub fn with_options(library: &'a PatternLibrary, options: BatchOptions) -> Self {
        let context = match options.reference_date {
            Some(date) => ExtractionContext::new(date),
            None => ExtractionContext::today(),
        };

        BatchRunner {
            library,
            context,
            options,
        }
    }

    pub fn with_review_threshold(mut self, threshold: f64) -> Self {
        self.context = self.context.with_review_threshold(threshold);
        self
    }

    pub fn context(&self) -> &ExtractionContext {
        &self.context
    }

    pub fn run_batch(&self, items: &[RawItem]) -> BatchResult {
        info!(
            items = items.len(),
            rules = self.library.rule_count(),
            parallel = self.options.parallel,
            "starting batch"
        );

        let outcomes = if self.options.parallel {
            self.run_parallel(items)
        } else {
            self.run_sequential(items)
        };

        let mut result = BatchResult::default();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(record) => result.records.push(record),
                Err(err) => {
                    let source_id = items[index].source_id.clone();
                    warn!(index, source_id = ?source_id, error = %err, "item failed");
                    result.failures.push(FailureEntry {
                        index,
                        source_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            records = result.records.len(),
            failures = result.failures.len(),
            "batch complete"
        );
        result
    }

    fn run_sequential(&self, items: &[RawItem]) -> Vec<Result<Record, ItemError>> {
        items
            .iter()
            .enumerate()
            .map(|(index, item)| self.process(index, item))
            .collect()
    }

    fn run_parallel(&self, items: &[RawItem]) -> Vec<Result<Record, ItemError>> {
        let collect = || {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| self.process(index, item))
                .collect::<Vec<_>>()
        };

        match self.options.threads {
            Some(threads) => match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                Ok(pool) => pool.install(collect),
                Err(err) => {
                    warn!(threads, error = %err, "could not build worker pool, running sequentially");
                    self.run_sequential(items)
                }
            },
            None => collect(),
        }
    }

    fn process(&self, index: usize, item: &RawItem) -> Result<Record, ItemError> {
        isolate(|| assemble(index, item, self.library, &self.context))
    }
}

/// Run `f`, turning a panic into `ItemError::Panicked`.
fn isolate<F>(f: F) -> Result<Record, ItemError>
where
    F: FnOnce() -> Result<Record, ItemError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ItemError::Panicked(message))
        }
    }
}

/// Sequential run with today's date as the relative-date anchor
pub fn run_batch(items: &[RawItem], library: &PatternLibrary) -> BatchResult {
    BatchRunner::new(library).run_batch(items)
}

// ============================================================================
// TESTS
// ============================================================================
