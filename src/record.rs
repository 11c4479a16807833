// 🧩 Record Assembler
// One RawItem → normalized once → one FieldResult per rule → derived fields

use crate::batch::RawItem;
use crate::error::ItemError;
use crate::extractor::{extract, ExtractionContext, FieldResult, FieldValue};
use crate::normalizer;
use crate::patterns::fields::{self, DERIVED_LOCATION_FIELDS};
use crate::patterns::{FieldKind, PatternLibrary};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

// ============================================================================
// RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Position of the source item in the batch input
    pub index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    /// Declared fields plus derived location fields, keyed by name
    pub fields: BTreeMap<String, FieldResult>,

    pub count_of_tenants: usize,
    pub auction_sites_count: usize,

    /// Share of declared fields that were found (0.0 - 1.0)
    pub completeness: f64,
    pub needs_review: bool,

    /// SHA-256 of the normalized text, for spotting repeated notices
    pub fingerprint: String,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&FieldResult> {
        self.fields.get(field)
    }

    pub fn is_found(&self, field: &str) -> bool {
        self.get(field).is_some_and(|r| r.found)
    }

    /// Text value of a field, `""` when absent
    pub fn text(&self, field: &str) -> &str {
        self.get(field).map(|r| r.value.as_text()).unwrap_or("")
    }

    /// List value of a field, empty when absent
    pub fn list(&self, field: &str) -> &[String] {
        self.get(field).map(|r| r.value.as_list()).unwrap_or(&[])
    }

    /// Fields whose rules produced nothing
    pub fn missing_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, r)| !r.found)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "#{} completeness {:.0}%, {} tenants, {} auction sites{}",
            self.index,
            self.completeness * 100.0,
            self.count_of_tenants,
            self.auction_sites_count,
            if self.needs_review { " (needs review)" } else { "" }
        )
    }
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// Build the record for one item.
///
/// Only a structurally unusable payload (not a string) is an error; every
/// field-level problem shows up as `found = false` on that field instead.
pub fn assemble(
    index: usize,
    item: &RawItem,
    library: &PatternLibrary,
    ctx: &ExtractionContext,
) -> Result<Record, ItemError> {
    let raw = item.as_text()?;
    let text = normalizer::normalize(raw);

    let mut results: BTreeMap<String, FieldResult> = library
        .rules()
        .iter()
        .map(|rule| (rule.name().to_string(), extract(rule, &text, ctx)))
        .collect();

    let declared = results.len();
    let found = results.values().filter(|r| r.found).count();
    let completeness = if declared == 0 {
        0.0
    } else {
        found as f64 / declared as f64
    };

    if let Some(combined) = results.get(fields::CITY_STATE_ZIP).cloned() {
        for (name, result) in split_location(&combined) {
            results.insert(name.to_string(), result);
        }
    }

    let count_of_tenants = list_len(&results, fields::ALL_TENANTS);
    let auction_sites_count = list_len(&results, fields::AUCTION_SITES);

    Ok(Record {
        index,
        source_id: item.source_id.clone(),
        fields: results,
        count_of_tenants,
        auction_sites_count,
        completeness,
        needs_review: completeness < ctx.review_threshold,
        fingerprint: fingerprint(&text),
    })
}

/// `[city, state, zip]` → three text results sharing the combined provenance.
/// Anything other than exactly three parts yields three not-found results.
fn split_location(combined: &FieldResult) -> Vec<(&'static str, FieldResult)> {
    let parts = combined.value.as_list();

    DERIVED_LOCATION_FIELDS
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let result = match parts.get(i) {
                Some(part) if combined.found && parts.len() == 3 && !part.is_empty() => {
                    FieldResult::found(
                        FieldValue::Text(part.clone()),
                        combined.provenance.clone(),
                        combined.confidence,
                    )
                }
                _ => FieldResult::missing(FieldKind::Text),
            };
            (*name, result)
        })
        .collect()
}

fn list_len(fields: &BTreeMap<String, FieldResult>, name: &str) -> usize {
    fields.get(name).map(|r| r.value.as_list().len()).unwrap_or(0)
}

/// SHA-256 hex digest of normalized text
pub fn fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{FieldRule, MatcherConfig};
    use crate::transforms::Transform;
    use chrono::NaiveDate;

    fn ctx() -> ExtractionContext {
        ExtractionContext::new(NaiveDate::from_ymd_opt(2025, 3, 27).unwrap())
    }

    fn assemble_text(text: &str) -> Record {
        assemble(0, &RawItem::text(text), PatternLibrary::standard(), &ctx()).unwrap()
    }

    #[test]
    fn test_full_notice() {
        let record = assemble_text(
            "Notice Date: 03/27/2025. Storage Auction at 123 Main St, Springfield, IL 62704. \
             Tenants: John Doe, Jane Roe.",
        );

        assert_eq!(record.text("notice_date"), "2025-03-27");
        assert_eq!(record.text("street_address"), "123 Main St");
        assert_eq!(record.text("city"), "Springfield");
        assert_eq!(record.text("state"), "IL");
        assert_eq!(record.text("zip_code"), "62704");
        assert!(record.text("location_name").contains("Storage Auction"));
        assert_eq!(record.list("all_tenants"), &["John Doe", "Jane Roe"]);
        assert_eq!(record.count_of_tenants, 2);
        assert_eq!(record.auction_sites_count, 0);
        assert!(!record.needs_review);
    }

    #[test]
    fn test_publication_and_contacts() {
        let record = assemble_text(
            "<div class=\"panel-heading\"><h4>Daily Herald</h4></div>\
             <p>Public Storage, 88 Harbor Blvd Long Beach CA 90802.</p>\
             <p>Call (562) 555-0142 or write manager@publicstorage.com</p>",
        );

        assert_eq!(record.text("publication_name"), "Daily Herald");
        assert_eq!(record.text("street_address"), "88 Harbor Blvd");
        assert_eq!(record.text("city"), "Long Beach");
        assert_eq!(record.list("emails"), &["manager@publicstorage.com"]);
        assert_eq!(record.list("phones"), &["(562) 555-0142"]);
        assert_eq!(record.auction_sites_count, 0);
    }

    #[test]
    fn test_derived_location_inherits_provenance() {
        let record = assemble_text("Sold at 1 Elm St, Dover, DE 19901");
        let city = record.get("city").unwrap();
        assert!(city.found);
        assert_eq!(city.provenance, "combined");
        assert_eq!(city.confidence, record.get("city_state_zip").unwrap().confidence);
    }

    #[test]
    fn test_missing_location_derives_missing_fields() {
        let record = assemble_text("General announcement with no structured fields.");
        for name in DERIVED_LOCATION_FIELDS {
            let result = record.get(name).unwrap();
            assert!(!result.found);
            assert_eq!(result.value, FieldValue::Text(String::new()));
        }
    }

    #[test]
    fn test_no_structured_fields() {
        let record = assemble_text("General announcement with no structured fields.");

        assert!(record.fields.values().all(|r| !r.found));
        assert_eq!(record.text("notice_date"), "");
        assert!(record.list("all_tenants").is_empty());
        assert_eq!(record.get("tenant_mentions").unwrap().value, FieldValue::Count(0));
        assert_eq!(record.count_of_tenants, 0);
        assert_eq!(record.completeness, 0.0);
        assert!(record.needs_review);
        assert_eq!(record.missing_fields().len(), record.fields.len());
    }

    #[test]
    fn test_count_matches_tenant_list() {
        let record = assemble_text("Tenants: A Smith, B Jones, C Brown. Tenant goods sold.");
        assert_eq!(record.count_of_tenants, record.list("all_tenants").len());
        assert_eq!(record.count_of_tenants, 3);
        assert_eq!(record.get("tenant_mentions").unwrap().value, FieldValue::Count(2));
    }

    #[test]
    fn test_auction_sites_count() {
        let record = assemble_text("Bid at www.storagetreasures.com and lockerfox.com today");
        assert_eq!(record.auction_sites_count, 2);
        assert_eq!(record.auction_sites_count, record.list("auction_sites").len());
    }

    #[test]
    fn test_non_text_payload_is_item_error() {
        let item = RawItem::from_value(serde_json::Value::Null);
        let err = assemble(3, &item, PatternLibrary::standard(), &ctx()).unwrap_err();
        assert_eq!(err, ItemError::NotText("null"));
    }

    #[test]
    fn test_empty_text_is_usable() {
        let record = assemble_text("");
        assert!(record.fields.values().all(|r| !r.found));
        assert_eq!(record.fingerprint, fingerprint(""));
    }

    #[test]
    fn test_fingerprint_ignores_whitespace_differences() {
        let a = assemble_text("Storage   Auction\n today");
        let b = assemble_text("Storage Auction today");
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
    }

    #[test]
    fn test_custom_library_without_derived_sources() {
        let library = PatternLibrary::new()
            .with_rule(
                FieldRule::new("phone", FieldKind::Text)
                    .unwrap()
                    .with_matcher(MatcherConfig::new("us", r"\(\d{3}\) \d{3}-\d{4}", Transform::Text))
                    .unwrap(),
            )
            .unwrap();

        let record = assemble(0, &RawItem::text("Call (555) 123-4567"), &library, &ctx()).unwrap();
        assert_eq!(record.text("phone"), "(555) 123-4567");
        assert_eq!(record.count_of_tenants, 0);
        assert!(record.get("city").is_none());
        assert_eq!(record.completeness, 1.0);
    }

    #[test]
    fn test_source_id_carried() {
        let item = RawItem::text("x").with_source("panel-7");
        let record = assemble(7, &item, PatternLibrary::standard(), &ctx()).unwrap();
        assert_eq!(record.source_id.as_deref(), Some("panel-7"));
        assert_eq!(record.index, 7);
    }
}
