// 📚 Pattern Library - Rules as Data
// Named field rules, each an ordered list of regex matchers with transforms

use crate::error::ConfigError;
use crate::extractor::PROVENANCE_NONE;
use crate::normalizer;
use crate::transforms::Transform;
use anyhow::{Context as AnyhowContext, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// Default rule table, embedded at compile time.
const DEFAULT_RULES_JSON: &str = include_str!("default_rules.json");

static STANDARD: LazyLock<PatternLibrary> = LazyLock::new(|| {
    PatternLibrary::from_json(DEFAULT_RULES_JSON).expect("embedded rule table is valid")
});

// ============================================================================
// FIELD KIND
// ============================================================================

/// Declared value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    List,
    Count,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::List => "list",
            FieldKind::Count => "count",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RULE DEFINITION (serialized form)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Matcher ID, reported as provenance when it wins
    pub id: String,

    /// Regex; a `value` group, when present, selects the part to transform
    pub pattern: String,

    pub transform: Transform,

    #[serde(default)]
    pub case_insensitive: bool,

    /// Replace `,.-` and newlines with spaces before matching
    #[serde(default)]
    pub strip_punctuation: bool,

    /// Confidence score (0.0 - 1.0)
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.8
}

impl MatcherConfig {
    pub fn new(id: impl Into<String>, pattern: impl Into<String>, transform: Transform) -> Self {
        MatcherConfig {
            id: id.into(),
            pattern: pattern.into(),
            transform,
            case_insensitive: false,
            strip_punctuation: false,
            confidence: default_confidence(),
        }
    }

    /// Builder: match regardless of case
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Builder: set confidence score
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub field: String,
    pub kind: FieldKind,

    #[serde(default)]
    pub description: String,

    /// Priority order: first entry is tried first
    #[serde(default)]
    pub matchers: Vec<MatcherConfig>,
}

// ============================================================================
// COMPILED MATCHER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Matcher {
    id: String,
    regex: Regex,
    transform: Transform,
    strip_punctuation: bool,
    confidence: f64,
}

impl Matcher {
    fn compile(field: &str, kind: FieldKind, config: MatcherConfig) -> Result<Self, ConfigError> {
        if config.id.trim().is_empty() || config.id == PROVENANCE_NONE {
            return Err(ConfigError::InvalidMatcherId {
                field: field.to_string(),
                matcher: config.id,
            });
        }

        let found = config.transform.output_kind();
        if found != kind {
            return Err(ConfigError::KindMismatch {
                field: field.to_string(),
                matcher: config.id,
                expected: kind,
                found,
            });
        }

        if !(0.0..=1.0).contains(&config.confidence) {
            return Err(ConfigError::InvalidConfidence {
                field: field.to_string(),
                matcher: config.id,
                value: config.confidence,
            });
        }

        let regex = RegexBuilder::new(&config.pattern)
            .case_insensitive(config.case_insensitive)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                field: field.to_string(),
                matcher: config.id.clone(),
                source,
            })?;

        for group in config.transform.required_groups() {
            if !regex.capture_names().flatten().any(|name| name == group) {
                return Err(ConfigError::MissingGroup {
                    field: field.to_string(),
                    matcher: config.id,
                    group: group.to_string(),
                });
            }
        }

        Ok(Matcher {
            id: config.id,
            regex,
            transform: config.transform,
            strip_punctuation: config.strip_punctuation,
            confidence: config.confidence,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Text this matcher actually runs against.
    pub fn prepare<'t>(&self, text: &'t str) -> std::borrow::Cow<'t, str> {
        if self.strip_punctuation {
            std::borrow::Cow::Owned(normalizer::strip_punctuation(text))
        } else {
            std::borrow::Cow::Borrowed(text)
        }
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

// ============================================================================
// FIELD RULE
// ============================================================================

/// A named extraction target bound to matchers in priority order.
#[derive(Debug, Clone)]
pub struct FieldRule {
    name: String,
    kind: FieldKind,
    description: String,
    matchers: Vec<Matcher>,
}

impl FieldRule {
    /// A rule with no matchers: valid, always reports "not found".
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyFieldName);
        }
        Ok(FieldRule {
            name,
            kind,
            description: String::new(),
            matchers: Vec::new(),
        })
    }

    pub fn from_config(config: RuleConfig) -> Result<Self, ConfigError> {
        let mut rule = FieldRule::new(config.field, config.kind)?;
        rule.description = config.description;
        for matcher in config.matchers {
            rule = rule.with_matcher(matcher)?;
        }
        Ok(rule)
    }

    /// Builder: append a matcher at the lowest priority
    pub fn with_matcher(mut self, config: MatcherConfig) -> Result<Self, ConfigError> {
        if self.matchers.iter().any(|m| m.id == config.id) {
            return Err(ConfigError::DuplicateMatcher {
                field: self.name.clone(),
                matcher: config.id,
            });
        }
        let matcher = Matcher::compile(&self.name, self.kind, config)?;
        self.matchers.push(matcher);
        Ok(self)
    }

    /// Builder: add description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    pub fn is_noop(&self) -> bool {
        self.matchers.is_empty()
    }
}

// ============================================================================
// PATTERN LIBRARY
// ============================================================================

/// Read-only registry of field rules, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    rules: Vec<FieldRule>,
    index: HashMap<String, usize>,
}

impl PatternLibrary {
    /// The built-in notice/post rule table, compiled once per process.
    pub fn standard() -> &'static PatternLibrary {
        &STANDARD
    }

    /// Create an empty library
    pub fn new() -> Self {
        PatternLibrary::default()
    }

    /// Build from a JSON rule table
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let configs: Vec<RuleConfig> = serde_json::from_str(json)?;
        PatternLibrary::from_configs(configs)
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        PatternLibrary::from_json(&content)
            .with_context(|| format!("Invalid rules file: {:?}", path.as_ref()))
    }

    pub fn from_configs(configs: Vec<RuleConfig>) -> Result<Self, ConfigError> {
        configs
            .into_iter()
            .try_fold(PatternLibrary::new(), |library, config| {
                library.with_rule(FieldRule::from_config(config)?)
            })
    }

    /// Add a field; existing fields are untouched
    pub fn with_rule(mut self, rule: FieldRule) -> Result<Self, ConfigError> {
        if fields::DERIVED_LOCATION_FIELDS.contains(&rule.name()) {
            return Err(ConfigError::ReservedField(rule.name().to_string()));
        }
        if self.index.contains_key(rule.name()) {
            return Err(ConfigError::DuplicateField(rule.name().to_string()));
        }
        self.index.insert(rule.name().to_string(), self.rules.len());
        self.rules.push(rule);
        Ok(self)
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    pub fn get(&self, field: &str) -> Option<&FieldRule> {
        self.index.get(field).map(|&i| &self.rules[i])
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// Field names of the built-in table.
pub mod fields {
    pub const NOTICE_DATE: &str = "notice_date";
    pub const PUBLICATION_NAME: &str = "publication_name";
    pub const LOCATION_NAME: &str = "location_name";
    pub const STREET_ADDRESS: &str = "street_address";
    pub const CITY_STATE_ZIP: &str = "city_state_zip";
    pub const AUCTION_SITES: &str = "auction_sites";
    pub const ALL_TENANTS: &str = "all_tenants";
    pub const TENANT_MENTIONS: &str = "tenant_mentions";
    pub const EMAILS: &str = "emails";
    pub const PHONES: &str = "phones";

    /// Text fields the assembler splits out of `city_state_zip`, in capture order.
    pub const DERIVED_LOCATION_FIELDS: [&str; 3] = ["city", "state", "zip_code"];
}

// ============================================================================
// TESTS
// ============================================================================
