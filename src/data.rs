//! Core data types for the extraction engine.
//!
//! Field records are dynamic mappings whose key set is determined by the
//! request's schema at runtime, never nominal record types. Parser and
//! validation packs are plain data: patterns are strings compiled on use and
//! predicates are a tagged variant, so both serialize cleanly into the
//! repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// A per-request extraction result: field name to value, `None` meaning
/// "not found". The key set is always a subset of the request schema.
pub type FieldRecord = BTreeMap<String, Option<String>>;

/// Build an all-null record over the given schema
pub fn empty_record(schema: &Schema) -> FieldRecord {
    schema
        .fields()
        .map(|(name, _)| (name.to_string(), None))
        .collect()
}

/// Count the fields of `record` that hold a value
pub fn filled_count(record: &FieldRecord) -> usize {
    record.values().filter(|v| v.is_some()).count()
}

/// The extraction target: field names mapped to human-readable descriptions.
///
/// Construction enforces well-formedness: at least one field, no duplicate
/// names, and every name a non-empty identifier
/// (`[A-Za-z_][A-Za-z0-9_]*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: BTreeMap<String, String>,
}

impl Schema {
    /// Validate and build a schema from `(name, description)` pairs
    pub fn new<I, S, D>(pairs: I) -> crate::exceptions::ExtractResult<Self>
    where
        I: IntoIterator<Item = (S, D)>,
        S: Into<String>,
        D: Into<String>,
    {
        use crate::exceptions::ExtractError;

        let mut fields = BTreeMap::new();
        let mut any = false;
        for (name, description) in pairs {
            any = true;
            let name = name.into();
            if !is_identifier(&name) {
                return Err(ExtractError::invalid_schema(format!(
                    "field name '{}' is not an identifier",
                    name
                )));
            }
            if fields.insert(name.clone(), description.into()).is_some() {
                return Err(ExtractError::invalid_schema(format!(
                    "duplicate field name '{}'",
                    name
                )));
            }
        }
        if !any {
            return Err(ExtractError::invalid_schema("schema has no fields"));
        }
        Ok(Self { fields })
    }

    /// Iterate `(name, description)` pairs in field order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields in the schema
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no fields (never true for a validated schema)
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether `name` is one of the schema's fields
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// The description for `name`, if the field exists
    pub fn description(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    /// The schema's field names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// Restrict a record to this schema's key set, dropping foreign keys and
    /// filling absent fields with null
    pub fn restrict(&self, record: FieldRecord) -> FieldRecord {
        let mut out = empty_record(self);
        for (name, value) in record {
            if let Some(slot) = out.get_mut(&name) {
                *slot = value;
            }
        }
        out
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A single document to extract from, as delivered by the batch loader
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    /// Caller-supplied document class; the knowledge key
    pub label: String,
    /// Raw `(field, description)` pairs, validated per item so one bad schema
    /// cannot abort the batch
    pub schema: Vec<(String, String)>,
    /// The PDF bytes handed to the text source
    pub pdf_bytes: Vec<u8>,
    /// Batch-assigned position
    pub item_index: usize,
}

/// Which branch of the orchestrator's decision tree handled an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathTaken {
    /// Cold start, heuristic sufficient; learning runs in the background
    ColdHeuristic,
    /// Cached knowledge, confidence at or above the accept threshold
    CachedHighConfidence,
    /// Cached knowledge, low confidence; missing fields filled by the LLM
    CachedRefinement,
    /// Cold start, heuristic insufficient; synchronous LLM extraction
    ColdLlm,
}

impl PathTaken {
    /// The path number used in batch annotations
    pub fn number(&self) -> u8 {
        match self {
            PathTaken::ColdHeuristic => 1,
            PathTaken::CachedHighConfidence => 2,
            PathTaken::CachedRefinement => 3,
            PathTaken::ColdLlm => 4,
        }
    }
}

impl std::fmt::Display for PathTaken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Per-label mapping from field name to a regex with at least one capture
/// group; the first capture is the extracted value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserPack {
    pub patterns: BTreeMap<String, String>,
}

impl ParserPack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields the pack can parse
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Character classes a validation predicate can require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharClass {
    /// ASCII digits only
    Digits,
    /// Alphabetic characters and internal spaces
    Letters,
    /// Letters and digits, no punctuation
    Alphanumeric,
}

impl CharClass {
    fn matches(&self, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        match self {
            CharClass::Digits => value.chars().all(|c| c.is_ascii_digit()),
            CharClass::Letters => value.chars().all(|c| c.is_alphabetic() || c == ' '),
            CharClass::Alphanumeric => value.chars().all(|c| c.is_alphanumeric()),
        }
    }
}

/// A conservative validation predicate, persisted as a discriminated
/// structure rather than executable code.
///
/// Predicates encode only properties observed in the gabarito. Evaluation is
/// total: any string input yields `true` or `false`, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredicateSpec {
    /// Value length must fall inside the inclusive range
    LengthRange { min: usize, max: usize },
    /// Value must consist of the given character class, with bounded length
    CharacterClass {
        class: CharClass,
        min_len: usize,
        max_len: usize,
    },
    /// Value must equal one of the enumerated alternatives (case-insensitive)
    EnumeratedSet { values: Vec<String> },
    /// Value must reproduce the gabarito's shape: digits as `9`, letters as
    /// `A`, everything else literal
    FormatTemplate { mask: String },
    /// Value must be non-empty after trimming
    NonEmpty,
}

impl PredicateSpec {
    /// Evaluate the predicate against a candidate value
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            PredicateSpec::LengthRange { min, max } => {
                let n = value.chars().count();
                n >= *min && n <= *max
            }
            PredicateSpec::CharacterClass {
                class,
                min_len,
                max_len,
            } => {
                let n = value.chars().count();
                n >= *min_len && n <= *max_len && class.matches(value)
            }
            PredicateSpec::EnumeratedSet { values } => {
                let candidate = value.trim();
                values
                    .iter()
                    .any(|v| v.trim().eq_ignore_ascii_case(candidate))
            }
            PredicateSpec::FormatTemplate { mask } => &format_mask(value) == mask,
            PredicateSpec::NonEmpty => !value.trim().is_empty(),
        }
    }
}

/// Collapse a value to its shape mask: digit runs keep their length as `9`s,
/// letters become `A`, whitespace becomes a single space, punctuation stays
pub fn format_mask(value: &str) -> String {
    let mut mask = String::with_capacity(value.len());
    let mut last_was_space = false;
    for c in value.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                mask.push(' ');
            }
            last_was_space = true;
            continue;
        }
        last_was_space = false;
        if c.is_ascii_digit() {
            mask.push('9');
        } else if c.is_alphabetic() {
            mask.push('A');
        } else {
            mask.push(c);
        }
    }
    mask
}

/// Per-label mapping from field name to its validation predicate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPack {
    pub rules: BTreeMap<String, PredicateSpec>,
}

impl ValidationPack {
    pub fn new() -> Self {
        Self::default()
    }

    /// The predicate for `field`, if one was generated
    pub fn rule(&self, field: &str) -> Option<&PredicateSpec> {
        self.rules.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A versioned unit of per-label knowledge as stored in the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub label: String,
    /// Strictly increasing; a higher version atomically supersedes
    pub version: u32,
    pub parser: ParserPack,
    pub validation: ValidationPack,
    /// Content digest of the gabarito the packs were generated from
    pub gabarito_digest: Uuid,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    /// Assemble an entry, stamping it with the gabarito's content digest
    pub fn new(
        label: impl Into<String>,
        version: u32,
        parser: ParserPack,
        validation: ValidationPack,
        gabarito: &FieldRecord,
    ) -> Self {
        Self {
            label: label.into(),
            version,
            parser,
            validation,
            gabarito_digest: gabarito_digest(gabarito),
            created_at: Utc::now(),
        }
    }
}

/// Content-addressed digest of a gabarito via a name-based UUID
pub fn gabarito_digest(gabarito: &FieldRecord) -> Uuid {
    let canonical = serde_json::to_vec(gabarito).unwrap_or_default();
    Uuid::new_v5(&Uuid::NAMESPACE_OID, &canonical)
}

/// Batch annotation for one processed item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub item_index: usize,
    pub label: String,
    /// Extracted values; all-null when the item failed
    pub record: FieldRecord,
    /// Branch taken, absent when the item failed before routing
    pub path: Option<PathTaken>,
    pub elapsed_s: f64,
    pub cache_hit: bool,
    /// Confidence of the returned record against the live validation pack
    pub confidence: f64,
    /// Estimated monetary cost; always 0.0 on paths 1 and 2
    pub estimated_cost: f64,
    /// Set when the LLM call was cancelled or degraded mid-item
    pub degraded: bool,
    /// Per-item fatal failure message (invalid schema, unreadable PDF)
    pub failure: Option<String>,
}

impl ItemReport {
    /// Report for an item that failed before routing
    pub fn failed(item_index: usize, label: String, elapsed_s: f64, message: String) -> Self {
        Self {
            item_index,
            label,
            record: FieldRecord::new(),
            path: None,
            elapsed_s,
            cache_hit: false,
            confidence: 0.0,
            estimated_cost: 0.0,
            degraded: false,
            failure: Some(message),
        }
    }

    /// Whether the item completed without a fatal failure
    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }
}

/// Names of fields whose values failed validation, reported by the
/// confidence calculator
pub type FailingFields = BTreeSet<String>;

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            ("nome", "Full name of the lawyer"),
            ("cpf", "CPF number"),
        ])
        .unwrap()
    }

    #[test]
    fn test_schema_rejects_empty() {
        let err = Schema::new(Vec::<(String, String)>::new()).unwrap_err();
        assert!(err.is_item_fatal());
    }

    #[test]
    fn test_schema_rejects_duplicates() {
        let result = Schema::new(vec![("cpf", "one"), ("cpf", "two")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_schema_rejects_non_identifier() {
        assert!(Schema::new(vec![("not a field", "desc")]).is_err());
        assert!(Schema::new(vec![("", "desc")]).is_err());
        assert!(Schema::new(vec![("9lives", "desc")]).is_err());
        assert!(Schema::new(vec![("_ok", "desc")]).is_ok());
    }

    #[test]
    fn test_restrict_drops_foreign_keys() {
        let s = schema();
        let mut record = FieldRecord::new();
        record.insert("cpf".to_string(), Some("123".to_string()));
        record.insert("intruder".to_string(), Some("x".to_string()));
        let restricted = s.restrict(record);
        assert_eq!(restricted.len(), 2);
        assert!(!restricted.contains_key("intruder"));
        assert_eq!(restricted["cpf"], Some("123".to_string()));
        assert_eq!(restricted["nome"], None);
    }

    #[test]
    fn test_format_mask() {
        assert_eq!(format_mask("123.456.789-00"), "999.999.999-99");
        assert_eq!(format_mask("12/05/2023"), "99/99/9999");
        assert_eq!(format_mask("Ana  Souza"), "AAA AAAAA");
    }

    #[test]
    fn test_predicates_are_total() {
        let specs = vec![
            PredicateSpec::LengthRange { min: 1, max: 5 },
            PredicateSpec::CharacterClass {
                class: CharClass::Digits,
                min_len: 2,
                max_len: 4,
            },
            PredicateSpec::EnumeratedSet {
                values: vec!["ADVOGADO".to_string(), "ADVOGADA".to_string()],
            },
            PredicateSpec::FormatTemplate {
                mask: "999.999.999-99".to_string(),
            },
            PredicateSpec::NonEmpty,
        ];
        for spec in &specs {
            // None of these may panic, whatever the input
            spec.accepts("");
            spec.accepts("çã-💥 weird ключ");
            spec.accepts(&"x".repeat(10_000));
        }
    }

    #[test]
    fn test_enumerated_set_case_insensitive() {
        let spec = PredicateSpec::EnumeratedSet {
            values: vec!["ADVOGADO".to_string(), "ADVOGADA".to_string()],
        };
        assert!(spec.accepts("advogada"));
        assert!(spec.accepts(" ADVOGADO "));
        assert!(!spec.accepts("ESTAGIARIO"));
    }

    #[test]
    fn test_format_template_rejects_malformed() {
        let spec = PredicateSpec::FormatTemplate {
            mask: "999.999.999-99".to_string(),
        };
        assert!(spec.accepts("987.654.321-00"));
        assert!(!spec.accepts("987.654.321/00"));
        assert!(!spec.accepts("987654321-00"));
        assert!(!spec.accepts(""));
    }

    #[test]
    fn test_gabarito_digest_is_content_addressed() {
        let mut a = FieldRecord::new();
        a.insert("cpf".to_string(), Some("123".to_string()));
        let mut b = FieldRecord::new();
        b.insert("cpf".to_string(), Some("123".to_string()));
        assert_eq!(gabarito_digest(&a), gabarito_digest(&b));

        b.insert("cpf".to_string(), Some("124".to_string()));
        assert_ne!(gabarito_digest(&a), gabarito_digest(&b));
    }

    #[test]
    fn test_path_numbers() {
        assert_eq!(PathTaken::ColdHeuristic.number(), 1);
        assert_eq!(PathTaken::CachedHighConfidence.number(), 2);
        assert_eq!(PathTaken::CachedRefinement.number(), 3);
        assert_eq!(PathTaken::ColdLlm.number(), 4);
    }
}
