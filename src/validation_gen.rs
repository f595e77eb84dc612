//! Validation pack generation from a gabarito.
//!
//! Each non-null field value is reverse-engineered into the most specific
//! predicate that single datum justifies. Packs are deliberately tight:
//! every emitted predicate rejects at least one plausible-looking malformed
//! input, because a pack that accepts almost anything cannot tell a good
//! parse from a leaked match.

use crate::data::{format_mask, CharClass, FieldRecord, PredicateSpec, Schema, ValidationPack};
use once_cell::sync::Lazy;
use regex::Regex;

/// Values longer than this get a loose predicate; a shape inferred from one
/// long free-text datum would overfit
const FREE_TEXT_LEN: usize = 64;
/// Structured tokens (IDs, dates, amounts) stay under this length
const STRUCTURED_LEN: usize = 24;

/// Generates conservative per-field predicates from a gabarito
pub struct ValidationGenerator;

impl ValidationGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Infer a predicate for every non-null gabarito field. The schema is
    /// consulted only for enumerations spelled out in field descriptions.
    pub fn generate(&self, schema: &Schema, gabarito: &FieldRecord) -> ValidationPack {
        let mut pack = ValidationPack::new();
        for (field, value) in gabarito {
            let Some(value) = value else { continue };
            if value.is_empty() {
                continue;
            }
            let description = schema.description(field).unwrap_or("");
            pack.rules
                .insert(field.clone(), infer_predicate(description, value));
        }
        pack
    }
}

impl Default for ValidationGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Most specific predicate justified by a single observed value
fn infer_predicate(description: &str, value: &str) -> PredicateSpec {
    if let Some(values) = description_alternatives(description) {
        if values
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value.trim()))
        {
            return PredicateSpec::EnumeratedSet { values };
        }
    }

    let len = value.chars().count();
    if value.chars().all(|c| c.is_ascii_digit()) && len <= STRUCTURED_LEN {
        return PredicateSpec::CharacterClass {
            class: CharClass::Digits,
            min_len: len,
            max_len: len,
        };
    }

    let structured = value.chars().any(|c| c.is_ascii_digit() || c.is_ascii_punctuation());
    if structured && len <= STRUCTURED_LEN {
        return PredicateSpec::FormatTemplate {
            mask: format_mask(value),
        };
    }
    if len > FREE_TEXT_LEN {
        return PredicateSpec::NonEmpty;
    }
    if value.chars().all(|c| c.is_alphabetic() || c == ' ') {
        return PredicateSpec::CharacterClass {
            class: CharClass::Letters,
            min_len: bounded_min(len),
            max_len: len * 2,
        };
    }
    PredicateSpec::LengthRange {
        min: bounded_min(len),
        max: len * 2,
    }
}

fn bounded_min(len: usize) -> usize {
    (len / 2).max(1)
}

/// Parse "(A, B, C)" alternatives out of a field description
fn description_alternatives(description: &str) -> Option<Vec<String>> {
    static PAREN_LIST: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\(([^()]{2,200})\)").expect("static pattern"));

    for caps in PAREN_LIST.captures_iter(description) {
        let inner = &caps[1];
        if !inner.contains(',') {
            continue;
        }
        let values: Vec<String> = inner
            .split(',')
            .map(|v| v.trim().trim_end_matches("...").trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        if values.len() >= 2 {
            return Some(values);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            ("cpf", "CPF do outorgante"),
            ("nome", "Nome completo"),
            ("cargo", "Cargo (ADVOGADO, ADVOGADA, ESTAGIARIO)"),
            ("observacao", "Observacoes livres"),
            ("matricula", "Numero de matricula"),
        ])
        .unwrap()
    }

    fn gabarito() -> FieldRecord {
        let mut g = FieldRecord::new();
        g.insert("cpf".to_string(), Some("123.456.789-09".to_string()));
        g.insert("nome".to_string(), Some("Ana Clara Souza".to_string()));
        g.insert("cargo".to_string(), Some("ADVOGADA".to_string()));
        g.insert("matricula".to_string(), Some("482913".to_string()));
        g.insert("observacao".to_string(), None);
        g
    }

    #[test]
    fn test_structured_value_gets_format_template() {
        let pack = ValidationGenerator::new().generate(&schema(), &gabarito());
        let rule = pack.rule("cpf").unwrap();
        assert_eq!(
            rule,
            &PredicateSpec::FormatTemplate {
                mask: "999.999.999-99".to_string()
            }
        );
        assert!(rule.accepts("111.222.333-44"));
        assert!(!rule.accepts("11122233344"));
    }

    #[test]
    fn test_enum_from_description() {
        let pack = ValidationGenerator::new().generate(&schema(), &gabarito());
        let rule = pack.rule("cargo").unwrap();
        match rule {
            PredicateSpec::EnumeratedSet { values } => {
                assert_eq!(values.len(), 3);
                assert!(values.contains(&"ADVOGADO".to_string()));
            }
            other => panic!("expected enumerated set, got {:?}", other),
        }
        assert!(rule.accepts("ADVOGADO"));
        assert!(!rule.accepts("JUIZ"));
    }

    #[test]
    fn test_letters_value_gets_character_class() {
        let pack = ValidationGenerator::new().generate(&schema(), &gabarito());
        let rule = pack.rule("nome").unwrap();
        assert!(rule.accepts("Bruno Lima"));
        assert!(!rule.accepts("12345"));
        assert!(!rule.accepts(""));
    }

    #[test]
    fn test_digits_value_gets_digit_class() {
        let pack = ValidationGenerator::new().generate(&schema(), &gabarito());
        let rule = pack.rule("matricula").unwrap();
        assert!(rule.accepts("771234"));
        assert!(!rule.accepts("77-1234"));
        assert!(!rule.accepts("77"));
    }

    #[test]
    fn test_null_field_gets_no_rule() {
        let pack = ValidationGenerator::new().generate(&schema(), &gabarito());
        assert!(pack.rule("observacao").is_none());
    }

    #[test]
    fn test_every_rule_rejects_some_malformed_input() {
        let pack = ValidationGenerator::new().generate(&schema(), &gabarito());
        for rule in pack.rules.values() {
            assert!(
                !rule.accepts("") || !rule.accepts(&"z".repeat(500)),
                "predicate {:?} accepts anything",
                rule
            );
        }
    }

    #[test]
    fn test_long_free_text_gets_non_empty() {
        let schema = Schema::new(vec![("clausula", "Texto da clausula")]).unwrap();
        let mut g = FieldRecord::new();
        g.insert(
            "clausula".to_string(),
            Some("pelo presente instrumento particular de procuracao o outorgante confere ao outorgado amplos poderes".to_string()),
        );
        let pack = ValidationGenerator::new().generate(&schema, &g);
        assert_eq!(pack.rule("clausula"), Some(&PredicateSpec::NonEmpty));
    }
}
