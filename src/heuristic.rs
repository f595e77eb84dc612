//! Cheap, label-agnostic heuristic extraction.
//!
//! A fixed catalogue of regexes for common structured tokens (dates,
//! currency amounts, CPF/CNPJ, postal codes, email, phone) is matched against
//! fields by keywords in the field name and description. Descriptions that
//! enumerate alternatives, e.g. "(ADVOGADO, ADVOGADA)", turn into a scan for
//! the listed words. Anything unrecognized comes back null; the extractor
//! itself never fails.

use crate::data::{empty_record, FieldRecord, Schema};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::{escape, Regex, RegexBuilder};

/// One entry of the static token catalogue
struct TokenRule {
    /// Substrings of the field name/description that select this rule
    keywords: &'static [&'static str],
    /// Candidate patterns, most specific first; group 1 is the value
    patterns: Vec<Regex>,
    /// Syntactic check a candidate match must pass before it is returned
    validate: fn(&str) -> bool,
}

fn always_valid(_: &str) -> bool {
    true
}

fn valid_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d-%m-%Y"))
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .is_ok()
}

fn valid_amount(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit())
}

static TOKEN_RULES: Lazy<Vec<TokenRule>> = Lazy::new(|| {
    let rx = |p: &str| Regex::new(p).expect("static pattern");
    vec![
        TokenRule {
            keywords: &["cpf"],
            patterns: vec![rx(r"\b(\d{3}\.\d{3}\.\d{3}-\d{2})\b")],
            validate: always_valid,
        },
        TokenRule {
            keywords: &["cnpj"],
            patterns: vec![rx(r"\b(\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2})\b")],
            validate: always_valid,
        },
        TokenRule {
            keywords: &["cep", "postal", "zip"],
            patterns: vec![rx(r"\b(\d{5}-\d{3})\b")],
            validate: always_valid,
        },
        TokenRule {
            keywords: &["data", "date", "vencimento", "emissao", "emissão", "prazo"],
            patterns: vec![
                rx(r"\b(\d{2}/\d{2}/\d{4})\b"),
                rx(r"\b(\d{2}-\d{2}-\d{4})\b"),
                rx(r"\b(\d{4}-\d{2}-\d{2})\b"),
            ],
            validate: valid_date,
        },
        TokenRule {
            keywords: &[
                "valor",
                "amount",
                "total",
                "price",
                "preco",
                "preço",
                "honorario",
                "honorários",
            ],
            patterns: vec![
                rx(r"R\$\s*([\d.]+,\d{2})"),
                rx(r"\$\s*([\d,]+\.\d{2})"),
                rx(r"R\$\s*(\d+)"),
            ],
            validate: valid_amount,
        },
        TokenRule {
            keywords: &["email", "e-mail"],
            patterns: vec![rx(r"\b([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})\b")],
            validate: always_valid,
        },
        TokenRule {
            keywords: &["telefone", "phone", "celular", "fone"],
            patterns: vec![
                rx(r"(\(\d{2}\)\s?\d{4,5}-\d{4})"),
                rx(r"\b(\d{2}\s\d{4,5}-\d{4})\b"),
            ],
            validate: always_valid,
        },
    ]
});

/// Extract a parenthesized comma-separated list of alternatives from a
/// description, e.g. "role of the person (ADVOGADO, ADVOGADA)"
fn enumerated_alternatives(description: &str) -> Option<Vec<String>> {
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

/// Static, label-agnostic rule engine over the token catalogue.
///
/// Bounded O(|text| x |fields|); runs synchronously on every cold request.
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Fill every schema field the catalogue recognizes; unmatched fields
    /// stay null. Never returns a syntactically invalid value.
    pub fn extract(&self, schema: &Schema, text: &str) -> FieldRecord {
        let mut record = empty_record(schema);
        for (name, description) in schema.fields() {
            let value = match self.match_enumeration(description, text) {
                Some(v) => Some(v),
                // A typed rule that recognizes the field owns it outright, so
                // the generic line fallback cannot leak a malformed value
                None => match self.match_token_rule(name, description, text) {
                    Some(outcome) => outcome,
                    None => self.match_labeled_line(name, text),
                },
            };
            record.insert(name.to_string(), value);
        }
        record
    }

    /// Fraction of schema fields the heuristic returned null for
    pub fn failure_rate(record: &FieldRecord) -> f64 {
        if record.is_empty() {
            return 1.0;
        }
        let nulls = record.values().filter(|v| v.is_none()).count();
        nulls as f64 / record.len() as f64
    }

    fn match_enumeration(&self, description: &str, text: &str) -> Option<String> {
        let alternatives = enumerated_alternatives(description)?;
        for alternative in &alternatives {
            let pattern = format!(r"\b{}\b", escape(alternative));
            let re = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .ok()?;
            if re.is_match(text) {
                return Some(alternative.clone());
            }
        }
        None
    }

    /// Outer `None` means no catalogue rule recognizes the field; inner
    /// `None` means a rule applied but found no syntactically valid token
    fn match_token_rule(
        &self,
        name: &str,
        description: &str,
        text: &str,
    ) -> Option<Option<String>> {
        let haystack = format!("{} {}", name, description).to_lowercase();
        for rule in TOKEN_RULES.iter() {
            if !rule.keywords.iter().any(|k| haystack.contains(k)) {
                continue;
            }
            for pattern in &rule.patterns {
                for caps in pattern.captures_iter(text) {
                    if let Some(m) = caps.get(1) {
                        if (rule.validate)(m.as_str()) {
                            return Some(Some(m.as_str().to_string()));
                        }
                    }
                }
            }
            return Some(None);
        }
        None
    }

    /// "Nome: Ana Souza" style lines, keyed by the field name itself
    fn match_labeled_line(&self, name: &str, text: &str) -> Option<String> {
        let keyword = name.replace('_', " ");
        let pattern = format!(r"(?m)^\s*{}\s*[:\-]\s*(\S.*)$", escape(&keyword));
        let re = RegexBuilder::new(&pattern).case_insensitive(true).build().ok()?;
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl Default for HeuristicExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
PROCURACAO\n\
Nome: Ana Clara Souza\n\
CPF: 123.456.789-09\n\
Qualificacao: ADVOGADA inscrita na OAB\n\
Endereco: Rua das Flores 12, CEP 01310-100\n\
Data de emissao: 15/03/2024\n\
Valor: R$ 1.500,00\n\
Contato: ana.souza@example.com";

    fn schema() -> Schema {
        Schema::new(vec![
            ("nome", "Full name of the grantor"),
            ("cpf", "CPF number of the grantor"),
            ("cargo", "Role of the person (ADVOGADO, ADVOGADA, ESTAGIARIO)"),
            ("cep", "Postal code"),
            ("data_emissao", "Data de emissao do documento"),
            ("valor", "Valor total em reais"),
            ("email", "Contact e-mail"),
            ("numero_processo", "Case number in CNJ format"),
        ])
        .unwrap()
    }

    #[test]
    fn test_structured_tokens_are_found() {
        let record = HeuristicExtractor::new().extract(&schema(), SAMPLE);
        assert_eq!(record["cpf"], Some("123.456.789-09".to_string()));
        assert_eq!(record["cep"], Some("01310-100".to_string()));
        assert_eq!(record["data_emissao"], Some("15/03/2024".to_string()));
        assert_eq!(record["valor"], Some("1.500,00".to_string()));
        assert_eq!(record["email"], Some("ana.souza@example.com".to_string()));
    }

    #[test]
    fn test_enumeration_from_description() {
        let record = HeuristicExtractor::new().extract(&schema(), SAMPLE);
        assert_eq!(record["cargo"], Some("ADVOGADA".to_string()));
    }

    #[test]
    fn test_labeled_line_fallback() {
        let record = HeuristicExtractor::new().extract(&schema(), SAMPLE);
        assert_eq!(record["nome"], Some("Ana Clara Souza".to_string()));
    }

    #[test]
    fn test_unrecognized_field_is_null() {
        let record = HeuristicExtractor::new().extract(&schema(), SAMPLE);
        assert_eq!(record["numero_processo"], None);
    }

    #[test]
    fn test_invalid_date_is_rejected() {
        let schema = Schema::new(vec![("data", "Date of issue")]).unwrap();
        let record = HeuristicExtractor::new().extract(&schema, "Data: 45/77/2024");
        assert_eq!(record["data"], None);
    }

    #[test]
    fn test_failure_rate() {
        let record = HeuristicExtractor::new().extract(&schema(), SAMPLE);
        // 7 of 8 fields found
        let rate = HeuristicExtractor::failure_rate(&record);
        assert!((rate - 1.0 / 8.0).abs() < 1e-9);

        let empty_text_record = HeuristicExtractor::new().extract(&schema(), "nothing here");
        assert!(HeuristicExtractor::failure_rate(&empty_text_record) > 0.5);
    }

    #[test]
    fn test_never_fails_on_weird_input() {
        let schema = Schema::new(vec![("cpf", "CPF")]).unwrap();
        let extractor = HeuristicExtractor::new();
        extractor.extract(&schema, "");
        extractor.extract(&schema, "\u{0}\u{1}binary-ish\u{7f}");
        extractor.extract(&schema, &"x".repeat(100_000));
    }
}
