//! Parser pack generation from a verified gabarito.
//!
//! For every non-null gabarito value the generator proposes anchored capture
//! patterns, most specific first, and self-validates each candidate against
//! the source text: a pattern is emitted only if its first match's first
//! capture reproduces the gabarito value exactly. Fields that cannot be
//! captured within the attempt budget are omitted so the runtime routes them
//! through the LLM instead of executing a bad pattern.

use crate::data::{FieldRecord, ParserPack};
use regex::{escape, Regex, RegexBuilder};

/// Regex compile size limit applied to generated patterns, matching the
/// executor's defensive compilation
pub const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// How many characters of preceding context a pattern may anchor on
const MAX_ANCHOR_LEN: usize = 40;
/// Anchors shorter than this are too ambiguous to emit
const MIN_ANCHOR_LEN: usize = 3;

/// Generates per-field capture patterns from `(text, gabarito)` pairs
pub struct ParserGenerator {
    /// Candidate patterns tried per field before the field is given up on
    max_attempts: usize,
}

impl ParserGenerator {
    pub fn new() -> Self {
        Self { max_attempts: 4 }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Build a parser pack for every capturable gabarito field
    pub fn generate(&self, text: &str, gabarito: &FieldRecord) -> ParserPack {
        let mut pack = ParserPack::new();
        for (field, value) in gabarito {
            let Some(value) = value else { continue };
            if value.is_empty() {
                continue;
            }
            if let Some(pattern) = self.generate_field(text, value) {
                pack.patterns.insert(field.clone(), pattern);
            } else {
                log::debug!("no capturable pattern for field '{}'", field);
            }
        }
        pack
    }

    /// Propose and self-validate candidate patterns for a single value
    fn generate_field(&self, text: &str, value: &str) -> Option<String> {
        let start = text.find(value)?;
        for candidate in candidate_patterns(text, start, value)
            .into_iter()
            .take(self.max_attempts)
        {
            if self.validates(&candidate, text, value) {
                return Some(candidate);
            }
        }
        None
    }

    /// A candidate is valid iff it compiles and its first match's first
    /// capture on the source text equals the gabarito value
    fn validates(&self, pattern: &str, text: &str, value: &str) -> bool {
        let compiled = match RegexBuilder::new(pattern)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
        {
            Ok(re) => re,
            Err(_) => return false,
        };
        compiled
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str() == value)
            .unwrap_or(false)
    }
}

impl Default for ParserGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Candidate patterns in decreasing order of anchoring strength
fn candidate_patterns(text: &str, value_start: usize, value: &str) -> Vec<String> {
    let shape = shape_of(value);
    let mut candidates = Vec::new();

    // Context keyword on the same line, immediately preceding the value
    if let Some(anchor) = same_line_anchor(text, value_start) {
        candidates.push(format!(r"{}[ \t]*({})", escape(&anchor), shape));
    }

    // Tail of the previous line, reaching across the line break
    if let Some(anchor) = previous_line_anchor(text, value_start) {
        candidates.push(format!(r"{}\s*({})", escape(&anchor), shape));
    }

    // Structural delimiter: value sits at a line start
    candidates.push(format!(r"(?m)^[ \t]*({})", shape));

    // Exact literal as the last resort; still reproduces the gabarito
    candidates.push(format!(r"({})", escape(value)));

    candidates
}

/// Generalize a value into a shape pattern: digit runs keep exact counts
/// (IDs and dates are fixed-width), words-with-spaces collapse into a single
/// `[\p{{L}} ]+` so sibling documents with fewer or more words still match,
/// other whitespace becomes `\s+`, punctuation is escaped literally
fn shape_of(value: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum Run {
        Digit(usize),
        Letterish,
        Space,
        None,
    }

    let flush = |out: &mut String, run: &Run| match run {
        Run::Digit(n) => out.push_str(&format!(r"\d{{{}}}", n)),
        Run::Letterish => out.push_str(r"[\p{L} ]+"),
        Run::Space => out.push_str(r"\s+"),
        Run::None => {}
    };

    let chars: Vec<char> = value.chars().collect();
    let mut out = String::new();
    let mut run = Run::None;
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_digit() {
            if let Run::Digit(n) = run {
                run = Run::Digit(n + 1);
            } else {
                flush(&mut out, &run);
                run = Run::Digit(1);
            }
        } else if c.is_alphabetic() {
            if run != Run::Letterish {
                flush(&mut out, &run);
                run = Run::Letterish;
            }
        } else if c == ' '
            && run == Run::Letterish
            && chars[i + 1..]
                .iter()
                .find(|n| **n != ' ')
                .is_some_and(|n| n.is_alphabetic())
        {
            // Interior space between words stays inside the letterish run
        } else if c.is_whitespace() {
            if run != Run::Space {
                flush(&mut out, &run);
                run = Run::Space;
            }
        } else {
            flush(&mut out, &run);
            run = Run::None;
            out.push_str(&escape(&c.to_string()));
        }
    }
    flush(&mut out, &run);
    out
}

/// Non-whitespace context on the value's own line, e.g. the "CPF:" before
/// the number
fn same_line_anchor(text: &str, value_start: usize) -> Option<String> {
    let line_start = text[..value_start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = text[line_start..value_start].trim_end();
    let anchor = tail_within(prefix, MAX_ANCHOR_LEN);
    (anchor.len() >= MIN_ANCHOR_LEN).then(|| anchor.to_string())
}

/// Tail of the line above the value, used when the value starts its own line
fn previous_line_anchor(text: &str, value_start: usize) -> Option<String> {
    let line_start = text[..value_start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    if line_start == 0 {
        return None;
    }
    let prev = text[..line_start - 1].lines().last()?.trim_end();
    let anchor = tail_within(prev, MAX_ANCHOR_LEN);
    (anchor.len() >= MIN_ANCHOR_LEN).then(|| anchor.to_string())
}

/// Last `max_len` characters of `s`, split on a char boundary
fn tail_within(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut cut = s.len() - max_len;
    while !s.is_char_boundary(cut) {
        cut += 1;
    }
    &s[cut..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FieldRecord;
    use regex::Regex;

    const TEXT: &str = "\
PROCURACAO AD JUDICIA\n\
Nome: Ana Clara Souza\n\
CPF: 123.456.789-09\n\
Valor: R$ 1.500,00\n\
Data de emissao: 15/03/2024";

    fn gabarito() -> FieldRecord {
        let mut g = FieldRecord::new();
        g.insert("nome".to_string(), Some("Ana Clara Souza".to_string()));
        g.insert("cpf".to_string(), Some("123.456.789-09".to_string()));
        g.insert("valor".to_string(), Some("1.500,00".to_string()));
        g.insert("data".to_string(), Some("15/03/2024".to_string()));
        g.insert("ausente".to_string(), None);
        g
    }

    #[test]
    fn test_every_pattern_reproduces_its_gabarito_value() {
        let pack = ParserGenerator::new().generate(TEXT, &gabarito());
        let gabarito = gabarito();
        assert!(!pack.is_empty());
        for (field, pattern) in &pack.patterns {
            let re = Regex::new(pattern).expect("emitted pattern must compile");
            let captured = re
                .captures(TEXT)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            assert_eq!(
                captured,
                gabarito[field].clone(),
                "pattern for '{}' must capture its gabarito value",
                field
            );
        }
    }

    #[test]
    fn test_null_fields_are_omitted() {
        let pack = ParserGenerator::new().generate(TEXT, &gabarito());
        assert!(!pack.patterns.contains_key("ausente"));
    }

    #[test]
    fn test_absent_value_is_omitted() {
        let mut g = FieldRecord::new();
        g.insert("ghost".to_string(), Some("value never in text".to_string()));
        let pack = ParserGenerator::new().generate(TEXT, &g);
        assert!(pack.is_empty());
    }

    #[test]
    fn test_patterns_generalize_to_sibling_documents() {
        let pack = ParserGenerator::new().generate(TEXT, &gabarito());
        let sibling = "\
PROCURACAO AD JUDICIA\n\
Nome: Bruno Lima\n\
CPF: 987.654.321-00\n\
Valor: R$ 23.000,00\n\
Data de emissao: 01/12/2025";

        let cpf = Regex::new(&pack.patterns["cpf"]).unwrap();
        assert_eq!(
            cpf.captures(sibling).unwrap().get(1).unwrap().as_str(),
            "987.654.321-00"
        );
        let nome = Regex::new(&pack.patterns["nome"]).unwrap();
        assert_eq!(
            nome.captures(sibling).unwrap().get(1).unwrap().as_str(),
            "Bruno Lima"
        );
    }

    #[test]
    fn test_anchoring_avoids_sibling_tokens() {
        // Two same-shaped numbers; the anchor must select the right one
        let text = "Registro: 111.222.333-44\nCPF: 555.666.777-88";
        let mut g = FieldRecord::new();
        g.insert("cpf".to_string(), Some("555.666.777-88".to_string()));
        let pack = ParserGenerator::new().generate(text, &g);
        let re = Regex::new(&pack.patterns["cpf"]).unwrap();
        assert_eq!(
            re.captures(text).unwrap().get(1).unwrap().as_str(),
            "555.666.777-88"
        );
    }

    #[test]
    fn test_shape_of() {
        assert_eq!(shape_of("123.456.789-09"), r"\d{3}\.\d{3}\.\d{3}\-\d{2}");
        assert_eq!(shape_of("15/03/2024"), r"\d{2}/\d{2}/\d{4}");
        assert_eq!(shape_of("Ana Clara Souza"), r"[\p{L} ]+");
        assert_eq!(shape_of("Sala 201"), r"[\p{L} ]+\s+\d{3}");
    }

    #[test]
    fn test_attempt_budget_is_respected() {
        // With a single attempt only the strongest candidate is tried
        let generator = ParserGenerator::new().with_max_attempts(1);
        let pack = generator.generate(TEXT, &gabarito());
        for pattern in pack.patterns.values() {
            assert!(Regex::new(pattern).is_ok());
        }
    }
}
