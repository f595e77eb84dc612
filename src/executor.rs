//! Parser pack execution against document text.

use crate::data::{empty_record, FieldRecord, ParserPack, Schema};
use crate::parser_gen::PATTERN_SIZE_LIMIT;
use regex::RegexBuilder;

/// Applies a label's parser pack to a document's text.
///
/// Patterns come out of the repository and are treated as untrusted data:
/// each is compiled defensively with a size limit, and a pattern that no
/// longer compiles simply yields null for its field.
pub struct ParserExecutor;

impl ParserExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Produce a candidate record: the first match's first capture per
    /// field, null where a pattern is absent or finds nothing. Inputs are
    /// never mutated.
    pub fn execute(&self, schema: &Schema, pack: &ParserPack, text: &str) -> FieldRecord {
        let mut record = empty_record(schema);
        for (field, pattern) in &pack.patterns {
            if !schema.contains(field) {
                continue;
            }
            let value = self.apply_pattern(pattern, text);
            if value.is_none() {
                log::trace!("pattern for '{}' found no match", field);
            }
            record.insert(field.clone(), value);
        }
        record
    }

    fn apply_pattern(&self, pattern: &str, text: &str) -> Option<String> {
        let re = match RegexBuilder::new(pattern)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
        {
            Ok(re) => re,
            Err(e) => {
                log::warn!("stored pattern failed to compile: {}", e);
                return None;
            }
        };
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

impl Default for ParserExecutor {
    fn default() -> Self {
        Self::new()
    }
}
