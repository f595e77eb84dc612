//! Confidence scoring of candidate records against a validation pack.

use crate::data::{FailingFields, FieldRecord, Schema, ValidationPack};

/// Outcome of scoring one record
#[derive(Debug, Clone, PartialEq)]
pub struct Confidence {
    /// Fraction of schema fields whose value passed, in `[0, 1]`
    pub score: f64,
    /// Fields that were null or whose value failed their predicate
    pub failing: FailingFields,
}

impl Confidence {
    /// Whether the score clears the accept threshold (inclusive)
    pub fn accepted(&self, threshold: f64) -> bool {
        self.score >= threshold
    }
}

/// Scores a field record against a label's validation pack.
///
/// A field passes iff it is non-null and its predicate accepts the value; a
/// field without a predicate passes iff non-null. Null fields always count
/// as failures.
pub struct ConfidenceCalculator;

impl ConfidenceCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn score(
        &self,
        schema: &Schema,
        record: &FieldRecord,
        validation: &ValidationPack,
    ) -> Confidence {
        let mut failing = FailingFields::new();
        let mut passing = 0usize;
        for name in schema.names() {
            let passes = match record.get(name).and_then(|v| v.as_deref()) {
                Some(value) => validation
                    .rule(name)
                    .map(|rule| rule.accepts(value))
                    .unwrap_or(true),
                None => false,
            };
            if passes {
                passing += 1;
            } else {
                failing.insert(name.to_string());
            }
        }
        let total = schema.len().max(1);
        Confidence {
            score: passing as f64 / total as f64,
            failing,
        }
    }
}

impl Default for ConfidenceCalculator {
    fn default() -> Self {
        Self::new()
    }
}
