//! Provider abstraction for remote field extraction.
//!
//! All language model providers implement [`FieldExtractor`]. Deadlines are
//! enforced by the caller wrapping the dispatch in a timeout; dropping the
//! in-flight future is the cancellation signal, so implementations must not
//! hold locks across awaits.

use crate::data::{FieldRecord, Schema};
use crate::exceptions::{ExtractError, ExtractResult};
use async_trait::async_trait;

/// The two operations the engine needs from a remote language model.
///
/// Both return records whose keys are a subset of the schema; cost and
/// latency are the worst in the system, so callers minimize invocations.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Fill every schema field to best effort
    async fn extract_all(&self, schema: &Schema, text: &str) -> ExtractResult<FieldRecord>;

    /// Fill only the fields `partial` holds null for; known values are
    /// passed so the provider does not re-extract them
    async fn extract_missing(
        &self,
        schema: &Schema,
        text: &str,
        partial: &FieldRecord,
    ) -> ExtractResult<FieldRecord>;

    /// Provider name for logs and error attribution
    fn provider_name(&self) -> &str;
}

/// Parse a provider payload into a field record restricted to the schema.
///
/// Accepts an optional markdown code fence around the JSON object; values
/// may be strings, numbers, booleans, or null. Anything else is malformed.
pub fn parse_field_response(schema: &Schema, raw: &str) -> ExtractResult<FieldRecord> {
    let body = strip_code_fences(raw);
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ExtractError::malformed(format!("not a JSON payload: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| ExtractError::malformed("payload is not a JSON object"))?;

    let mut record = FieldRecord::new();
    for (key, value) in object {
        let parsed = match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            other => {
                return Err(ExtractError::malformed(format!(
                    "field '{}' has non-scalar value {}",
                    key, other
                )))
            }
        };
        record.insert(key.clone(), parsed);
    }
    Ok(schema.restrict(record))
}

/// Strip a surrounding ```json ... ``` fence if the model added one
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![("cpf", "CPF"), ("nome", "Nome")]).unwrap()
    }

    #[test]
    fn test_parse_plain_json() {
        let record =
            parse_field_response(&schema(), r#"{"cpf": "123", "nome": null}"#).unwrap();
        assert_eq!(record["cpf"], Some("123".to_string()));
        assert_eq!(record["nome"], None);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"cpf\": \"123\", \"nome\": \"Ana\"}\n```";
        let record = parse_field_response(&schema(), raw).unwrap();
        assert_eq!(record["nome"], Some("Ana".to_string()));
    }

    #[test]
    fn test_parse_restricts_to_schema() {
        let record = parse_field_response(
            &schema(),
            r#"{"cpf": "123", "invented_field": "x"}"#,
        )
        .unwrap();
        assert_eq!(record.len(), 2);
        assert!(!record.contains_key("invented_field"));
        // Absent schema field comes back null
        assert_eq!(record["nome"], None);
    }

    #[test]
    fn test_parse_numbers_become_strings() {
        let record = parse_field_response(&schema(), r#"{"cpf": 12345678901}"#).unwrap();
        assert_eq!(record["cpf"], Some("12345678901".to_string()));
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        assert!(parse_field_response(&schema(), "not json at all").is_err());
        assert!(parse_field_response(&schema(), r#"["a", "b"]"#).is_err());
        assert!(parse_field_response(&schema(), r#"{"cpf": {"nested": true}}"#).is_err());
    }

    #[test]
    fn test_empty_strings_count_as_null() {
        let record = parse_field_response(&schema(), r#"{"cpf": "  "}"#).unwrap();
        assert_eq!(record["cpf"], None);
    }

    #[test]
    fn test_mock_provider_scripted_failures() {
        use std::collections::BTreeMap;
        use testing::MockProvider;

        let provider = MockProvider::returning(BTreeMap::from([(
            "cpf".to_string(),
            "123".to_string(),
        )]))
        .with_transient_failures(1);

        tokio_test::block_on(async {
            let first = provider.extract_all(&schema(), "doc").await;
            assert!(first.unwrap_err().is_transient());

            let second = provider.extract_all(&schema(), "doc").await.unwrap();
            assert_eq!(second["cpf"], Some("123".to_string()));
            assert_eq!(second["nome"], None);
        });
    }
}
