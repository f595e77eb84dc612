//! Prompt construction for the two provider operations.
//!
//! Prompts ask for a single JSON object keyed by the schema's field names,
//! string or null values only, so the response parser stays trivial and the
//! result maps directly onto a field record.

use crate::data::{FieldRecord, Schema};

/// Prompt for `extract_all`: fill every schema field to best effort
pub fn extract_all_prompt(schema: &Schema, text: &str) -> String {
    let mut prompt = String::from(
        "Extract the following fields from the document below. Respond with a \
         single JSON object whose keys are exactly the field names; each value \
         is the extracted string, verbatim from the document, or null when the \
         field is absent. Do not add keys, comments, or explanations.\n\nFields:\n",
    );
    push_field_list(&mut prompt, schema, None);
    prompt.push_str("\nDocument:\n");
    prompt.push_str(text);
    prompt
}

/// Prompt for `extract_missing`: only the fields that `partial` has null or
/// failing values for
pub fn extract_missing_prompt(schema: &Schema, text: &str, missing: &[String]) -> String {
    let mut prompt = String::from(
        "Extract ONLY the following fields from the document below; other \
         fields are already known. Respond with a single JSON object containing \
         exactly these keys; each value is the extracted string, verbatim from \
         the document, or null when the field is absent.\n\nFields:\n",
    );
    push_field_list(&mut prompt, schema, Some(missing));
    prompt.push_str("\nDocument:\n");
    prompt.push_str(text);
    prompt
}

fn push_field_list(prompt: &mut String, schema: &Schema, only: Option<&[String]>) {
    for (name, description) in schema.fields() {
        if let Some(only) = only {
            if !only.iter().any(|f| f == name) {
                continue;
            }
        }
        prompt.push_str(&format!("- {}: {}\n", name, description));
    }
}

/// Fields of `partial` that still need the LLM: null values only
pub fn missing_fields(partial: &FieldRecord) -> Vec<String> {
    partial
        .iter()
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| k.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![("cpf", "CPF do outorgante"), ("nome", "Nome completo")]).unwrap()
    }

    #[test]
    fn test_extract_all_lists_every_field() {
        let prompt = extract_all_prompt(&schema(), "doc body");
        assert!(prompt.contains("- cpf: CPF do outorgante"));
        assert!(prompt.contains("- nome: Nome completo"));
        assert!(prompt.contains("doc body"));
    }

    #[test]
    fn test_extract_missing_lists_only_missing() {
        let prompt =
            extract_missing_prompt(&schema(), "doc body", &["nome".to_string()]);
        assert!(prompt.contains("- nome:"));
        assert!(!prompt.contains("- cpf:"));
    }

    #[test]
    fn test_missing_fields_are_the_nulls() {
        let mut partial = FieldRecord::new();
        partial.insert("cpf".to_string(), Some("123".to_string()));
        partial.insert("nome".to_string(), None);
        assert_eq!(missing_fields(&partial), vec!["nome".to_string()]);
    }
}
