//! Universal provider implementation.
//!
//! Speaks the OpenAI-compatible chat surface and the Ollama generate surface
//! directly over reqwest. Deadline cancellation is cooperative: the caller
//! drops the in-flight future and the HTTP request is aborted with it.

use super::config::{ProviderConfig, ProviderType};
use crate::data::{FieldRecord, Schema};
use crate::exceptions::{ExtractError, ExtractResult};
use crate::inference::{parse_field_response, FieldExtractor};
use crate::prompting::{extract_all_prompt, extract_missing_prompt, missing_fields};
use async_trait::async_trait;
use serde_json::json;

/// Universal language model provider over an HTTP API
pub struct UniversalProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl UniversalProvider {
    /// Create a new universal provider
    pub fn new(config: ProviderConfig) -> ExtractResult<Self> {
        if config.base_url.is_empty() {
            return Err(ExtractError::configuration("provider base_url is empty"));
        }
        if config.provider_type == ProviderType::OpenAI && config.api_key.is_none() {
            return Err(ExtractError::configuration(
                "OpenAI-compatible providers require an API key",
            ));
        }
        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }

    /// Send one prompt and return the model's raw text completion
    async fn complete(&self, prompt: &str) -> ExtractResult<String> {
        match self.config.provider_type {
            ProviderType::OpenAI | ProviderType::Custom => self.complete_chat(prompt).await,
            ProviderType::Ollama => self.complete_ollama(prompt).await,
        }
    }

    async fn complete_chat(&self, prompt: &str) -> ExtractResult<String> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.0,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let payload = self.check_status(response).await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ExtractError::malformed("chat response carries no content"))
    }

    async fn complete_ollama(&self, prompt: &str) -> ExtractResult<String> {
        let url = format!("{}/api/generate", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "options": {"temperature": 0.0},
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let payload = self.check_status(response).await?;
        payload["response"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ExtractError::malformed("generate response carries no content"))
    }

    /// Map HTTP status onto the engine's error kinds: 429 and 5xx are
    /// retryable, everything else non-2xx is terminal for this call
    async fn check_status(&self, response: reqwest::Response) -> ExtractResult<serde_json::Value> {
        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ExtractError::transient(
                format!("provider returned {}", status),
                Some(self.config.provider_type.to_string()),
            ));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ExtractError::malformed(format!(
                "provider returned {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ExtractError::malformed(format!("non-JSON provider payload: {}", e)))
    }
}

#[async_trait]
impl FieldExtractor for UniversalProvider {
    async fn extract_all(&self, schema: &Schema, text: &str) -> ExtractResult<FieldRecord> {
        let prompt = extract_all_prompt(schema, text);
        let raw = self.complete(&prompt).await?;
        parse_field_response(schema, &raw)
    }

    async fn extract_missing(
        &self,
        schema: &Schema,
        text: &str,
        partial: &FieldRecord,
    ) -> ExtractResult<FieldRecord> {
        let missing = missing_fields(partial);
        if missing.is_empty() {
            return Ok(FieldRecord::new());
        }
        let prompt = extract_missing_prompt(schema, text, &missing);
        let raw = self.complete(&prompt).await?;
        let record = parse_field_response(schema, &raw)?;
        // Keep only the fields that were asked for
        Ok(record
            .into_iter()
            .filter(|(field, _)| missing.iter().any(|m| m == field))
            .collect())
    }

    fn provider_name(&self) -> &str {
        match self.config.provider_type {
            ProviderType::OpenAI => "openai",
            ProviderType::Ollama => "ollama",
            ProviderType::Custom => "custom",
        }
    }
}
