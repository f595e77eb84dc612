//! Provider configuration types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Provider type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum ProviderType {
    /// OpenAI-compatible API (OpenAI, Azure OpenAI, OpenRouter, etc.)
    OpenAI,
    /// Ollama local server
    Ollama,
    /// Custom HTTP API speaking the OpenAI-compatible surface
    Custom,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::OpenAI => write!(f, "openai"),
            ProviderType::Ollama => write!(f, "ollama"),
            ProviderType::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAI),
            "ollama" => Ok(ProviderType::Ollama),
            "custom" => Ok(ProviderType::Custom),
            _ => Err(format!("Unknown provider type: {}", s)),
        }
    }
}

/// Universal provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider
    pub provider_type: ProviderType,
    /// Base URL for the API
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// API key (if required)
    pub api_key: Option<String>,
    /// Additional headers
    pub headers: HashMap<String, String>,
}

impl ProviderConfig {
    /// Create a new OpenAI provider config
    pub fn openai(model: &str, api_key: Option<String>) -> Self {
        Self {
            provider_type: ProviderType::OpenAI,
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.to_string(),
            api_key,
            headers: HashMap::new(),
        }
    }

    /// Create a new Ollama provider config
    pub fn ollama(model: &str, base_url: Option<String>) -> Self {
        Self {
            provider_type: ProviderType::Ollama,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: model.to_string(),
            api_key: None,
            headers: HashMap::new(),
        }
    }

    /// Create a custom provider config
    pub fn custom(base_url: &str, model: &str) -> Self {
        Self {
            provider_type: ProviderType::Custom,
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key: None,
            headers: HashMap::new(),
        }
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::ollama("llama3.2", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_round_trip() {
        for t in [ProviderType::OpenAI, ProviderType::Ollama, ProviderType::Custom] {
            let parsed: ProviderType = t.to_string().parse().unwrap();
            assert_eq!(parsed, t);
        }
        assert!("granite".parse::<ProviderType>().is_err());
    }

    #[test]
    fn test_builders() {
        let config = ProviderConfig::openai("gpt-4o", Some("key".to_string()))
            .with_base_url("https://openrouter.ai/api/v1".to_string())
            .with_header("X-Title".to_string(), "extractor".to_string());
        assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.headers["X-Title"], "extractor");
        assert_eq!(config.api_key.as_deref(), Some("key"));
    }
}
