//! Factory for assembling engine components from configuration.

use crate::config::{EngineConfig, API_KEY_VAR};
use crate::exceptions::ExtractResult;
use crate::inference::FieldExtractor;
use crate::providers;
use std::env;
use std::sync::Arc;

/// Create a provider from the engine config, falling back to the
/// environment credential when none is configured explicitly
pub fn create_provider(config: &EngineConfig) -> ExtractResult<Arc<dyn FieldExtractor>> {
    let mut provider_config = config.provider.clone();
    if provider_config.api_key.is_none() {
        provider_config.api_key = env::var(API_KEY_VAR).ok();
    }
    providers::create_provider(provider_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderConfig;

    #[test]
    fn test_ollama_provider_builds_without_credentials() {
        let config = EngineConfig::default();
        assert!(create_provider(&config).is_ok());
    }

    #[test]
    fn test_configured_key_is_not_overridden() {
        let mut config = EngineConfig::default();
        config.provider = ProviderConfig::openai("gpt-4o", Some("explicit-key".to_string()));
        assert!(create_provider(&config).is_ok());
    }
}
