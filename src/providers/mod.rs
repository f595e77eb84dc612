//! Language model provider implementations.

pub mod config;
pub mod universal;

pub use config::{ProviderConfig, ProviderType};
pub use universal::UniversalProvider;

use crate::exceptions::ExtractResult;
use crate::inference::FieldExtractor;
use std::sync::Arc;

/// Create a provider from its configuration
pub fn create_provider(config: ProviderConfig) -> ExtractResult<Arc<dyn FieldExtractor>> {
    Ok(Arc::new(UniversalProvider::new(config)?))
}
