//! Engine configuration and environment loading.

use crate::exceptions::{ExtractError, ExtractResult};
use crate::providers::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable holding the LLM provider credential
pub const API_KEY_VAR: &str = "ADAPTIVE_EXTRACT_API_KEY";
/// Environment variable overriding the repository root
pub const REPO_ROOT_VAR: &str = "ADAPTIVE_EXTRACT_REPO";

/// Tunable thresholds and locations for the extraction engine.
///
/// The defaults carry the operating points the engine was tuned for; the
/// environment can override each one individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Amortized time budget granted per batch item, in seconds
    pub per_item_budget_s: f64,
    /// Minimum confidence score for a cached parse to be returned as-is
    pub accept_threshold: f64,
    /// Heuristic null fraction at which the cold path escalates to the LLM
    pub heuristic_failure_threshold: f64,
    /// Multiplier letting a slow item consume time saved by fast ones
    pub slack: f64,
    /// Root directory of the parser repository
    pub repository_root: PathBuf,
    /// Flat cost estimate charged per synchronous LLM invocation
    pub cost_per_call: f64,
    /// Provider connection settings
    pub provider: ProviderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            per_item_budget_s: 10.0,
            accept_threshold: 0.80,
            heuristic_failure_threshold: 0.50,
            slack: 1.5,
            repository_root: PathBuf::from("./knowledge"),
            cost_per_call: 0.01,
            provider: ProviderConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Build a config from defaults plus environment overrides.
    ///
    /// Loads `.env` first, then reads the credential and any numeric
    /// overrides (`ADAPTIVE_EXTRACT_BUDGET_S`, `ADAPTIVE_EXTRACT_ACCEPT`,
    /// `ADAPTIVE_EXTRACT_HEURISTIC_FAILURE`, `ADAPTIVE_EXTRACT_SLACK`).
    pub fn from_env() -> ExtractResult<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Ok(key) = std::env::var(API_KEY_VAR) {
            config.provider.api_key = Some(key);
        }
        if let Ok(root) = std::env::var(REPO_ROOT_VAR) {
            config.repository_root = PathBuf::from(root);
        }
        if let Some(v) = read_f64("ADAPTIVE_EXTRACT_BUDGET_S")? {
            config.per_item_budget_s = v;
        }
        if let Some(v) = read_f64("ADAPTIVE_EXTRACT_ACCEPT")? {
            config.accept_threshold = v;
        }
        if let Some(v) = read_f64("ADAPTIVE_EXTRACT_HEURISTIC_FAILURE")? {
            config.heuristic_failure_threshold = v;
        }
        if let Some(v) = read_f64("ADAPTIVE_EXTRACT_SLACK")? {
            config.slack = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the orchestrator cannot operate under
    pub fn validate(&self) -> ExtractResult<()> {
        if self.per_item_budget_s <= 0.0 {
            return Err(ExtractError::configuration(
                "per_item_budget_s must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.accept_threshold) {
            return Err(ExtractError::configuration(
                "accept_threshold must lie in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.heuristic_failure_threshold) {
            return Err(ExtractError::configuration(
                "heuristic_failure_threshold must lie in [0, 1]",
            ));
        }
        if self.slack < 1.0 {
            return Err(ExtractError::configuration("slack must be at least 1.0"));
        }
        Ok(())
    }
}

fn read_f64(var: &str) -> ExtractResult<Option<f64>> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ExtractError::configuration(format!("{} is not a number: {}", var, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_carry_operating_points() {
        let config = EngineConfig::default();
        assert_eq!(config.per_item_budget_s, 10.0);
        assert_eq!(config.accept_threshold, 0.80);
        assert_eq!(config.heuristic_failure_threshold, 0.50);
        assert_eq!(config.slack, 1.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = EngineConfig::default();
        config.accept_threshold = 1.2;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.slack = 0.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.per_item_budget_s = 0.0;
        assert!(config.validate().is_err());
    }
}
