//! Model endpoint configuration.
//!
//! The `model:` section of the bridge config. Which wire format the client
//! speaks is chosen by `provider`, so switching between the Anthropic
//! Messages API and an OpenAI-compatible endpoint is a config change.

use serde::Deserialize;

use super::errors::InferenceError;

// ─── Public Types ────────────────────────────────────────────────────────────

/// Which API the model endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProvider {
    /// Anthropic Messages API (`POST /v1/messages`, `tool_use` content blocks).
    Anthropic,
    /// OpenAI Chat Completions (`POST /chat/completions`, `tool_calls`).
    Openai,
}

/// Runtime configuration for the generative model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub base_url: String,
    /// Empty means "not configured".
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    /// Whole-request limit in seconds.
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::Anthropic,
            base_url: "https://api.anthropic.com".to_string(),
            api_key: String::new(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            timeout_secs: 120,
        }
    }
}

impl ModelConfig {
    /// Reject settings no request could succeed with.
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.max_tokens == 0 {
            return Err(InferenceError::ConfigError {
                reason: "model.max_tokens must be greater than 0".into(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(InferenceError::ConfigError {
                reason: "model.model must not be empty".into(),
            });
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(InferenceError::ConfigError {
                reason: format!("model.base_url must be an http(s) URL, got '{}'", self.base_url),
            });
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn endpoint_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
            provider: openai
            base_url: "http://localhost:11434/v1"
        "#;
        let config: ModelConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.provider, ModelProvider::Openai);
        assert_eq!(config.max_tokens, 4096);
        assert!(config.api_key.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_max_tokens() {
        let config = ModelConfig {
            max_tokens: 0,
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_base_url() {
        let config = ModelConfig {
            base_url: "api.anthropic.com".into(),
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_root_trims_slash() {
        let config = ModelConfig {
            base_url: "http://localhost:8080/v1/".into(),
            ..ModelConfig::default()
        };
        assert_eq!(config.endpoint_root(), "http://localhost:8080/v1");
    }
}
