//! LLM provider implementations.
//!
//! Provides the concrete implementation of the `LlmProvider` trait for the
//! Anthropic Messages API. Use `create_provider()` to instantiate the
//! provider named in the configuration.

pub mod anthropic;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use anthropic::AnthropicProvider;

/// Create an LLM provider based on the configuration.
///
/// Currently only the Anthropic Messages API is supported; any other
/// provider name is rejected so a misconfiguration fails at startup
/// instead of on the first query.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(config)?)),
        other => Err(LlmError::ApiRequest {
            message: format!("Unknown provider '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(provider: &str, api_key_env: &str) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            api_key_env: api_key_env.to_string(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_create_provider_anthropic() {
        std::env::set_var("PARALLEL_TEST_API_KEY", "test-key-123");
        let config = test_config("anthropic", "PARALLEL_TEST_API_KEY");
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "claude-3-5-haiku-20241022");
        std::env::remove_var("PARALLEL_TEST_API_KEY");
    }

    #[test]
    fn test_create_provider_unknown_rejected() {
        let config = test_config("openai", "PARALLEL_TEST_API_KEY_2");
        let result = create_provider(&config);
        assert!(matches!(result, Err(LlmError::ApiRequest { .. })));
    }

    #[test]
    fn test_create_provider_missing_key() {
        std::env::remove_var("PARALLEL_NONEXISTENT_KEY");
        let config = test_config("anthropic", "PARALLEL_NONEXISTENT_KEY");
        let result = create_provider(&config);
        match result {
            Err(LlmError::AuthFailed { provider }) => {
                assert!(provider.contains("PARALLEL_NONEXISTENT_KEY"));
            }
            other => panic!("Expected AuthFailed, got {:?}", other.err()),
        }
    }
}
