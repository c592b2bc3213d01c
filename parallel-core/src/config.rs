//! Configuration for the Parallel engine and server.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. Environment variables are prefixed `PARALLEL_` with `__`
//! separating nesting levels (e.g. `PARALLEL_ENGINE__MAX_PARALLEL_TASKS`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParallelConfig {
    pub llm: LlmConfig,
    pub engine: EngineConfig,
    pub server: ServerConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name; currently "anthropic".
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Default temperature for generation.
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-3-5-haiku-20241022".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// Orchestration limits consumed by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cap on concurrent subtasks; also caps the decomposer's declared count.
    pub max_parallel_tasks: usize,
    /// Upper bound on the evaluate -> rebranch loop.
    pub max_rebranch_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 4,
            max_rebranch_iterations: 3,
        }
    }
}

/// HTTP/WebSocket server binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ParallelConfig {
    /// Validate this config and return any warnings.
    ///
    /// Returns human-readable warning messages for problematic values;
    /// an empty Vec means the config is usable as-is.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.engine.max_parallel_tasks == 0 {
            warnings.push("engine.max_parallel_tasks is 0; every query will collapse to a single task".to_string());
        }
        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            warnings.push(format!(
                "llm.temperature ({}) is outside the typical range 0.0-2.0",
                self.llm.temperature
            ));
        }
        warnings
    }
}

/// Load configuration: defaults, then an optional TOML file, then
/// `PARALLEL_`-prefixed environment variables.
pub fn load_config(config_path: Option<&Path>) -> Result<ParallelConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(ParallelConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("PARALLEL_").split("__"));

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ParallelConfig::default();
        assert_eq!(config.engine.max_parallel_tasks, 4);
        assert_eq!(config.engine.max_rebranch_iterations, 3);
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_load_without_file_gives_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.engine.max_parallel_tasks, 4);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[engine]\nmax_parallel_tasks = 8\nmax_rebranch_iterations = 1\n\n[server]\nhost = \"0.0.0.0\"\nport = 9000"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.engine.max_parallel_tasks, 8);
        assert_eq!(config.engine.max_rebranch_iterations, 1);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        // Unspecified sections keep defaults.
        assert_eq!(config.llm.model, "claude-3-5-haiku-20241022");
    }

    #[test]
    fn test_validate_flags_zero_parallelism() {
        let mut config = ParallelConfig::default();
        config.engine.max_parallel_tasks = 0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("max_parallel_tasks"));
    }

    #[test]
    fn test_validate_clean_config() {
        assert!(ParallelConfig::default().validate().is_empty());
    }
}
