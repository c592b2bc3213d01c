//! Error types for the Parallel orchestration core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the LLM provider boundary, transport delivery, engine
//! orchestration, and configuration domains.
//!
//! Parse failures are deliberately absent from this taxonomy: free-form
//! model text is not a reliable contract, so every parser in this crate
//! resolves a failed parse to a defined fallback value instead of an error.

/// Top-level error type for the parallel-core library.
#[derive(Debug, thiserror::Error)]
pub enum ParallelError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Streaming error: {message}")]
    Streaming { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from event delivery to a client.
///
/// A closed transport is terminal for the run but never fatal: emitting
/// into a closed adapter is a no-op and in-flight work runs to completion
/// with its output discarded.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,

    #[error("Failed to send event: {message}")]
    SendFailed { message: String },
}

/// Errors during engine-level orchestration, not attributable to one task.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No user message found in the query")]
    NoUserQuery,

    #[error("Dispatched task panicked: {message}")]
    TaskPanicked { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `ParallelError`.
pub type Result<T> = std::result::Result<T, ParallelError>;
