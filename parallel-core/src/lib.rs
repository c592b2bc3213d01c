//! Parallel query orchestration core.
//!
//! Answers one user query by decomposing it into subject-scoped subtasks,
//! running them concurrently against an LLM provider, optionally
//! evaluating and rebranching when results are inconclusive, and
//! synthesizing everything into one final answer while streaming ordered
//! progress events to the client over SSE or WebSocket.

pub mod brain;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod parser;
pub mod prompts;
pub mod providers;
pub mod stages;
pub mod transport;
pub mod types;

pub use brain::{LlmProvider, MockLlmProvider};
pub use config::{load_config, EngineConfig, LlmConfig, ParallelConfig, ServerConfig};
pub use engine::ParallelEngine;
pub use error::{ConfigError, EngineError, LlmError, ParallelError, Result, TransportError};
pub use events::{generate_id, EventKind, StreamEvent, SSE_DONE, SSE_KEEPALIVE};
pub use providers::create_provider;
pub use transport::{sse_stream, SseTransport, TransportAdapter, WebSocketTransport};
pub use types::{
    CompletionRequest, CompletionResponse, Decomposition, Evaluation, Message, ProviderEvent,
    Role, SubTask, TaskResult, TokenUsage,
};
