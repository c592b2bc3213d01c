//! LLM provider abstraction.
//!
//! Defines the `LlmProvider` trait for model-agnostic completions with
//! streaming support, and a `MockLlmProvider` with scripted responses
//! for testing the engine without network access.

use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, ProviderEvent, TokenUsage};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Trait for LLM providers, supporting both full and streaming completions.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the buffered response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Perform a streaming completion, sending events to the channel.
    ///
    /// The final `ProviderEvent::Done` carries the authoritative cumulative
    /// token counts for the call.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<ProviderEvent>,
    ) -> Result<(), LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// A scriptable mock provider for tests.
///
/// Responses are consumed in FIFO order; when the queue is empty a canned
/// placeholder is returned. Queue an `Err` to simulate a provider failure.
pub struct MockLlmProvider {
    responses: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
    model: String,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            model: "mock-model".to_string(),
        }
    }

    /// Create a mock with a queue of text responses.
    pub fn with_responses(texts: Vec<&str>) -> Self {
        let mock = Self::new();
        for text in texts {
            mock.queue_response(Self::text_response(text));
        }
        mock
    }

    /// Queue a successful response.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().push(Ok(response));
    }

    /// Queue a text response.
    pub fn queue_text(&self, text: &str) {
        self.queue_response(Self::text_response(text));
    }

    /// Queue a provider failure.
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push(Err(error));
    }

    /// Create a plain text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: text.to_string(),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
        }
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(MockLlmProvider::text_response(
                "I'm a mock LLM. No queued responses available.",
            ))
        } else {
            responses.remove(0)
        }
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<ProviderEvent>,
    ) -> Result<(), LlmError> {
        let response = self.complete(request).await?;
        for word in response.content.split_whitespace() {
            let _ = tx.send(ProviderEvent::Token(format!("{} ", word))).await;
        }
        let _ = tx
            .send(ProviderEvent::Done {
                usage: response.usage,
            })
            .await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
