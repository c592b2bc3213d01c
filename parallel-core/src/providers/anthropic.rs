//! Anthropic Messages API provider implementation.
//!
//! Implements the `LlmProvider` trait for the native Anthropic Messages API:
//! - Auth via `x-api-key` header (not `Authorization: Bearer`)
//! - Required `anthropic-version` header
//! - System message is a top-level `system` field, not in the messages array
//! - SSE streaming uses Anthropic-specific event types

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{
    CompletionRequest, CompletionResponse, Message, ProviderEvent, Role, TokenUsage,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// The default Anthropic API base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// The required Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`. Returns `LlmError::AuthFailed` if it is not set.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| LlmError::AuthFailed {
            provider: format!("Anthropic (env var '{}' not set)", config.api_key_env),
        })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            client: Client::new(),
            base_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Build the JSON request body for the Anthropic Messages API.
    ///
    /// System turns are extracted into the top-level `system` field; user
    /// and assistant turns go into the messages array.
    fn build_request_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let max_tokens = request.max_tokens.unwrap_or(self.max_tokens);

        let (system_text, non_system) = Self::extract_system_message(&request.messages);

        let messages_json: Vec<Value> = non_system
            .iter()
            .map(|msg| {
                serde_json::json!({
                    "role": msg.role.to_string(),
                    "content": msg.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": request.temperature,
            "messages": messages_json,
        });

        if let Some(system) = &system_text {
            body["system"] = Value::String(system.clone());
        }
        if stream {
            body["stream"] = Value::Bool(true);
        }

        body
    }

    /// Extract system messages from the messages list.
    ///
    /// Returns (optional concatenated system text, non-system messages).
    fn extract_system_message(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut non_system: Vec<&Message> = Vec::new();

        for msg in messages {
            if msg.role == Role::System {
                system_parts.push(&msg.content);
            } else {
                non_system.push(msg);
            }
        }

        let system_text = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system_text, non_system)
    }

    /// Parse an Anthropic API response JSON into a `CompletionResponse`.
    fn parse_response(body: &Value) -> Result<CompletionResponse, LlmError> {
        let model = body["model"].as_str().unwrap_or("unknown").to_string();

        let usage = TokenUsage {
            input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
            output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
        };

        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'content' array in response".to_string(),
            })?;

        let content: String = blocks
            .iter()
            .filter(|b| b["type"].as_str().unwrap_or("text") == "text")
            .filter_map(|b| b["text"].as_str())
            .collect();

        Ok(CompletionResponse {
            content,
            usage,
            model,
        })
    }

    /// Map an HTTP status code to the appropriate `LlmError`.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 => LlmError::AuthFailed {
                provider: "Anthropic".to_string(),
            },
            429 => {
                let retry_after = serde_json::from_str::<Value>(body_text)
                    .ok()
                    .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                    .unwrap_or(30);
                LlmError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            _ => LlmError::ApiRequest {
                message: format!("HTTP {} from Anthropic API: {}", status, body_text),
            },
        }
    }

    /// Process one parsed SSE data payload, forwarding text deltas.
    ///
    /// Returns partial usage carried by the event, if any. Input tokens
    /// arrive on `message_start`, output tokens on `message_delta`.
    async fn process_sse_data(
        data: &Value,
        tx: &mpsc::Sender<ProviderEvent>,
    ) -> Result<Option<TokenUsage>, LlmError> {
        let event_type = data["type"].as_str().unwrap_or("");
        match event_type {
            "message_start" => {
                let input_tokens =
                    data["message"]["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize;
                Ok(Some(TokenUsage {
                    input_tokens,
                    output_tokens: 0,
                }))
            }
            "content_block_delta" => {
                if data["delta"]["type"].as_str() == Some("text_delta") {
                    let text = data["delta"]["text"].as_str().unwrap_or("").to_string();
                    if !text.is_empty() {
                        let _ = tx.send(ProviderEvent::Token(text)).await;
                    }
                }
                Ok(None)
            }
            "message_delta" => {
                let output_tokens = data["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize;
                Ok(Some(TokenUsage {
                    input_tokens: 0,
                    output_tokens,
                }))
            }
            "error" => {
                let message = data["error"]["message"]
                    .as_str()
                    .unwrap_or("Unknown streaming error")
                    .to_string();
                let _ = tx.send(ProviderEvent::Error(message.clone())).await;
                Err(LlmError::Streaming { message })
            }
            // content_block_start/stop, message_stop, ping
            other => {
                debug!(event_type = other, "Ignoring SSE event type");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    /// Perform a full (non-streaming) completion via the Anthropic Messages API.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request_body(&request, false);
        let url = format!("{}/messages", self.base_url);

        debug!(model = self.model.as_str(), "Sending Anthropic completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest {
                message: format!("Request to Anthropic API failed: {}", e),
            })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json)
    }

    /// Perform a streaming completion, forwarding text deltas as they arrive.
    ///
    /// The final `ProviderEvent::Done` carries the accumulated token usage.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<ProviderEvent>,
    ) -> Result<(), LlmError> {
        let body = self.build_request_body(&request, true);
        let url = format!("{}/messages", self.base_url);

        debug!(model = self.model.as_str(), "Sending Anthropic streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest {
                message: format!("Streaming request to Anthropic API failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        let mut total_usage = TokenUsage::default();
        let mut line_buf = String::new();
        let mut stream = response.bytes_stream();

        // Incremental SSE parse: deltas are forwarded as soon as a complete
        // `data:` line arrives, not after the whole body has been read.
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Streaming {
                message: format!("Failed to read streaming response: {}", e),
            })?;
            line_buf.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = line_buf.find('\n') {
                let line: String = line_buf.drain(..=newline).collect();
                let line = line.trim();

                let Some(data_str) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data_str == "[DONE]" {
                    continue;
                }
                let Ok(data) = serde_json::from_str::<Value>(data_str) else {
                    continue;
                };
                if let Some(partial) = Self::process_sse_data(&data, &tx).await? {
                    total_usage.accumulate(&partial);
                }
            }
        }

        let _ = tx.send(ProviderEvent::Done { usage: total_usage }).await;
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(api_key_env: &str) -> LlmConfig {
        LlmConfig {
            api_key_env: api_key_env.to_string(),
            ..LlmConfig::default()
        }
    }

    fn make_provider() -> AnthropicProvider {
        std::env::set_var("ANTHROPIC_TEST_KEY_UNIT", "sk-ant-test-key-12345");
        AnthropicProvider::new(&test_config("ANTHROPIC_TEST_KEY_UNIT")).unwrap()
    }

    #[test]
    fn test_new_reads_env() {
        let env_var = "ANTHROPIC_TEST_KEY_NEW_READS";
        std::env::set_var(env_var, "sk-ant-my-secret-key");
        let provider = AnthropicProvider::new(&test_config(env_var)).unwrap();
        assert_eq!(provider.api_key, "sk-ant-my-secret-key");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        std::env::remove_var(env_var);
    }

    #[test]
    fn test_new_missing_env_returns_auth_failed() {
        std::env::remove_var("ANTHROPIC_MISSING_KEY_XYZ");
        let result = AnthropicProvider::new(&test_config("ANTHROPIC_MISSING_KEY_XYZ"));
        match result {
            Err(LlmError::AuthFailed { provider }) => {
                assert!(provider.contains("ANTHROPIC_MISSING_KEY_XYZ"));
            }
            other => panic!("Expected AuthFailed, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_new_custom_base_url() {
        let env_var = "ANTHROPIC_TEST_KEY_CUSTOM_URL";
        std::env::set_var(env_var, "test-key");
        let mut config = test_config(env_var);
        config.base_url = Some("https://my-proxy.example.com/v1".to_string());
        let provider = AnthropicProvider::new(&config).unwrap();
        assert_eq!(provider.base_url, "https://my-proxy.example.com/v1");
        std::env::remove_var(env_var);
    }

    #[test]
    fn test_build_request_body_extracts_system() {
        let provider = make_provider();
        let request = CompletionRequest {
            messages: vec![
                Message::new(Role::System, "Be terse."),
                Message::user("Hello!"),
            ],
            ..CompletionRequest::default()
        };
        let body = provider.build_request_body(&request, false);

        assert_eq!(body["system"], "Be terse.");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[0]["content"], "Hello!");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_build_request_body_stream_flag() {
        let provider = make_provider();
        let body = provider.build_request_body(&CompletionRequest::from_prompt("q"), true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn test_parse_response_concatenates_text_blocks() {
        let body = serde_json::json!({
            "model": "claude-3-5-haiku-20241022",
            "content": [
                {"type": "text", "text": "Hello "},
                {"type": "text", "text": "world"},
            ],
            "usage": {"input_tokens": 12, "output_tokens": 3},
        });
        let response = AnthropicProvider::parse_response(&body).unwrap();
        assert_eq!(response.content, "Hello world");
        assert_eq!(response.usage.input_tokens, 12);
        assert_eq!(response.usage.output_tokens, 3);
    }

    #[test]
    fn test_parse_response_missing_content_errors() {
        let body = serde_json::json!({"model": "m", "usage": {}});
        let result = AnthropicProvider::parse_response(&body);
        assert!(matches!(result, Err(LlmError::ResponseParse { .. })));
    }

    #[test]
    fn test_map_http_error_auth() {
        let err = AnthropicProvider::map_http_error(reqwest::StatusCode::UNAUTHORIZED, "");
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn test_map_http_error_rate_limited() {
        let err = AnthropicProvider::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error": {"retry_after_secs": 12}}"#,
        );
        match err {
            LlmError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 12),
            other => panic!("Expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_process_sse_data_text_delta() {
        let (tx, mut rx) = mpsc::channel(8);
        let data = serde_json::json!({
            "type": "content_block_delta",
            "delta": {"type": "text_delta", "text": "hi"},
        });
        let usage = AnthropicProvider::process_sse_data(&data, &tx).await.unwrap();
        assert!(usage.is_none());
        match rx.recv().await.unwrap() {
            ProviderEvent::Token(t) => assert_eq!(t, "hi"),
            other => panic!("Expected Token, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_process_sse_data_usage_events() {
        let (tx, _rx) = mpsc::channel(8);
        let start = serde_json::json!({
            "type": "message_start",
            "message": {"usage": {"input_tokens": 40}},
        });
        let usage = AnthropicProvider::process_sse_data(&start, &tx).await.unwrap();
        assert_eq!(usage.unwrap().input_tokens, 40);

        let delta = serde_json::json!({
            "type": "message_delta",
            "usage": {"output_tokens": 17},
        });
        let usage = AnthropicProvider::process_sse_data(&delta, &tx).await.unwrap();
        assert_eq!(usage.unwrap().output_tokens, 17);
    }

    #[tokio::test]
    async fn test_process_sse_data_error_event() {
        let (tx, mut rx) = mpsc::channel(8);
        let data = serde_json::json!({
            "type": "error",
            "error": {"message": "overloaded"},
        });
        let result = AnthropicProvider::process_sse_data(&data, &tx).await;
        assert!(matches!(result, Err(LlmError::Streaming { .. })));
        assert!(matches!(rx.recv().await, Some(ProviderEvent::Error(_))));
    }
}
