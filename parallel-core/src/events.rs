//! Streaming event protocol.
//!
//! The ordered sequence of `StreamEvent`s emitted for one orchestration
//! run is the externally observable contract. Events serialize to two
//! wire forms: a JSON object (WebSocket) and an SSE `data:` line.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// The closed set of event kinds a run can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ThinkingStart,
    ThinkingUpdate,
    ThinkingEnd,
    RebranchStart,
    RebranchEnd,
    StreamStart,
    ContentChunk,
    StreamEnd,
    FinalResponse,
    Metadata,
    Error,
}

/// Sentinel sent as the last SSE payload of a stream.
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// Comment line sent during idle periods to keep SSE connections alive.
pub const SSE_KEEPALIVE: &str = ": keepalive\n\n";

/// Standardized event format for streaming responses.
///
/// Immutable once constructed; built via `StreamEvent::new` and the
/// builder-style `task_id` / `content` / `meta` helpers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Unique ID for the streaming sequence (one per run).
    pub sequence_id: String,
    /// ID for parallel tasks; `None` for run-scoped events.
    pub task_id: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl StreamEvent {
    pub fn new(kind: EventKind, sequence_id: impl Into<String>) -> Self {
        Self {
            kind,
            sequence_id: sequence_id.into(),
            task_id: None,
            content: None,
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> String {
        // StreamEvent has no non-serializable fields; this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Serialize to the Server-Sent Events wire form.
    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

/// Generate a unique ID for a sequence.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
