//! Core type definitions for the Parallel engine.
//!
//! Defines the conversation turns sent to the model boundary, the
//! structured results produced by each stage, and the token accounting
//! that accumulates bottom-up into the final metadata event.

use serde::{Deserialize, Serialize};

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single turn in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Token usage statistics from an LLM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A request to the LLM for completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
    pub model: Option<String>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            temperature: 0.7,
            max_tokens: None,
            model: None,
        }
    }
}

impl CompletionRequest {
    /// Build a single-turn user request, the common case for stage calls.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            ..Self::default()
        }
    }
}

/// The result of a non-streaming LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// An event received from the provider during response streaming.
///
/// `Done` carries the authoritative cumulative token counts for the call.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    Token(String),
    Done { usage: TokenUsage },
    Error(String),
}

/// One subject-scoped subtask produced by decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub subject: String,
    pub prompt: String,
}

impl SubTask {
    pub fn new(subject: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            prompt: prompt.into(),
        }
    }
}

/// The result of decomposing one query into parallel subtasks.
///
/// `tasks` is never empty: when decomposition text cannot be parsed the
/// fallback wraps the entire original query as a single task. Task order
/// is significant — the array index is the task's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decomposition {
    pub summary: String,
    pub tasks: Vec<SubTask>,
}

impl Decomposition {
    /// Subject label used by the single-task fallback.
    pub const FALLBACK_SUBJECT: &'static str = "Default";

    /// The one-task fallback wrapping the original query.
    pub fn fallback(query: impl Into<String>) -> Self {
        Self {
            summary: "Unable to decompose query".to_string(),
            tasks: vec![SubTask::new(Self::FALLBACK_SUBJECT, query)],
        }
    }
}

/// The evaluator's verdict on whether accumulated results can be synthesized.
///
/// `promising_paths` is only meaningful when `ready` is false; when ready
/// (or when evaluation text cannot be parsed) it is empty and the engine
/// proceeds to synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub ready: bool,
    pub explanation: String,
    pub promising_paths: Vec<String>,
}

impl Evaluation {
    /// Fail-open default: proceed to synthesis.
    pub fn ready_fallback() -> Self {
        Self {
            ready: true,
            explanation: "Unable to parse evaluation response".to_string(),
            promising_paths: Vec::new(),
        }
    }
}

/// The finalized output of one dispatched subtask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Index of the task within its decomposition, used for synthesis ordering.
    pub task_index: usize,
    pub subject: String,
    /// Accumulated streamed content; empty if the task failed.
    pub content: String,
    pub usage: TokenUsage,
    /// Which dispatch round produced this result (0 = initial decomposition).
    pub iteration: usize,
}

impl TaskResult {
    /// Sort key for final synthesis: task index first, iteration breaks ties.
    pub fn sort_results(results: &mut [TaskResult]) {
        results.sort_by_key(|r| (r.task_index, r.iteration));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello, world!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, world!");
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert_eq!(Role::System.to_string(), "system");
    }

    #[test]
    fn test_role_serde_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_token_usage_accumulate() {
        let mut usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
        };
        let other = TokenUsage {
            input_tokens: 25,
            output_tokens: 75,
        };
        usage.accumulate(&other);
        assert_eq!(usage.input_tokens, 125);
        assert_eq!(usage.output_tokens, 125);
        assert_eq!(usage.total(), 250);
    }

    #[test]
    fn test_decomposition_fallback() {
        let d = Decomposition::fallback("original query text");
        assert_eq!(d.tasks.len(), 1);
        assert_eq!(d.tasks[0].subject, Decomposition::FALLBACK_SUBJECT);
        assert_eq!(d.tasks[0].prompt, "original query text");
    }

    #[test]
    fn test_evaluation_fallback_is_ready() {
        let e = Evaluation::ready_fallback();
        assert!(e.ready);
        assert!(e.promising_paths.is_empty());
    }

    #[test]
    fn test_sort_results_by_index_then_iteration() {
        let mk = |task_index, iteration| TaskResult {
            task_index,
            subject: format!("s{task_index}"),
            content: String::new(),
            usage: TokenUsage::default(),
            iteration,
        };
        let mut results = vec![mk(1, 0), mk(0, 1), mk(0, 0), mk(1, 1)];
        TaskResult::sort_results(&mut results);
        let keys: Vec<(usize, usize)> =
            results.iter().map(|r| (r.task_index, r.iteration)).collect();
        assert_eq!(keys, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    proptest::proptest! {
        #[test]
        fn prop_sort_results_idempotent(
            keys in proptest::collection::vec((0usize..8, 0usize..4), 0..32)
        ) {
            let mut results: Vec<TaskResult> = keys
                .iter()
                .map(|&(task_index, iteration)| TaskResult {
                    task_index,
                    subject: String::new(),
                    content: String::new(),
                    usage: TokenUsage::default(),
                    iteration,
                })
                .collect();
            TaskResult::sort_results(&mut results);
            let once = results.clone();
            TaskResult::sort_results(&mut results);
            proptest::prop_assert_eq!(results, once);
        }
    }

    #[test]
    fn test_sort_results_idempotent() {
        let mk = |task_index, iteration| TaskResult {
            task_index,
            subject: String::new(),
            content: String::new(),
            usage: TokenUsage::default(),
            iteration,
        };
        let mut results = vec![mk(2, 0), mk(0, 1), mk(1, 0)];
        TaskResult::sort_results(&mut results);
        let once = results.clone();
        TaskResult::sort_results(&mut results);
        assert_eq!(results, once);
    }
}
