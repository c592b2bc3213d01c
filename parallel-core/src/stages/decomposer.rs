//! Query decomposition stage.

use crate::brain::LlmProvider;
use crate::error::LlmError;
use crate::parser::parse_decomposition;
use crate::prompts::{render, DECOMPOSITION_PROMPT};
use crate::types::{CompletionRequest, Decomposition, TokenUsage};
use std::sync::Arc;
use tracing::debug;

/// Splits one user query into subject-scoped parallel subtasks.
#[derive(Clone)]
pub struct Decomposer {
    provider: Arc<dyn LlmProvider>,
    max_tasks: usize,
}

impl Decomposer {
    pub fn new(provider: Arc<dyn LlmProvider>, max_tasks: usize) -> Self {
        Self {
            provider,
            max_tasks,
        }
    }

    /// Decompose `query` into parallel subtasks.
    ///
    /// Unparseable model text degrades to the single-task fallback; only a
    /// provider failure is an error.
    pub async fn decompose(&self, query: &str) -> Result<(Decomposition, TokenUsage), LlmError> {
        let prompt = render(DECOMPOSITION_PROMPT, &[("user_query", query)]);
        let response = self
            .provider
            .complete(CompletionRequest::from_prompt(prompt))
            .await?;

        let decomposition = parse_decomposition(&response.content, query, self.max_tasks);
        debug!(
            task_count = decomposition.tasks.len(),
            "Decomposed query into subtasks"
        );
        Ok((decomposition, response.usage))
    }
}
