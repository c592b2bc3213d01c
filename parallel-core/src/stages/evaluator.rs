//! Result evaluation and rebranch stages.
//!
//! The evaluator judges whether the current iteration's results can be
//! synthesized; when they cannot, its rebranch operation generates a
//! replacement task set focused on the promising paths it identified.
//! Both share the decomposition field grammar on the rebranch side.

use crate::brain::LlmProvider;
use crate::error::LlmError;
use crate::parser::{parse_decomposition, parse_evaluation};
use crate::prompts::{format_task_results, render, EVALUATION_PROMPT, REBRANCH_PROMPT};
use crate::types::{CompletionRequest, Decomposition, Evaluation, TaskResult, TokenUsage};
use std::sync::Arc;
use tracing::debug;

/// Judges result readiness and generates rebranch task sets.
#[derive(Clone)]
pub struct Evaluator {
    provider: Arc<dyn LlmProvider>,
    max_tasks: usize,
}

impl Evaluator {
    pub fn new(provider: Arc<dyn LlmProvider>, max_tasks: usize) -> Self {
        Self {
            provider,
            max_tasks,
        }
    }

    /// Evaluate whether `results` suffice to answer `query`.
    ///
    /// Unparseable model text fails open to `ready = true` so a malformed
    /// response can never trap the run in the rebranch loop.
    pub async fn evaluate(
        &self,
        query: &str,
        results: &[TaskResult],
    ) -> Result<(Evaluation, TokenUsage), LlmError> {
        let prompt = render(
            EVALUATION_PROMPT,
            &[
                ("user_query", query),
                ("task_results", &results_block(results)),
            ],
        );
        let response = self
            .provider
            .complete(CompletionRequest::from_prompt(prompt))
            .await?;

        let evaluation = parse_evaluation(&response.content);
        debug!(
            ready = evaluation.ready,
            path_count = evaluation.promising_paths.len(),
            "Evaluated iteration results"
        );
        Ok((evaluation, response.usage))
    }

    /// Generate a replacement task set exploring `promising_paths`.
    ///
    /// Shares the decomposition grammar and its single-task fallback.
    pub async fn rebranch(
        &self,
        query: &str,
        results: &[TaskResult],
        promising_paths: &[String],
    ) -> Result<(Decomposition, TokenUsage), LlmError> {
        let paths = promising_paths
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}. {}", i + 1, p))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = render(
            REBRANCH_PROMPT,
            &[
                ("user_query", query),
                ("task_results", &results_block(results)),
                ("promising_paths", &paths),
            ],
        );
        let response = self
            .provider
            .complete(CompletionRequest::from_prompt(prompt))
            .await?;

        let decomposition = parse_decomposition(&response.content, query, self.max_tasks);
        debug!(
            task_count = decomposition.tasks.len(),
            "Generated rebranch task set"
        );
        Ok((decomposition, response.usage))
    }
}

fn results_block(results: &[TaskResult]) -> String {
    let pairs: Vec<(String, String)> = results
        .iter()
        .map(|r| (r.subject.clone(), r.content.clone()))
        .collect();
    format_task_results(&pairs)
}
