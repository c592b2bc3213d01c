//! Final answer synthesis stage.
//!
//! The one stage allowed to stream: its output is the user-visible final
//! answer and must be perceived as low-latency. When the model call fails
//! the deterministic fallback concatenates whatever results exist, so the
//! client always receives some final response.

use crate::brain::LlmProvider;
use crate::error::LlmError;
use crate::prompts::{format_task_results, render, SYNTHESIS_PROMPT};
use crate::types::{CompletionRequest, ProviderEvent, TaskResult};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Combines all accumulated task results into one final answer.
#[derive(Clone)]
pub struct Synthesizer {
    provider: Arc<dyn LlmProvider>,
}

impl Synthesizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Stream a synthesized answer for `results`, which the caller has
    /// already sorted into presentation order.
    pub async fn synthesize(
        &self,
        query: &str,
        results: &[TaskResult],
        tx: mpsc::Sender<ProviderEvent>,
    ) -> Result<(), LlmError> {
        let pairs: Vec<(String, String)> = results
            .iter()
            .map(|r| (r.subject.clone(), r.content.clone()))
            .collect();
        let prompt = render(
            SYNTHESIS_PROMPT,
            &[
                ("user_query", query),
                ("task_results", &format_task_results(&pairs)),
            ],
        );

        self.provider
            .complete_streaming(CompletionRequest::from_prompt(prompt), tx)
            .await
    }

    /// Deterministic fallback when the synthesis call fails: concatenate
    /// non-empty results grouped by iteration, then subject.
    pub fn fallback_response(results: &[TaskResult]) -> String {
        let mut kept: Vec<&TaskResult> = results
            .iter()
            .filter(|r| !r.content.trim().is_empty())
            .collect();
        if kept.is_empty() {
            return "I was unable to produce results for this query. Please try again."
                .to_string();
        }
        kept.sort_by_key(|r| (r.iteration, r.task_index));

        let mut out = String::new();
        let mut current_iteration = None;
        for r in kept {
            if current_iteration != Some(r.iteration) {
                if current_iteration.is_some() {
                    out.push('\n');
                }
                out.push_str(&format!("## Research round {}\n\n", r.iteration + 1));
                current_iteration = Some(r.iteration);
            }
            out.push_str(&format!("### {}\n\n{}\n\n", r.subject, r.content.trim()));
        }
        out.trim_end().to_string()
    }
}
