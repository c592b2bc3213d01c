//! The orchestration engine.
//!
//! Drives one query through the decompose -> dispatch -> await -> evaluate
//! -> (rebranch -> dispatch)* -> synthesize pipeline, emitting the ordered
//! event stream along the way. Within one task, content chunks preserve
//! model emission order; across tasks events interleave in arrival order
//! and consumers group by `task_id`.
//!
//! Failure containment: a task failure produces a task-scoped error event
//! and an empty result while siblings continue; a stage failure degrades
//! to that stage's fallback; on every path, including run-scoped errors,
//! exactly one terminal metadata event is emitted and the transport is
//! closed.

use crate::brain::LlmProvider;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::events::{generate_id, EventKind, StreamEvent};
use crate::stages::{Decomposer, Evaluator, Synthesizer};
use crate::transport::TransportAdapter;
use crate::types::{
    CompletionRequest, Decomposition, Evaluation, Message, ProviderEvent, Role, SubTask,
    TaskResult, TokenUsage,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Per-result character cap for the prior-round digest appended to
/// rebranched task prompts.
const DIGEST_CHARS_PER_RESULT: usize = 600;

#[derive(Debug, Default)]
struct RunStats {
    task_count: usize,
    iterations: usize,
    usage: TokenUsage,
}

/// Orchestrates one query from intake to final synthesized answer.
pub struct ParallelEngine {
    provider: Arc<dyn LlmProvider>,
    decomposer: Decomposer,
    evaluator: Evaluator,
    synthesizer: Synthesizer,
    config: EngineConfig,
}

impl ParallelEngine {
    pub fn new(provider: Arc<dyn LlmProvider>, config: EngineConfig) -> Self {
        Self {
            decomposer: Decomposer::new(provider.clone(), config.max_parallel_tasks),
            evaluator: Evaluator::new(provider.clone(), config.max_parallel_tasks),
            synthesizer: Synthesizer::new(provider.clone()),
            provider,
            config,
        }
    }

    /// Process one query, emitting the full event stream into `transport`.
    ///
    /// Always emits a terminal metadata event and closes the transport,
    /// even when orchestration itself fails.
    pub async fn process_query(
        &self,
        messages: Vec<Message>,
        transport: Arc<dyn TransportAdapter>,
    ) -> Result<(), EngineError> {
        let sequence_id = generate_id();
        let mut stats = RunStats::default();

        info!(sequence_id = sequence_id.as_str(), "Starting orchestration run");
        let outcome = self
            .run(&messages, &sequence_id, &transport, &mut stats)
            .await;

        if let Err(e) = &outcome {
            error!(sequence_id = sequence_id.as_str(), error = %e, "Orchestration run failed");
            transport
                .send_event(
                    StreamEvent::new(EventKind::Error, &sequence_id)
                        .content(format!("Orchestration failed: {e}")),
                )
                .await;
        }

        transport
            .send_event(
                StreamEvent::new(EventKind::Metadata, &sequence_id)
                    .meta("status", "all_complete")
                    .meta("task_count", stats.task_count as u64)
                    .meta("iterations", stats.iterations as u64)
                    .meta("input_tokens", stats.usage.input_tokens as u64)
                    .meta("output_tokens", stats.usage.output_tokens as u64),
            )
            .await;
        transport.close().await;

        outcome
    }

    async fn run(
        &self,
        messages: &[Message],
        sequence_id: &str,
        transport: &Arc<dyn TransportAdapter>,
        stats: &mut RunStats,
    ) -> Result<(), EngineError> {
        let query = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .ok_or(EngineError::NoUserQuery)?;

        // DECOMPOSE
        transport
            .send_event(
                StreamEvent::new(EventKind::ThinkingStart, sequence_id)
                    .content("Analyzing query...")
                    .meta("stage", "decomposition")
                    .meta("iteration", 0u64),
            )
            .await;

        let decomposition = match self.decomposer.decompose(&query).await {
            Ok((d, usage)) => {
                stats.usage.accumulate(&usage);
                d
            }
            Err(e) => {
                warn!(error = %e, "Decomposition call failed, running query as a single task");
                transport
                    .send_event(
                        StreamEvent::new(EventKind::Error, sequence_id)
                            .content(format!("Decomposition failed: {e}"))
                            .meta("stage", "decomposition"),
                    )
                    .await;
                Decomposition::fallback(&query)
            }
        };

        transport
            .send_event(
                StreamEvent::new(EventKind::ThinkingUpdate, sequence_id)
                    .content(decomposition.summary.clone()),
            )
            .await;
        transport
            .send_event(
                StreamEvent::new(EventKind::ThinkingEnd, sequence_id)
                    .meta("stage", "decomposition")
                    .meta("iteration", 0u64)
                    .meta("subjects", subjects_of(&decomposition.tasks)),
            )
            .await;

        let mut tasks = decomposition.tasks;
        let mut all_results: Vec<TaskResult> = Vec::new();
        let mut iteration = 0usize;

        loop {
            // DISPATCH + AWAIT_RESULTS
            let digest = if iteration > 0 {
                Some(prior_digest(&all_results))
            } else {
                None
            };

            let mut join_set = JoinSet::new();
            for (task_index, task) in tasks.iter().enumerate() {
                let request = build_task_request(messages, &task.prompt, digest.as_deref());
                join_set.spawn(Self::run_task(
                    self.provider.clone(),
                    transport.clone(),
                    sequence_id.to_string(),
                    task.clone(),
                    task_index,
                    iteration,
                    request,
                ));
            }

            let mut round_results = Vec::new();
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(result) => {
                        stats.usage.accumulate(&result.usage);
                        round_results.push(result);
                    }
                    Err(e) => {
                        let err = EngineError::TaskPanicked {
                            message: e.to_string(),
                        };
                        error!(error = %err, "Dispatched task panicked");
                        transport
                            .send_event(
                                StreamEvent::new(EventKind::Error, sequence_id)
                                    .content(err.to_string()),
                            )
                            .await;
                    }
                }
            }
            stats.task_count += round_results.len();

            // EVALUATE (skipped once the iteration budget is exhausted)
            if iteration >= self.config.max_rebranch_iterations {
                debug!(iteration, "Rebranch budget exhausted, proceeding to synthesis");
                all_results.extend(round_results);
                break;
            }

            let evaluation = match self.evaluator.evaluate(&query, &round_results).await {
                Ok((e, usage)) => {
                    stats.usage.accumulate(&usage);
                    e
                }
                Err(e) => {
                    warn!(error = %e, "Evaluation call failed, proceeding to synthesis");
                    transport
                        .send_event(
                            StreamEvent::new(EventKind::Error, sequence_id)
                                .content(format!("Evaluation failed: {e}"))
                                .meta("stage", "evaluation"),
                        )
                        .await;
                    Evaluation::ready_fallback()
                }
            };
            all_results.extend(round_results);

            if evaluation.ready || evaluation.promising_paths.is_empty() {
                break;
            }

            // REBRANCH
            transport
                .send_event(
                    StreamEvent::new(EventKind::RebranchStart, sequence_id)
                        .content(evaluation.explanation.clone())
                        .meta("iteration", iteration as u64)
                        .meta("promising_paths", evaluation.promising_paths.clone()),
                )
                .await;

            let next = match self
                .evaluator
                .rebranch(&query, &all_results, &evaluation.promising_paths)
                .await
            {
                Ok((d, usage)) => {
                    stats.usage.accumulate(&usage);
                    d
                }
                Err(e) => {
                    warn!(error = %e, "Rebranch call failed, proceeding to synthesis");
                    transport
                        .send_event(
                            StreamEvent::new(EventKind::Error, sequence_id)
                                .content(format!("Rebranch failed: {e}"))
                                .meta("stage", "rebranch"),
                        )
                        .await;
                    break;
                }
            };

            iteration += 1;
            tasks = next.tasks;
            info!(iteration, task_count = tasks.len(), "Rebranching into new task set");
            transport
                .send_event(
                    StreamEvent::new(EventKind::RebranchEnd, sequence_id)
                        .meta("iteration", iteration as u64)
                        .meta("subjects", subjects_of(&tasks)),
                )
                .await;
        }
        stats.iterations = iteration;

        // SYNTHESIZE
        TaskResult::sort_results(&mut all_results);
        let final_text = if all_results.len() == 1 {
            // One result: its content is the final answer, no model call.
            let content = all_results[0].content.clone();
            if content.trim().is_empty() {
                Synthesizer::fallback_response(&all_results)
            } else {
                content
            }
        } else {
            self.synthesize_streaming(&query, &all_results, sequence_id, transport, stats)
                .await
        };

        transport
            .send_event(
                StreamEvent::new(EventKind::FinalResponse, sequence_id).content(final_text),
            )
            .await;

        Ok(())
    }

    /// Stream the synthesis stage, falling back to deterministic
    /// concatenation so the client always receives a final answer.
    async fn synthesize_streaming(
        &self,
        query: &str,
        results: &[TaskResult],
        sequence_id: &str,
        transport: &Arc<dyn TransportAdapter>,
        stats: &mut RunStats,
    ) -> String {
        transport
            .send_event(
                StreamEvent::new(EventKind::StreamStart, sequence_id).meta("stage", "synthesis"),
            )
            .await;

        let (tx, mut rx) = mpsc::channel(64);
        let drain = async {
            let mut text = String::new();
            let mut usage = TokenUsage::default();
            while let Some(event) = rx.recv().await {
                match event {
                    ProviderEvent::Token(t) => {
                        transport
                            .send_event(
                                StreamEvent::new(EventKind::ContentChunk, sequence_id)
                                    .content(t.clone())
                                    .meta("is_final_response", true),
                            )
                            .await;
                        text.push_str(&t);
                    }
                    ProviderEvent::Done { usage: u } => usage = u,
                    ProviderEvent::Error(_) => {}
                }
            }
            (text, usage)
        };
        let (call, (text, usage)) =
            tokio::join!(self.synthesizer.synthesize(query, results, tx), drain);
        stats.usage.accumulate(&usage);

        let final_text = match call {
            Ok(()) if !text.trim().is_empty() => text,
            Ok(()) => Synthesizer::fallback_response(results),
            Err(e) => {
                warn!(error = %e, "Synthesis call failed, using concatenation fallback");
                transport
                    .send_event(
                        StreamEvent::new(EventKind::Error, sequence_id)
                            .content(format!("Synthesis failed: {e}"))
                            .meta("stage", "synthesis"),
                    )
                    .await;
                let fallback = Synthesizer::fallback_response(results);
                transport
                    .send_event(
                        StreamEvent::new(EventKind::ContentChunk, sequence_id)
                            .content(fallback.clone())
                            .meta("is_final_response", true),
                    )
                    .await;
                fallback
            }
        };

        transport
            .send_event(
                StreamEvent::new(EventKind::StreamEnd, sequence_id).meta("stage", "synthesis"),
            )
            .await;

        final_text
    }

    /// Execute one subtask: stream the model response, forwarding every
    /// delta as a task-tagged content chunk, then emit the completion
    /// event. Failures yield an empty-content result; siblings continue.
    async fn run_task(
        provider: Arc<dyn LlmProvider>,
        transport: Arc<dyn TransportAdapter>,
        sequence_id: String,
        task: SubTask,
        task_index: usize,
        iteration: usize,
        request: CompletionRequest,
    ) -> TaskResult {
        let task_id = format!("{sequence_id}-task-{task_index}");

        transport
            .send_event(
                StreamEvent::new(EventKind::StreamStart, &sequence_id)
                    .task_id(&task_id)
                    .meta("subject", task.subject.clone())
                    .meta("task_index", task_index as u64)
                    .meta("iteration", iteration as u64),
            )
            .await;

        let (tx, mut rx) = mpsc::channel(64);
        let drain = async {
            let mut content = String::new();
            let mut usage = TokenUsage::default();
            let mut stream_error = None;
            while let Some(event) = rx.recv().await {
                match event {
                    ProviderEvent::Token(t) => {
                        transport
                            .send_event(
                                StreamEvent::new(EventKind::ContentChunk, &sequence_id)
                                    .task_id(&task_id)
                                    .content(t.clone()),
                            )
                            .await;
                        content.push_str(&t);
                    }
                    ProviderEvent::Done { usage: u } => usage = u,
                    ProviderEvent::Error(message) => stream_error = Some(message),
                }
            }
            (content, usage, stream_error)
        };
        let (call, (mut content, usage, stream_error)) =
            tokio::join!(provider.complete_streaming(request, tx), drain);

        let failure = match call {
            Err(e) => Some(e.to_string()),
            Ok(()) => stream_error,
        };
        if let Some(message) = failure {
            warn!(task_index, error = message.as_str(), "Subtask failed");
            transport
                .send_event(
                    StreamEvent::new(EventKind::Error, &sequence_id)
                        .task_id(&task_id)
                        .content(format!("Task failed: {message}"))
                        .meta("subject", task.subject.clone()),
                )
                .await;
            content.clear();
        }

        transport
            .send_event(
                StreamEvent::new(EventKind::ThinkingEnd, &sequence_id)
                    .task_id(&task_id)
                    .content(content.clone())
                    .meta("subject", task.subject.clone())
                    .meta("input_tokens", usage.input_tokens as u64)
                    .meta("output_tokens", usage.output_tokens as u64),
            )
            .await;

        TaskResult {
            task_index,
            subject: task.subject,
            content,
            usage,
            iteration,
        }
    }
}

fn subjects_of(tasks: &[SubTask]) -> Vec<String> {
    tasks.iter().map(|t| t.subject.clone()).collect()
}

/// Clone the original turns and replace the last user turn's text with the
/// task prompt, plus the prior-round digest after a rebranch.
fn build_task_request(
    messages: &[Message],
    prompt: &str,
    digest: Option<&str>,
) -> CompletionRequest {
    let text = match digest {
        Some(d) if !d.is_empty() => {
            format!("{prompt}\n\nContext from earlier research rounds:\n{d}")
        }
        _ => prompt.to_string(),
    };

    let mut turns = messages.to_vec();
    match turns.iter_mut().rev().find(|m| m.role == Role::User) {
        Some(last_user) => last_user.content = text,
        None => turns.push(Message::user(text)),
    }
    CompletionRequest {
        messages: turns,
        ..CompletionRequest::default()
    }
}

/// Bounded summary of prior iterations' results, one line per result.
fn prior_digest(results: &[TaskResult]) -> String {
    results
        .iter()
        .filter(|r| !r.content.trim().is_empty())
        .map(|r| {
            let mut snippet: String = r.content.chars().take(DIGEST_CHARS_PER_RESULT).collect();
            if r.content.chars().count() > DIGEST_CHARS_PER_RESULT {
                snippet.push_str("...");
            }
            format!("- {}: {}", r.subject, snippet)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
