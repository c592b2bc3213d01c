//! Prompt templates for the three stages.
//!
//! Each template instructs the model to answer in the fixed field grammar
//! that `parser` consumes. Substitution is plain string replacement on
//! named placeholders; templates contain no other `{`-delimited tokens.

/// Decomposes a query into subject-scoped parallel tasks.
pub const DECOMPOSITION_PROMPT: &str = r#"You are a strategic problem decomposer for a parallel research system. Analyze the user's query, identify distinct subjects or dimensions that should be researched in parallel, and create a specific prompt for each.

Rules:
- For comparison queries (e.g. "compare X and Y"), create one task per item, each analyzing only that item.
- For other queries, identify 2-3 distinct components or angles that benefit from specialized parallel research.
- Each task's prompt must focus ONLY on its specific component. Do not have every task analyze all aspects.
- Always use concrete, real-world examples; never placeholders like "City A" or "Company B".
- Keep DECOMPOSITION_SUMMARY brief and general; do not enumerate the subtasks in it.

Answer in exactly this format:
DECOMPOSITION_SUMMARY:
[brief, general explanation of the decomposition approach]
PARALLEL_TASKS_COUNT: [n]
TASK_1_SUBJECT: [specific subject]
TASK_1_PROMPT: [complete prompt focusing only on this subject]
TASK_2_SUBJECT: [specific subject]
TASK_2_PROMPT: [complete prompt focusing only on this subject]
[continue for each task]
SYNTHESIS_RECOMMENDATION: [true/false]

USER QUERY:
{user_query}
"#;

/// Combines all task results into one final answer.
pub const SYNTHESIS_PROMPT: &str = r#"You are a synthesis expert combining the results of multiple parallel research tasks into one cohesive response that directly answers the user's original query.

Rules:
- Start directly with a clear, definitive answer or recommendation; no preamble.
- Go beyond summarization: identify patterns across results, resolve contradictions, and draw connections not explicit in any single result.
- If the query asks for a decision or recommendation, take a clear stance with supporting evidence.
- Format with Markdown headings and lists. Use concrete, real-world examples only.
- Do not mention the synthesis process or that multiple task results were involved.

Original user query:
{user_query}

Task results:
{task_results}

Provide your response below:
"#;

/// Judges whether the current iteration's results suffice for synthesis.
pub const EVALUATION_PROMPT: &str = r#"You are an expert evaluator deciding whether the current set of parallel task results contains enough information to answer the user's original query, or whether promising paths need deeper exploration first.

Default to synthesis whenever possible: if at least one result provides a useful answer, if the results collectively allow a reasonable answer, or if every approach failed completely, the results are ready. Only when results are completely contradictory on critical points should you hold back, and then identify 1-3 specific promising paths worth exploring further.

Answer in exactly this format:
READY_FOR_SYNTHESIS: [true/false]

EXPLANATION:
[what was learned, what succeeded or failed, and why the results are or are not ready]

PROMISING_PATHS:
[only if not ready: a numbered list of 1-3 specific approaches to explore further]

Original user query:
{user_query}

Task results:
{task_results}

Provide your evaluation below:
"#;

/// Generates a replacement task set focused on promising paths.
pub const REBRANCH_PROMPT: &str = r#"You are a strategic problem solver generating a new set of parallel subtasks that explore the most promising paths identified from previous results, in greater depth, to reach a conclusive answer to the user's original query.

Rules:
- Stay laser-focused on the original query; do not explore tangents or add new requirements.
- Create 2-4 specific, complementary subtasks, each exploring a single promising approach.
- Include concrete guidance from lessons learned in previous attempts.

Answer in exactly this format:
DECOMPOSITION_SUMMARY:
[brief explanation of the rebranching strategy]
PARALLEL_TASKS_COUNT: [n]
TASK_1_SUBJECT: [specific approach]
TASK_1_PROMPT: [detailed prompt guiding exploration of this approach]
[continue for each task]
SYNTHESIS_RECOMMENDATION: true

Original user query:
{user_query}

Previous task results:
{task_results}

Promising paths to explore:
{promising_paths}

Provide your rebranching output below:
"#;

/// Render a template by substituting named placeholders.
pub fn render(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in substitutions {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// Format task results for inclusion in a prompt, one block per result.
pub fn format_task_results(results: &[(String, String)]) -> String {
    let mut out = String::new();
    for (i, (subject, content)) in results.iter().enumerate() {
        out.push_str(&format!("RESULT {} - {}:\n{}\n\n", i + 1, subject, content));
    }
    out
}
