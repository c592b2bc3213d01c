//! Structured-field extraction from free-form model text.
//!
//! Stage responses follow a fixed textual grammar of `FIELD_NAME:` markers.
//! Each field's value runs from its marker to the next known marker or the
//! end of the text. The grammar is brittle by nature, so every parse here
//! degrades to a defined fallback instead of returning an error:
//!
//! - decomposition (and rebranch, which shares the grammar) falls back to
//!   a single task wrapping the original query;
//! - evaluation falls back to `ready = true` so a malformed evaluator
//!   response can never trap a run in the rebranch loop.
//!
//! Decomposition parsing is all-or-nothing: the declared task count (capped
//! at `max_tasks`) must exactly match the number of extracted subject/prompt
//! pairs, otherwise the whole parse is discarded. Partial decompositions
//! are never used.

use crate::types::{Decomposition, Evaluation, SubTask};
use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Extract the value of `marker`, terminated by the first of `terminators`
/// found after it, or end-of-text. Returns the trimmed value.
pub fn extract_field(text: &str, marker: &str, terminators: &[&str]) -> Option<String> {
    let alternation = terminators
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = if alternation.is_empty() {
        format!("{}:(.*)$", regex::escape(marker))
    } else {
        format!("{}:(.*?)(?:{}|$)", regex::escape(marker), alternation)
    };
    let re = RegexBuilder::new(&pattern)
        .dot_matches_new_line(true)
        .build()
        .ok()?;
    re.captures(text)
        .map(|caps| caps[1].trim().to_string())
}

/// Parse decomposition text into tasks, falling back to a single task
/// wrapping `original_query` on any grammar violation.
///
/// The declared `PARALLEL_TASKS_COUNT` is capped at `max_tasks` before
/// extraction, so a malformed or adversarial response cannot cause
/// unbounded fan-out.
pub fn parse_decomposition(text: &str, original_query: &str, max_tasks: usize) -> Decomposition {
    let summary = extract_field(text, "DECOMPOSITION_SUMMARY", &["PARALLEL_TASKS_COUNT:"]);

    let count_re = Regex::new(r"PARALLEL_TASKS_COUNT:\s*(\d+)").expect("static regex");
    let declared: Option<usize> = count_re
        .captures(text)
        .and_then(|caps| caps[1].parse().ok());

    let (summary, declared) = match (summary, declared) {
        (Some(s), Some(d)) if d > 0 => (s, d),
        _ => {
            debug!("Decomposition text missing summary or task count, using fallback");
            return Decomposition::fallback(original_query);
        }
    };

    let count = declared.min(max_tasks);

    let mut tasks = Vec::with_capacity(count);
    for i in 1..=count {
        let subject_marker = format!("TASK_{i}_SUBJECT");
        let prompt_marker = format!("TASK_{i}_PROMPT");
        let next_subject = format!("TASK_{}_SUBJECT:", i + 1);

        let subject = extract_field(text, &subject_marker, &[&format!("{prompt_marker}:")]);
        let prompt = extract_field(
            text,
            &prompt_marker,
            &[&next_subject, "SYNTHESIS_RECOMMENDATION:"],
        );

        if let (Some(subject), Some(prompt)) = (subject, prompt) {
            tasks.push(SubTask::new(subject, prompt));
        }
    }

    // All-or-nothing: a partial or inconsistent decomposition is never used.
    if tasks.len() != count {
        debug!(
            declared = count,
            extracted = tasks.len(),
            "Task pair count mismatch, discarding decomposition"
        );
        return Decomposition::fallback(original_query);
    }

    Decomposition { summary, tasks }
}

/// Parse evaluation text, failing open to `ready = true`.
pub fn parse_evaluation(text: &str) -> Evaluation {
    let ready_re = Regex::new(r"(?i)READY_FOR_SYNTHESIS:\s*(true|false)").expect("static regex");
    let ready = match ready_re.captures(text) {
        Some(caps) => caps[1].eq_ignore_ascii_case("true"),
        None => {
            debug!("Evaluation text missing READY_FOR_SYNTHESIS, proceeding to synthesis");
            return Evaluation::ready_fallback();
        }
    };

    let explanation =
        extract_field(text, "EXPLANATION", &["PROMISING_PATHS:"]).unwrap_or_default();

    let promising_paths = if ready {
        Vec::new()
    } else {
        extract_field(text, "PROMISING_PATHS", &[])
            .map(|block| split_numbered_list(&block))
            .unwrap_or_default()
    };

    Evaluation {
        ready,
        explanation,
        promising_paths,
    }
}

/// Split a block of `1. ... 2. ...` items into individual entries.
fn split_numbered_list(block: &str) -> Vec<String> {
    let re = Regex::new(r"(?m)^\s*\d+\.\s*").expect("static regex");
    re.split(block)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Decomposition;
    use pretty_assertions::assert_eq;

    const QUERY: &str = "Compare PostgreSQL and MySQL";

    fn two_task_text() -> String {
        "DECOMPOSITION_SUMMARY:\nSplit by database.\n\
         PARALLEL_TASKS_COUNT: 2\n\
         TASK_1_SUBJECT: PostgreSQL\n\
         TASK_1_PROMPT: Analyze PostgreSQL in depth.\n\
         TASK_2_SUBJECT: MySQL\n\
         TASK_2_PROMPT: Analyze MySQL in depth.\n\
         SYNTHESIS_RECOMMENDATION: true\n"
            .to_string()
    }

    #[test]
    fn test_extract_field_stops_at_terminator() {
        let text = "EXPLANATION: because reasons\nPROMISING_PATHS:\n1. path";
        let value = extract_field(text, "EXPLANATION", &["PROMISING_PATHS:"]).unwrap();
        assert_eq!(value, "because reasons");
    }

    #[test]
    fn test_extract_field_runs_to_end_of_text() {
        let text = "EXPLANATION: spans\nmultiple lines";
        let value = extract_field(text, "EXPLANATION", &["PROMISING_PATHS:"]).unwrap();
        assert_eq!(value, "spans\nmultiple lines");
    }

    #[test]
    fn test_extract_field_missing_marker() {
        assert!(extract_field("no markers here", "EXPLANATION", &[]).is_none());
    }

    #[test]
    fn test_parse_decomposition_well_formed() {
        let d = parse_decomposition(&two_task_text(), QUERY, 4);
        assert_eq!(d.summary, "Split by database.");
        assert_eq!(d.tasks.len(), 2);
        assert_eq!(d.tasks[0].subject, "PostgreSQL");
        assert_eq!(d.tasks[0].prompt, "Analyze PostgreSQL in depth.");
        assert_eq!(d.tasks[1].subject, "MySQL");
        assert_eq!(d.tasks[1].prompt, "Analyze MySQL in depth.");
    }

    #[test]
    fn test_parse_decomposition_missing_count_falls_back() {
        let text = "DECOMPOSITION_SUMMARY: something\nTASK_1_SUBJECT: X\nTASK_1_PROMPT: Y";
        let d = parse_decomposition(text, QUERY, 4);
        assert_eq!(d.tasks.len(), 1);
        assert_eq!(d.tasks[0].subject, Decomposition::FALLBACK_SUBJECT);
        assert_eq!(d.tasks[0].prompt, QUERY);
    }

    #[test]
    fn test_parse_decomposition_pair_count_mismatch_falls_back() {
        // Declares 3 but provides only 2 pairs.
        let text = two_task_text().replace("PARALLEL_TASKS_COUNT: 2", "PARALLEL_TASKS_COUNT: 3");
        let d = parse_decomposition(&text, QUERY, 4);
        assert_eq!(d.tasks.len(), 1);
        assert_eq!(d.tasks[0].subject, Decomposition::FALLBACK_SUBJECT);
    }

    #[test]
    fn test_parse_decomposition_truncates_to_max_tasks() {
        // Declares 2, cap at 1: only the first pair is required and kept.
        let d = parse_decomposition(&two_task_text(), QUERY, 1);
        assert_eq!(d.tasks.len(), 1);
        assert_eq!(d.tasks[0].subject, "PostgreSQL");
    }

    #[test]
    fn test_parse_decomposition_zero_count_falls_back() {
        let text = "DECOMPOSITION_SUMMARY: s\nPARALLEL_TASKS_COUNT: 0\n";
        let d = parse_decomposition(text, QUERY, 4);
        assert_eq!(d.tasks[0].subject, Decomposition::FALLBACK_SUBJECT);
    }

    #[test]
    fn test_parse_decomposition_empty_text_falls_back() {
        let d = parse_decomposition("", QUERY, 4);
        assert_eq!(d.tasks.len(), 1);
        assert_eq!(d.tasks[0].prompt, QUERY);
    }

    #[test]
    fn test_parse_decomposition_prompt_terminated_by_synthesis_marker() {
        let text = "DECOMPOSITION_SUMMARY: s\nPARALLEL_TASKS_COUNT: 1\n\
                    TASK_1_SUBJECT: Only\n\
                    TASK_1_PROMPT: Do the thing.\nSYNTHESIS_RECOMMENDATION: true";
        let d = parse_decomposition(text, QUERY, 4);
        assert_eq!(d.tasks[0].prompt, "Do the thing.");
    }

    #[test]
    fn test_parse_evaluation_ready() {
        let text = "READY_FOR_SYNTHESIS: true\n\nEXPLANATION:\nAll results are conclusive.";
        let e = parse_evaluation(text);
        assert!(e.ready);
        assert_eq!(e.explanation, "All results are conclusive.");
        assert!(e.promising_paths.is_empty());
    }

    #[test]
    fn test_parse_evaluation_not_ready_with_paths() {
        let text = "READY_FOR_SYNTHESIS: false\n\
                    EXPLANATION:\nIncomplete.\n\
                    PROMISING_PATHS:\n1. Try induction.\n2. Try partial fractions.\n";
        let e = parse_evaluation(text);
        assert!(!e.ready);
        assert_eq!(
            e.promising_paths,
            vec!["Try induction.".to_string(), "Try partial fractions.".to_string()]
        );
    }

    #[test]
    fn test_parse_evaluation_boolean_case_insensitive() {
        assert!(parse_evaluation("READY_FOR_SYNTHESIS: TRUE").ready);
        assert!(!parse_evaluation("READY_FOR_SYNTHESIS: False\nPROMISING_PATHS:\n1. x").ready);
    }

    #[test]
    fn test_parse_evaluation_missing_marker_fails_open() {
        let e = parse_evaluation("The model rambled instead of following the format.");
        assert!(e.ready);
        assert!(e.promising_paths.is_empty());
    }

    #[test]
    fn test_parse_evaluation_ready_ignores_paths_block() {
        // Paths are only meaningful when not ready.
        let text = "READY_FOR_SYNTHESIS: true\nEXPLANATION: done\nPROMISING_PATHS:\n1. stale";
        let e = parse_evaluation(text);
        assert!(e.ready);
        assert!(e.promising_paths.is_empty());
    }

    #[test]
    fn test_split_numbered_list_multiline_items() {
        let block = "1. First path\nwith continuation\n2. Second path";
        let items = split_numbered_list(block);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], "First path\nwith continuation");
        assert_eq!(items[1], "Second path");
    }
}
