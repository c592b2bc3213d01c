//! Stage components wrapping one model call each.
//!
//! Each stage composes a prompt template with the provider and the field
//! parser, returning a typed result plus the call's token usage. Provider
//! failures surface as `Err(LlmError)` for the engine to contain; parse
//! failures resolve to the stage's fallback value and are never errors.

pub mod decomposer;
pub mod evaluator;
pub mod synthesizer;

pub use decomposer::Decomposer;
pub use evaluator::Evaluator;
pub use synthesizer::Synthesizer;
