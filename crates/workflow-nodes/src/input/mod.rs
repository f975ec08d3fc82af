//! Input nodes
//!
//! Nodes that suspend the run and wait for a person to answer.

mod prompt_value;

pub use prompt_value::{prompt_answer_text, PromptValueHandler};
