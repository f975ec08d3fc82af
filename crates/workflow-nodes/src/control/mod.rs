//! Control flow nodes
//!
//! Nodes that shape the run itself: setting variables and choosing
//! which outgoing edge to follow.

mod condition;
mod variable;

pub use condition::ConditionHandler;
pub use variable::VariableHandler;
