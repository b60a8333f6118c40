//! The two agents built on [`AgentRuntime`](crate::runtime::AgentRuntime).

pub mod generator;
pub mod judge;
pub mod prompts;

pub use generator::{GenerationOutput, GoalGenerator};
pub use judge::GoalJudge;
