//! Agent runtime states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one agent runtime invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    /// Not started.
    Idle,
    /// Waiting on the model.
    Prompting,
    /// The model asked for one or more tools.
    ToolCallRequested,
    /// Tools are running.
    ToolExecuting,
    /// Structured output accepted.
    Completed,
    /// Invocation ended with an error.
    Failed,
}

impl RuntimeState {
    /// Checks if the runtime can transition to the given state.
    #[must_use]
    #[allow(clippy::match_same_arms)] // Each arm represents a distinct state transition rule
    pub const fn can_transition_to(&self, to: Self) -> bool {
        match (self, to) {
            // From Idle: start prompting, or fail before the first prompt (cancellation)
            (Self::Idle, Self::Prompting | Self::Failed) => true,
            // From Prompting: tools requested, output accepted, or failure
            (Self::Prompting, Self::ToolCallRequested | Self::Completed | Self::Failed) => true,
            // From ToolCallRequested: dispatch, or fail on the round bound
            (Self::ToolCallRequested, Self::ToolExecuting | Self::Failed) => true,
            // From ToolExecuting: results go back to the model
            (Self::ToolExecuting, Self::Prompting | Self::Failed) => true,
            // Completed and Failed are terminal
            _ => false,
        }
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Prompting => "prompting",
            Self::ToolCallRequested => "tool_call_requested",
            Self::ToolExecuting => "tool_executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
