// Error types for the goal pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Resolving a note reference before generation.
    Intake,
    /// Goal generation.
    Generation,
    /// Goal evaluation by the judge.
    Evaluation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intake => write!(f, "intake"),
            Self::Generation => write!(f, "generation"),
            Self::Evaluation => write!(f, "evaluation"),
        }
    }
}

/// How the orchestrator treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Retry the stage under its retry policy.
    Retryable,
    /// Abort the run at once; retrying cannot help.
    FailFast,
    /// Abort the run; the outcome itself is the failure.
    Fatal,
}

/// Pipeline errors
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineError {
    /// Provider unreachable, rate limited, or refused the credentials.
    #[error("Model unavailable: {reason}")]
    ModelUnavailable {
        /// Provider error text
        reason: String,
    },

    /// Model output could not be parsed into the required schema.
    #[error("Malformed response from {role}: {reason}")]
    MalformedResponse {
        /// Agent role that produced the output
        role: String,
        /// What was wrong with it
        reason: String,
    },

    /// Caller is not permitted to use the tool.
    #[error("Tool '{tool}' is not permitted for {caller}")]
    ToolNotPermitted {
        /// Tool name
        tool: String,
        /// Caller name
        caller: String,
    },

    /// Tool arguments failed schema validation.
    #[error("Invalid input for tool '{tool}': {reason}")]
    ToolInputInvalid {
        /// Tool name
        tool: String,
        /// Reason why arguments are invalid
        reason: String,
    },

    /// Tool did not finish within its timeout.
    #[error("Tool '{tool}' timed out after {timeout_ms}ms")]
    ToolTimeout {
        /// Tool name
        tool: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// Tool target failed outright (transport error, handler error).
    #[error("Tool '{tool}' failed: {reason}")]
    ToolExecutionFailed {
        /// Tool name
        tool: String,
        /// Failure description
        reason: String,
    },

    /// Agent requested more tool rounds than allowed.
    #[error("Tool loop exceeded {limit} rounds")]
    ToolLoopExceeded {
        /// Configured round limit
        limit: u32,
    },

    /// Generation yielded no goals after filtering.
    #[error("No goals produced ({dropped} dropped by condition filter)")]
    NoGoalsProduced {
        /// Goals discarded for an unknown condition tag
        dropped: usize,
    },

    /// Judge returned a different number of judgments than goals.
    #[error("Expected {expected} judgments, got {actual}")]
    JudgmentCountMismatch {
        /// Goal count
        expected: usize,
        /// Judgment count
        actual: usize,
    },

    /// Judgments do not map 1:1 onto the run's goal ids.
    #[error("Judgments do not match goals: {reason}")]
    JudgmentGoalMismatch {
        /// Offending ids
        reason: String,
    },

    /// A single stage attempt ran past its deadline.
    #[error("Stage {stage} attempt timed out after {timeout_ms}ms")]
    StageTimeout {
        /// Stage that timed out
        stage: Stage,
        /// Deadline that elapsed
        timeout_ms: u64,
    },

    /// Retry budget exhausted.
    #[error("Stage {stage} failed: {last_error}")]
    StageFailed {
        /// Stage that failed
        stage: Stage,
        /// Error from the final attempt
        last_error: Box<PipelineError>,
    },

    /// Tool credentials could not be resolved.
    #[error("Credential unavailable: {reason}")]
    CredentialUnavailable {
        /// What could not be resolved
        reason: String,
    },

    /// Run cancelled by the caller.
    #[error("Run cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Configuration error: {reason}")]
    Config {
        /// What is wrong
        reason: String,
    },
}

impl PipelineError {
    /// Classifies the error for the orchestrator's retry policy.
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        match self {
            Self::ModelUnavailable { .. }
            | Self::MalformedResponse { .. }
            | Self::ToolTimeout { .. }
            | Self::ToolExecutionFailed { .. }
            | Self::StageTimeout { .. } => Disposition::Retryable,
            Self::ToolNotPermitted { .. }
            | Self::ToolInputInvalid { .. }
            | Self::CredentialUnavailable { .. }
            | Self::Cancelled
            | Self::Config { .. } => Disposition::FailFast,
            Self::ToolLoopExceeded { .. }
            | Self::NoGoalsProduced { .. }
            | Self::JudgmentCountMismatch { .. }
            | Self::JudgmentGoalMismatch { .. }
            | Self::StageFailed { .. } => Disposition::Fatal,
        }
    }

    /// Short machine-readable code, also used as a tool `error_code`.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::ToolNotPermitted { .. } => "tool_not_permitted",
            Self::ToolInputInvalid { .. } => "tool_input_invalid",
            Self::ToolTimeout { .. } => "tool_timeout",
            Self::ToolExecutionFailed { .. } => "tool_execution_failed",
            Self::ToolLoopExceeded { .. } => "tool_loop_exceeded",
            Self::NoGoalsProduced { .. } => "no_goals_produced",
            Self::JudgmentCountMismatch { .. } => "judgment_count_mismatch",
            Self::JudgmentGoalMismatch { .. } => "judgment_goal_mismatch",
            Self::StageTimeout { .. } => "stage_timeout",
            Self::StageFailed { .. } => "stage_failed",
            Self::CredentialUnavailable { .. } => "credential_unavailable",
            Self::Cancelled => "cancelled",
            Self::Config { .. } => "config",
        }
    }
}
