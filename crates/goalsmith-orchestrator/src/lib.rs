//! Two-agent goal pipeline for Goalsmith.
//!
//! A generator agent turns a clinician note into S.M.A.R.T. goals; a judge
//! agent scores each goal. Both agents run on the same bounded runtime, reach
//! tools only through the [`ToolGateway`], and talk to their model through a
//! [`ModelAdapter`] that hides whether the model supports system prompts or
//! native tool calling.

pub mod adapter;
pub mod agents;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod pipeline;
pub mod runtime;
pub mod tools;

pub use adapter::{AssistantMessage, Conversation, ModelAdapter};
pub use agents::{GenerationOutput, GoalGenerator, GoalJudge};
pub use config::{AgentConfig, AgentRole, ConfigError, GoalsmithConfig, RunOverrides};
pub use domain::{ClinicalNote, Criterion, Judgment, SmartGoal};
pub use error::{Disposition, PipelineError, Result, Stage};
pub use events::{EventSink, RuntimeEvent};
pub use lifecycle::RuntimeState;
pub use pipeline::{
    FactoryModelProvider, FailedRun, ModelProvider, NoteInput, Orchestrator, RetryPolicy, RunArtifact, RunOutcome,
    RunRequest, RunTelemetry, StageTelemetry,
};
pub use runtime::{AgentRuntime, InvocationStats};
pub use tools::builtin::NoteStore;
pub use tools::{CredentialProvider, EnvCredentialProvider, StaticCredentialProvider, ToolGateway, ToolRegistry};
