//! Run command implementation.
//!
//! Runs one note through generation and evaluation.

use anyhow::Context;
use goalsmith_orchestrator::{GoalsmithConfig, Orchestrator};
use tracing::info;

use super::{RunOptions, cancel_on_ctrl_c, emit, note_request};

/// Execute the run command. Returns whether the run completed.
pub async fn execute(config: GoalsmithConfig, note: &str, options: &RunOptions) -> anyhow::Result<bool> {
    let request = note_request(note).await?.with_overrides(options.overrides());
    let orchestrator = Orchestrator::from_config(config).context("Failed to set up the pipeline")?;

    let outcome = orchestrator.run(request, cancel_on_ctrl_c()).await;
    info!(run_id = %outcome.run_id(), completed = outcome.is_completed(), "Run finished");

    emit(&serde_json::to_value(&outcome)?, options.output.as_deref())?;
    Ok(outcome.is_completed())
}
