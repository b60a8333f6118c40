//! Command implementations for the Goalsmith CLI.

pub mod batch;
pub mod check_config;
pub mod run;
pub mod tools;

use anyhow::Context;
use clap::Args;
use goalsmith_orchestrator::tools::builtin::read_note_file;
use goalsmith_orchestrator::{GoalsmithConfig, RunOverrides, RunRequest};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Options shared by `run` and `batch`.
#[derive(Args, Debug, Clone, Default)]
pub struct RunOptions {
    /// Model id to use for both agents instead of the configured ones
    #[arg(long)]
    pub model: Option<String>,

    /// Tool round limit per agent invocation
    #[arg(long)]
    pub max_tool_rounds: Option<u32>,

    /// Also write the JSON output to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunOptions {
    pub fn overrides(&self) -> RunOverrides {
        RunOverrides { model_id: self.model.clone(), max_tool_rounds: self.max_tool_rounds }
    }
}

/// Loads and validates the configuration.
///
/// An explicit path wins over `GOALSMITH_CONFIG`; with neither, defaults apply.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<GoalsmithConfig> {
    let config = match path {
        Some(path) => GoalsmithConfig::load_from_toml(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => GoalsmithConfig::from_env_or_default().context("Failed to load configuration")?,
    };
    config.validate().context("Invalid configuration")?;
    debug!(
        generator_model = %config.agents.generator.model_id,
        judge_model = %config.agents.judge.model_id,
        "Configuration loaded"
    );
    Ok(config)
}

/// Reads a note file, or treats `note` as a reference for `fetch_note`.
pub async fn note_request(note: &str) -> anyhow::Result<RunRequest> {
    let path = Path::new(note);
    if path.is_file() {
        let note = read_note_file(path).await.map_err(anyhow::Error::msg)?;
        Ok(RunRequest::inline(note))
    } else {
        Ok(RunRequest::reference(note))
    }
}

/// Prints `value` to stdout and, if asked, writes it to `output`.
pub fn emit(value: &Value, output: Option<&Path>) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    if let Some(path) = output {
        std::fs::write(path, format!("{rendered}\n"))
            .with_context(|| format!("Failed to write output to {}", path.display()))?;
    }
    Ok(())
}

/// A token cancelled on Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling runs");
            trigger.cancel();
        }
    });
    token
}
