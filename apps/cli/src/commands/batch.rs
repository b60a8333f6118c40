//! Batch command implementation.
//!
//! Runs every note file in a directory, concurrently, and prints the outcomes
//! in file-name order.

use anyhow::{Context, bail};
use colored::Colorize;
use goalsmith_orchestrator::tools::builtin::read_note_file;
use goalsmith_orchestrator::{GoalsmithConfig, Orchestrator, RunRequest};
use std::path::{Path, PathBuf};

use super::{RunOptions, cancel_on_ctrl_c, emit};

fn is_note_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("txt"))
}

/// Note files in `dir`, sorted by name.
fn note_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read note directory {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if is_note_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Execute the batch command. Returns whether every run completed.
pub async fn execute(config: GoalsmithConfig, dir: &Path, options: &RunOptions) -> anyhow::Result<bool> {
    let files = note_files(dir)?;
    if files.is_empty() {
        bail!("No .json or .txt notes found in {}", dir.display());
    }

    let mut requests = Vec::with_capacity(files.len());
    for file in &files {
        let note = read_note_file(file).await.map_err(anyhow::Error::msg)?;
        requests.push(RunRequest::inline(note).with_overrides(options.overrides()));
    }

    let orchestrator = Orchestrator::from_config(config).context("Failed to set up the pipeline")?;
    let outcomes = orchestrator.run_batch(requests, cancel_on_ctrl_c()).await;

    let completed = outcomes.iter().filter(|o| o.is_completed()).count();
    let failed = outcomes.len() - completed;
    eprintln!(
        "{} {} completed, {} failed",
        "goalsmith batch:".bold().cyan(),
        completed.to_string().green(),
        if failed > 0 { failed.to_string().red() } else { failed.to_string().normal() }
    );

    emit(&serde_json::to_value(&outcomes)?, options.output.as_deref())?;
    Ok(failed == 0)
}
