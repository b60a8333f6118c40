//! Tools command implementation.
//!
//! Lists every tool the gateway would register and which callers may use it.

use anyhow::Context;
use colored::Colorize;
use goalsmith_orchestrator::tools::{IntakeCaller, ToolCaller};
use goalsmith_orchestrator::{GoalsmithConfig, NoteStore, ToolRegistry};
use serde_json::json;

/// Callers permitted to use `tool`, in pipeline order.
fn callers_of(config: &GoalsmithConfig, tool: &str) -> Vec<&'static str> {
    let mut callers = Vec::new();
    if IntakeCaller::new(&config.pipeline.intake_tools).permits(tool) {
        callers.push("orchestrator");
    }
    if config.agents.generator.permits(tool) {
        callers.push("generator");
    }
    if config.agents.judge.permits(tool) {
        callers.push("judge");
    }
    callers
}

/// Execute the tools command.
pub fn execute(config: &GoalsmithConfig, json: bool) -> anyhow::Result<bool> {
    let registry = ToolRegistry::from_config(config, NoteStore::new()).context("Failed to build the tool registry")?;
    let descriptors = registry.descriptors();

    if json {
        let listing: Vec<_> = descriptors
            .iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "description": d.description,
                    "kind": if d.is_local() { "local" } else { "remote" },
                    "permitted": callers_of(config, &d.name),
                    "input_schema": d.spec().input_schema,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(true);
    }

    println!("{}", "Registered tools".bold().cyan());
    println!();
    for descriptor in descriptors {
        let kind = if descriptor.is_local() { "local".green() } else { "remote".yellow() };
        let callers = callers_of(config, &descriptor.name);
        let callers = if callers.is_empty() { "nobody".dimmed().to_string() } else { callers.join(", ") };
        println!("  {} [{}]", descriptor.name.bold(), kind);
        println!("    {}", descriptor.description);
        println!("    permitted: {callers}");
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_permissions() {
        let config = GoalsmithConfig::default();
        assert_eq!(callers_of(&config, "fetch_note"), vec!["orchestrator", "generator", "judge"]);
        assert!(callers_of(&config, "no_such_tool").is_empty());
    }
}
