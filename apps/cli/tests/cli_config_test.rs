//! Integration tests for the `goalsmith tools` and `goalsmith check-config` commands.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(temp_dir: &TempDir, content: &str) -> PathBuf {
    let path = temp_dir.path().join("goalsmith.toml");
    fs::write(&path, content).unwrap();
    path
}

fn goalsmith(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("goalsmith").unwrap();
    cmd.current_dir(temp_dir.path()).env_remove("GOALSMITH_CONFIG").env_remove("RUST_LOG").env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_tools_json_lists_builtins_with_permissions() {
    let temp_dir = TempDir::new().unwrap();

    let output = goalsmith(&temp_dir).args(["tools", "--json"]).output().unwrap();
    assert!(output.status.success());

    let tools: Value = serde_json::from_slice(&output.stdout).unwrap();
    let tools = tools.as_array().unwrap();
    let names: Vec<_> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["build_eval_plan", "fetch_note", "terminology_lookup"]);

    let eval_plan = &tools[0];
    assert_eq!(eval_plan["kind"], "local");
    assert_eq!(eval_plan["permitted"], serde_json::json!(["judge"]));
    assert_eq!(tools[1]["permitted"], serde_json::json!(["orchestrator", "generator", "judge"]));
}

#[test]
fn test_tools_lists_remote_tool_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(
        &temp_dir,
        r"[[tools.remote]]
name = 'export_goals'
description = 'Pushes goals to the care plan'
endpoint = 'http://127.0.0.1:9/export'

[agents.generator]
permitted_tools = ['fetch_note', 'export_goals']
",
    );

    goalsmith(&temp_dir)
        .arg("-c")
        .arg(&config)
        .arg("tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("export_goals [remote]"))
        .stdout(predicate::str::contains("Pushes goals to the care plan"))
        .stdout(predicate::str::contains("permitted: generator"));
}

#[test]
fn test_check_config_shows_resolved_agents() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(
        &temp_dir,
        r"[pipeline]
max_attempts = 5

[agents.judge]
model_id = 'meta.llama3-70b-instruct-v1:0'
",
    );

    goalsmith(&temp_dir)
        .arg("-c")
        .arg(&config)
        .arg("check-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"))
        .stdout(predicate::str::contains("tool calling:  native"))
        .stdout(predicate::str::contains("tool calling:  prompted"))
        .stdout(predicate::str::contains("attempts per stage:  5"));
}

#[test]
fn test_check_config_rejects_invalid_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir, "[pipeline]\nmax_attempts = 0\n");

    goalsmith(&temp_dir)
        .arg("-c")
        .arg(&config)
        .arg("check-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_attempts must be at least 1"));
}

#[test]
fn test_missing_config_file_is_reported() {
    let temp_dir = TempDir::new().unwrap();

    goalsmith(&temp_dir)
        .args(["-c", "does-not-exist.toml", "check-config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration from does-not-exist.toml"));
}
