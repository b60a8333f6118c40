//! Integration tests for the `goalsmith run` and `goalsmith batch` commands.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(relative)
}

/// Writes a config whose agents replay the given mock scripts.
fn write_config(temp_dir: &TempDir, generator_script: &str) -> PathBuf {
    let config = format!(
        r"[pipeline]
max_attempts = 2
initial_backoff_ms = 1
max_backoff_ms = 5
max_concurrent_runs = 2

[tools]
notes_dir = '{notes}'

[agents.generator]
model_type = 'mock'
model_id = 'mock-generator'
script_path = '{generator}'

[agents.judge]
model_type = 'mock'
model_id = 'mock-judge'
script_path = '{judge}'
",
        notes = fixture("notes").display(),
        generator = fixture(generator_script).display(),
        judge = fixture("scripts/judge.json").display(),
    );
    let path = temp_dir.path().join("goalsmith.toml");
    fs::write(&path, config).unwrap();
    path
}

fn goalsmith(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("goalsmith").unwrap();
    cmd.current_dir(temp_dir.path()).env_remove("GOALSMITH_CONFIG").env_remove("RUST_LOG").env("NO_COLOR", "1");
    cmd
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_run_note_file_completes() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir, "scripts/generator.json");

    let output = goalsmith(&temp_dir)
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg(fixture("notes/diabetes.json"))
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let outcome = stdout_json(&output);
    assert_eq!(outcome["status"], "completed");
    assert_eq!(outcome["note"]["note_id"], "note-dm-1");
    assert_eq!(outcome["goals"].as_array().unwrap().len(), 2);
    assert_eq!(outcome["goals"][0]["goal_id"], "goal-1");
    assert_eq!(outcome["judgments"][0]["goal_id"], "goal-1");
    assert_eq!(outcome["judgments"][0]["overall_score"], 4.0);
    assert_eq!(outcome["judgments"][1]["overall_score"], 3.0);
    assert_eq!(outcome["telemetry"]["intake"]["tool_calls"], 0);
}

#[test]
fn test_run_reference_resolves_through_notes_dir() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir, "scripts/generator.json");

    // Not a file relative to the working directory, so it is fetched.
    let output = goalsmith(&temp_dir).arg("-c").arg(&config).args(["run", "diabetes.json"]).output().unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let outcome = stdout_json(&output);
    assert_eq!(outcome["status"], "completed");
    assert_eq!(outcome["note"]["note_id"], "note-dm-1");
    assert_eq!(outcome["telemetry"]["intake"]["tool_calls"], 1);
}

#[test]
fn test_run_writes_output_file() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir, "scripts/generator.json");
    let output_path = temp_dir.path().join("out/run.json");
    fs::create_dir_all(output_path.parent().unwrap()).unwrap();

    goalsmith(&temp_dir)
        .arg("-c")
        .arg(&config)
        .arg("run")
        .arg(fixture("notes/diabetes.json"))
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let written: Value = serde_json::from_str(&fs::read_to_string(&output_path).unwrap()).unwrap();
    assert_eq!(written["status"], "completed");
    assert_eq!(written["judgments"].as_array().unwrap().len(), 2);
}

#[test]
fn test_run_off_topic_goals_fails_with_exit_code() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir, "scripts/generator_off_topic.json");

    let output = goalsmith(&temp_dir)
        .arg("-c")
        .arg(&config)
        .arg("run")
        .arg(fixture("notes/diabetes.json"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let outcome = stdout_json(&output);
    assert_eq!(outcome["status"], "failed");
    assert_eq!(outcome["stage"], "generation");
    assert_eq!(outcome["note_id"], "note-dm-1");
    assert_eq!(outcome["error"]["kind"], "no_goals_produced");
    assert_eq!(outcome["error"]["dropped"], 2);
    assert!(outcome.get("goals").is_none());
}

#[test]
fn test_run_unknown_reference_fails_at_intake() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir, "scripts/generator.json");

    let output = goalsmith(&temp_dir).arg("-c").arg(&config).args(["run", "no-such-note"]).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let outcome = stdout_json(&output);
    assert_eq!(outcome["status"], "failed");
    assert_eq!(outcome["stage"], "intake");
    assert_eq!(outcome["error"]["kind"], "config");
}

#[test]
fn test_batch_keeps_file_order_and_reports_failures() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir, "scripts/generator.json");

    let output = goalsmith(&temp_dir).arg("-c").arg(&config).arg("batch").arg(fixture("batch")).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("2 completed, 1 failed"));

    let outcomes = stdout_json(&output);
    let outcomes = outcomes.as_array().unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0]["status"], "completed");
    assert_eq!(outcomes[0]["note"]["note_id"], "batch-a");
    assert_eq!(outcomes[1]["status"], "failed");
    assert_eq!(outcomes[1]["note_id"], "batch-b");
    assert_eq!(outcomes[1]["error"]["kind"], "no_goals_produced");
    assert_eq!(outcomes[2]["status"], "completed");
    assert_eq!(outcomes[2]["note"]["note_id"], "batch-c");
    assert_ne!(outcomes[0]["run_id"], outcomes[2]["run_id"]);
}

#[test]
fn test_batch_empty_directory_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir, "scripts/generator.json");
    let empty = temp_dir.path().join("empty");
    fs::create_dir(&empty).unwrap();

    goalsmith(&temp_dir)
        .arg("-c")
        .arg(&config)
        .arg("batch")
        .arg(&empty)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No .json or .txt notes found"));
}
