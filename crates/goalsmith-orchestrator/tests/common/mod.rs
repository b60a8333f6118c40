//! Shared helpers for the orchestrator integration tests.

#![allow(dead_code)]

use goalsmith_abstraction::{Model, ModelError, ModelResponse, ToolCall};
use goalsmith_models::MockModel;
use goalsmith_orchestrator::config::PipelineConfig;
use goalsmith_orchestrator::{
    AgentConfig, AgentRole, ClinicalNote, GoalsmithConfig, ModelProvider, NoteStore, Orchestrator, Result,
    StaticCredentialProvider, ToolGateway, ToolRegistry,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Scripted reply list for a [`MockModel`].
pub type Script = Vec<std::result::Result<ModelResponse, ModelError>>;

/// Hands the same model to every run of a role.
pub struct RoleModels {
    pub generator: Arc<MockModel>,
    pub judge: Arc<MockModel>,
}

impl ModelProvider for RoleModels {
    fn model_for(&self, config: &AgentConfig) -> Result<Arc<dyn Model>> {
        let model: Arc<dyn Model> = match config.role {
            AgentRole::Generator => self.generator.clone(),
            AgentRole::Judge => self.judge.clone(),
        };
        Ok(model)
    }
}

/// A mock model with native tool calling switched on or off.
pub fn mock(id: &str, native_tools: bool, script: Script) -> Arc<MockModel> {
    Arc::new(MockModel::new(id.to_string()).with_native_tools(native_tools).with_script(script))
}

/// Config with millisecond backoff so retries do not slow the suite down.
pub fn fast_config() -> GoalsmithConfig {
    GoalsmithConfig {
        pipeline: PipelineConfig {
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            max_concurrent_runs: 2,
            ..PipelineConfig::default()
        },
        ..GoalsmithConfig::default()
    }
}

pub fn diabetes_note() -> ClinicalNote {
    ClinicalNote::new(
        "note-dm-1",
        "Client reports A1c 8.4 @ Skips breakfast most days @ Walks the dog twice a week @ Forgets evening metformin",
    )
    .with_tags(["diabetes"])
}

/// Registry holding the built-ins plus `diabetes_note` in memory.
pub fn default_registry(config: &GoalsmithConfig) -> ToolRegistry {
    ToolRegistry::from_config(config, NoteStore::new().with_note(diabetes_note())).unwrap()
}

pub fn gateway(registry: ToolRegistry, call_timeout: Duration) -> ToolGateway {
    ToolGateway::new(Arc::new(registry), Arc::new(StaticCredentialProvider::new()), call_timeout)
}

pub fn orchestrator(config: GoalsmithConfig, generator: Arc<MockModel>, judge: Arc<MockModel>) -> Orchestrator {
    let registry = default_registry(&config);
    orchestrator_with_gateway(config, gateway(registry, Duration::from_secs(2)), generator, judge)
}

pub fn orchestrator_with_gateway(
    config: GoalsmithConfig,
    gateway: ToolGateway,
    generator: Arc<MockModel>,
    judge: Arc<MockModel>,
) -> Orchestrator {
    Orchestrator::new(Arc::new(config), gateway, Arc::new(RoleModels { generator, judge }))
}

/// A native tool request.
pub fn tool_request(name: &str, arguments: Value) -> ModelResponse {
    ModelResponse {
        tool_calls: vec![ToolCall { id: String::new(), name: name.to_string(), arguments }],
        ..ModelResponse::text("")
    }
}

/// The same request written as an emulated tool-request block.
pub fn prompted_tool_request(name: &str, arguments: Value) -> ModelResponse {
    ModelResponse::text(format!(
        "Let me check that first.\n<tool_request>{}</tool_request>",
        json!({ "tool": name, "arguments": arguments })
    ))
}

const DIABETES_GOALS: [(&str, &str, &str); 3] = [
    ("Eat a breakfast with protein", "on 6 of 7 days", "within 4 weeks"),
    ("Walk 20 minutes after dinner", "5 days a week", "for the next 6 weeks"),
    ("Take evening metformin with a phone reminder", "every evening", "starting this week, reviewed in 2 weeks"),
];

/// Generator output with `count` goals (at most three) tagged `tag`.
pub fn goals_reply(count: usize, tag: &str) -> ModelResponse {
    let goals: Vec<Value> = DIABETES_GOALS
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, (specific, measurable, time_bound))| {
            json!({
                "goal_number": i + 1,
                "specific": specific,
                "measurable": measurable,
                "actionable": "Client picks the steps at the next session",
                "relevant": "Supports glucose control",
                "time_bound": time_bound,
                "condition_tag": tag,
                "description": format!("{specific} {measurable} {time_bound}.")
            })
        })
        .collect();
    ModelResponse::text(json!({ "smart_goals": goals }).to_string())
}

/// Judge output scoring each id in `goal_ids` with `score` on every criterion.
pub fn judgments_reply(goal_ids: &[&str], score: f64) -> ModelResponse {
    let judgments: Vec<Value> = goal_ids
        .iter()
        .map(|id| {
            json!({
                "goal_id": id,
                "scores": {
                    "specific": score,
                    "measurable": score,
                    "actionable": score,
                    "relevant": score,
                    "time_bound": score
                },
                "rationale": format!("{id} is concrete and dated")
            })
        })
        .collect();
    ModelResponse::text(format!("```json\n{}\n```", json!({ "judgments": judgments })))
}
