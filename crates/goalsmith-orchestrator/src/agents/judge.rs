// Evaluation agent (judge)
//
// Scores every goal on the five S.M.A.R.T. criteria. Count and id checks
// against the goal list are left to the orchestrator's reconciliation.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::prompts;
use crate::config::ScoringConfig;
use crate::domain::{ClinicalNote, Criterion, Judgment, SmartGoal};
use crate::error::Result;
use crate::runtime::{AgentRuntime, InvocationStats};

fn number(value: &Value, what: &str) -> std::result::Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{what} is not a finite number")),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| format!("{what} is not a number: {s:?}")),
        other => Err(format!("{what} is not a number: {other}")),
    }
}

fn parse_scores(
    raw: &Map<String, Value>,
    goal_id: &str,
    scoring: &ScoringConfig,
) -> std::result::Result<BTreeMap<Criterion, f64>, String> {
    let mut scores = BTreeMap::new();
    for (name, value) in raw {
        let criterion =
            Criterion::parse(name).ok_or_else(|| format!("{goal_id}: unknown criterion '{name}'"))?;
        let score = number(value, &format!("{goal_id}.{criterion}"))?;
        if !scoring.in_range(score) {
            return Err(format!(
                "{goal_id}.{criterion} = {score} is outside [{}, {}]",
                scoring.scale_min, scoring.scale_max
            ));
        }
        if scores.insert(criterion, score).is_some() {
            return Err(format!("{goal_id}: criterion '{criterion}' scored twice"));
        }
    }
    if let Some(missing) = Criterion::ALL.iter().find(|c| !scores.contains_key(*c)) {
        return Err(format!("{goal_id}: missing criterion '{missing}'"));
    }
    Ok(scores)
}

/// Parses judge output against `scoring`.
///
/// Every judgment must score exactly the five criteria within the scale. A
/// missing `overall_score` becomes the weighted mean.
pub fn parse_judgments(value: &Value, scoring: &ScoringConfig) -> std::result::Result<Vec<Judgment>, String> {
    let entries = value
        .get("judgments")
        .or_else(|| value.get("scores"))
        .and_then(Value::as_array)
        .ok_or_else(|| "expected a \"judgments\" array".to_string())?;

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let entry = entry.as_object().ok_or_else(|| format!("judgment {} is not an object", i + 1))?;
            let goal_id = entry
                .get("goal_id")
                .or_else(|| entry.get("case_id"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| format!("judgment {} has no goal_id", i + 1))?
                .to_string();
            let raw_scores = entry
                .get("scores")
                .or_else(|| entry.get("metric_scores"))
                .and_then(Value::as_object)
                .ok_or_else(|| format!("{goal_id}: missing scores object"))?;
            let scores = parse_scores(raw_scores, &goal_id, scoring)?;

            let overall_score = match entry.get("overall_score") {
                None | Some(Value::Null) => scoring.weighted_mean(&scores),
                Some(v) => {
                    let overall = number(v, &format!("{goal_id}.overall_score"))?;
                    if !scoring.in_range(overall) {
                        return Err(format!("{goal_id}.overall_score = {overall} is outside the scale"));
                    }
                    overall
                }
            };
            let rationale = entry
                .get("rationale")
                .or_else(|| entry.get("notes"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            Ok(Judgment { goal_id, scores, overall_score, rationale })
        })
        .collect()
}

/// The judge agent.
#[derive(Debug)]
pub struct GoalJudge {
    runtime: AgentRuntime,
    scoring: ScoringConfig,
}

impl GoalJudge {
    /// Wraps a runtime configured for the judge role.
    pub const fn new(runtime: AgentRuntime, scoring: ScoringConfig) -> Self {
        Self { runtime, scoring }
    }

    /// The underlying runtime.
    pub const fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    /// Scores `goals` against `note`.
    ///
    /// # Errors
    /// Any runtime error; malformed scores surface as `MalformedResponse`.
    pub async fn evaluate(
        &self,
        note: &ClinicalNote,
        goals: &[SmartGoal],
        correlation_id: &str,
        cancel: &CancellationToken,
        stats: &mut InvocationStats,
    ) -> Result<Vec<Judgment>> {
        let instructions = self
            .runtime
            .config()
            .instructions
            .clone()
            .unwrap_or_else(|| prompts::judge_instructions(&self.scoring));
        let scoring = &self.scoring;
        let judgments = self
            .runtime
            .run(&instructions, prompts::judge_input(note, goals), correlation_id, cancel, stats, |value| {
                parse_judgments(value, scoring)
            })
            .await?;
        debug!(correlation_id = %correlation_id, judgment_count = judgments.len(), "Goals evaluated");
        Ok(judgments)
    }
}
