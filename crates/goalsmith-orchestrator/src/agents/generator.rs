// Goal-generation agent
//
// Turns a clinician note into an ordered, non-empty list of S.M.A.R.T. goals.
// Goals aimed at a condition the note does not carry are dropped and counted.

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::prompts;
use crate::domain::{ClinicalNote, SmartGoal};
use crate::error::{PipelineError, Result};
use crate::runtime::{AgentRuntime, InvocationStats};

/// Goals that survived filtering, plus how many did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationOutput {
    /// Goals in output order, ids `goal-1`..`goal-n`.
    pub goals: Vec<SmartGoal>,
    /// Goals dropped for an unmatched condition tag.
    pub dropped_goals: usize,
}

/// A goal as the model wrote it, before filtering and id assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateGoal {
    pub specific: Option<String>,
    pub measurable: Option<String>,
    pub actionable: Option<String>,
    pub relevant: Option<String>,
    pub time_bound: Option<String>,
    pub condition_tag: Option<String>,
    pub description: Option<String>,
}

impl CandidateGoal {
    fn has_smart_fields(&self) -> bool {
        [&self.specific, &self.measurable, &self.actionable, &self.relevant, &self.time_bound]
            .iter()
            .any(|f| f.is_some())
    }

    fn into_goal(self, goal_id: String) -> SmartGoal {
        let description = self.description.clone().unwrap_or_else(|| {
            [&self.specific, &self.measurable, &self.actionable, &self.time_bound]
                .into_iter()
                .flatten()
                .cloned()
                .collect::<Vec<_>>()
                .join(" ")
        });
        SmartGoal {
            goal_id,
            specific: self.specific,
            measurable: self.measurable,
            actionable: self.actionable,
            relevant: self.relevant,
            time_bound: self.time_bound,
            condition_tag: self.condition_tag,
            description,
        }
    }
}

fn text_field(goal: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match goal.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Parses generator output.
///
/// Accepts `{"smart_goals": [...]}` (or `"goals"`) where each goal carries the
/// S.M.A.R.T. fields, a `description`, or both.
pub fn parse_goals(value: &Value) -> std::result::Result<Vec<CandidateGoal>, String> {
    let goals = value
        .get("smart_goals")
        .or_else(|| value.get("goals"))
        .and_then(Value::as_array)
        .ok_or_else(|| "expected a \"smart_goals\" array".to_string())?;

    goals
        .iter()
        .enumerate()
        .map(|(i, goal)| {
            let goal = goal.as_object().ok_or_else(|| format!("goal {} is not an object", i + 1))?;
            let candidate = CandidateGoal {
                specific: text_field(goal, &["specific"]),
                measurable: text_field(goal, &["measurable"]),
                actionable: text_field(goal, &["actionable", "achievable"]),
                relevant: text_field(goal, &["relevant"]),
                time_bound: text_field(goal, &["time_bound", "timeBound", "time-bound"]),
                condition_tag: text_field(goal, &["condition_tag", "conditionTag"]),
                description: text_field(goal, &["description", "goal_text"]),
            };
            if candidate.description.is_none() && !candidate.has_smart_fields() {
                return Err(format!("goal {} has neither S.M.A.R.T. fields nor a description", i + 1));
            }
            Ok(candidate)
        })
        .collect()
}

/// Keeps goals whose condition tag the note carries and assigns ids.
///
/// Notes without tags keep only untagged goals. On a note with exactly one tag, an
/// untagged goal takes that tag.
pub fn filter_goals(note: &ClinicalNote, candidates: Vec<CandidateGoal>) -> GenerationOutput {
    let total = candidates.len();
    let kept: Vec<CandidateGoal> = candidates
        .into_iter()
        .filter_map(|mut candidate| {
            if note.condition_tags.is_empty() {
                return candidate.condition_tag.is_none().then_some(candidate);
            }
            match candidate.condition_tag.clone() {
                Some(tag) if note.has_tag(&tag) => Some(candidate),
                Some(_) => None,
                None if note.condition_tags.len() == 1 => {
                    candidate.condition_tag = note.condition_tags.first().cloned();
                    Some(candidate)
                }
                None => None,
            }
        })
        .collect();

    let dropped_goals = total - kept.len();
    let goals = kept.into_iter().enumerate().map(|(i, c)| c.into_goal(format!("goal-{}", i + 1))).collect();
    GenerationOutput { goals, dropped_goals }
}

/// The generator agent.
#[derive(Debug)]
pub struct GoalGenerator {
    runtime: AgentRuntime,
}

impl GoalGenerator {
    /// Wraps a runtime configured for the generator role.
    pub const fn new(runtime: AgentRuntime) -> Self {
        Self { runtime }
    }

    /// The underlying runtime.
    pub const fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    /// Generates goals for `note`.
    ///
    /// # Errors
    /// `NoGoalsProduced` when nothing survives filtering, plus any runtime error.
    pub async fn generate(
        &self,
        note: &ClinicalNote,
        correlation_id: &str,
        cancel: &CancellationToken,
        stats: &mut InvocationStats,
    ) -> Result<GenerationOutput> {
        let instructions =
            self.runtime.config().instructions.clone().unwrap_or_else(prompts::generator_instructions);
        let candidates = self
            .runtime
            .run(&instructions, prompts::generator_input(note), correlation_id, cancel, stats, parse_goals)
            .await?;

        let output = filter_goals(note, candidates);
        if output.dropped_goals > 0 {
            warn!(
                correlation_id = %correlation_id,
                note_id = %note.note_id,
                dropped = output.dropped_goals,
                "Dropped goals with unmatched condition tags"
            );
        }
        if output.goals.is_empty() {
            return Err(PipelineError::NoGoalsProduced { dropped: output.dropped_goals });
        }
        debug!(correlation_id = %correlation_id, goal_count = output.goals.len(), "Goals generated");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rich_and_original_shapes() {
        let value = json!({"smart_goals": [
            {"goal_number": 1, "specific": "Walk 20 minutes", "time_bound": "for 4 weeks", "condition_tag": "obesity"},
            {"goal_number": 2, "description": "Check blood glucose every morning for 2 weeks."}
        ]});
        let goals = parse_goals(&value).unwrap();
        assert_eq!(goals.len(), 2);
        assert_eq!(goals[0].condition_tag.as_deref(), Some("obesity"));
        assert_eq!(goals[1].description.as_deref(), Some("Check blood glucose every morning for 2 weeks."));
    }

    #[test]
    fn test_parse_rejects_empty_goal_and_missing_array() {
        assert!(parse_goals(&json!({"smart_goals": [{"goal_number": 1}]})).is_err());
        assert!(parse_goals(&json!({"answer": []})).is_err());
        assert!(parse_goals(&json!({"smart_goals": []})).unwrap().is_empty());
    }

    #[test]
    fn test_filter_drops_unmatched_and_numbers_ids() {
        let note = ClinicalNote::new("n", "t").with_tags(["Diabetes", "hypertension"]);
        let candidates = vec![
            CandidateGoal { condition_tag: Some("diabetes".into()), specific: Some("a".into()), ..Default::default() },
            CandidateGoal { condition_tag: Some("asthma".into()), specific: Some("b".into()), ..Default::default() },
            CandidateGoal { condition_tag: None, description: Some("c".into()), ..Default::default() },
            CandidateGoal { condition_tag: Some("HYPERTENSION".into()), specific: Some("d".into()), ..Default::default() },
        ];
        let output = filter_goals(&note, candidates);
        assert_eq!(output.dropped_goals, 2);
        let ids: Vec<_> = output.goals.iter().map(|g| g.goal_id.as_str()).collect();
        assert_eq!(ids, vec!["goal-1", "goal-2"]);
        assert_eq!(output.goals[1].specific.as_deref(), Some("d"));
        assert_eq!(output.goals[0].description, "a");
    }

    #[test]
    fn test_single_tag_note_adopts_untagged_goals() {
        let note = ClinicalNote::new("n", "t").with_tags(["diabetes"]);
        let candidates = vec![CandidateGoal { description: Some("Walk daily".into()), ..Default::default() }];
        let output = filter_goals(&note, candidates);
        assert_eq!(output.dropped_goals, 0);
        assert_eq!(output.goals[0].condition_tag.as_deref(), Some("diabetes"));
    }

    #[test]
    fn test_untagged_note_drops_tagged_goals() {
        let note = ClinicalNote::new("n", "t");
        let candidates = vec![
            CandidateGoal { condition_tag: Some("x".into()), description: Some("tagged".into()), ..Default::default() },
            CandidateGoal { description: Some("untagged".into()), ..Default::default() },
        ];

        let output = filter_goals(&note, candidates);
        assert_eq!(output.dropped_goals, 1);
        assert_eq!(output.goals.len(), 1);
        assert_eq!(output.goals[0].description, "untagged");
        assert_eq!(output.goals[0].condition_tag, None);
    }
}
