//! Instruction templates and opening turns for the two agents.

use serde_json::json;

use crate::config::ScoringConfig;
use crate::domain::{ClinicalNote, Criterion, SmartGoal};
use crate::tools::builtin::format_rows;

/// Default generator instructions.
pub fn generator_instructions() -> String {
    String::from(
        "You are a behavioral-health coach writing S.M.A.R.T. goals from a clinician note.\n\
\n\
INSTRUCTIONS:\n\
1) The note is in the user message. If you need it again, or need it split into rows, call fetch_note with its note id.\n\
2) You may call terminology_lookup to confirm which condition a term refers to.\n\
3) Produce as many goals as the note supports, across domains (diet, activity, medication, monitoring, sleep, mood). \
If the note only supports one or two goals, output only those.\n\
4) Every goal must address one of the note's condition tags and set condition_tag to that tag exactly.\n\
5) Output ONLY the JSON object below, with no other text.\n\
\n\
OUTPUT CONTRACT:\n\
{\n\
  \"smart_goals\": [\n\
    {\n\
      \"goal_number\": 1,\n\
      \"specific\": \"what exactly will change\",\n\
      \"measurable\": \"how progress is counted\",\n\
      \"actionable\": \"steps the client takes\",\n\
      \"relevant\": \"why it matters for the condition\",\n\
      \"time_bound\": \"deadline or review date\",\n\
      \"condition_tag\": \"one of the note's condition tags\",\n\
      \"description\": \"the whole goal in one sentence\"\n\
    }\n\
  ]\n\
}",
    )
}

/// Opening user turn for the generator.
pub fn generator_input(note: &ClinicalNote) -> String {
    let tags = if note.condition_tags.is_empty() { "none".to_string() } else { note.condition_tags.join(", ") };
    format!(
        "Note id: {}\nCondition tags: {}\nRecorded at: {}\n\nNote:\n{}",
        note.note_id,
        tags,
        note.recorded_at.to_rfc3339(),
        format_rows(&note.text)
    )
}

/// Default judge instructions for `scoring`'s scale.
pub fn judge_instructions(scoring: &ScoringConfig) -> String {
    let criteria: Vec<&str> = Criterion::ALL.iter().map(|c| c.as_str()).collect();
    let mut text = format!(
        "You are an Evaluator (LLM-as-Judge) scoring S.M.A.R.T. goals written for a clinician note.\n\
\n\
CALLS:\n\
1) Call build_eval_plan EXACTLY ONCE with the number of goals to get the rubric.\n\
\n\
SCORING:\n\
- Score EVERY goal. Do not stop early or skip any goal.\n\
- Score each goal on exactly these criteria: {}.\n\
- Scores are numbers from {} to {}.\n\
- Judge the goal text against the rubric and the note. If a goal is unsafe, say so briefly in the rationale.\n\
\n\
OUTPUT: STRICT JSON ONLY, one entry per goal in the order given:\n",
        criteria.join(", "),
        scoring.scale_min,
        scoring.scale_max
    );
    let example = json!({
        "judgments": [{
            "goal_id": "goal-1",
            "scores": criteria.iter().map(|c| (c.to_string(), json!(0))).collect::<serde_json::Map<_, _>>(),
            "overall_score": 0,
            "rationale": "short justification (<= 40 words)"
        }]
    });
    text.push_str(&serde_json::to_string_pretty(&example).unwrap_or_default());
    text
}

/// Opening user turn for the judge.
pub fn judge_input(note: &ClinicalNote, goals: &[SmartGoal]) -> String {
    let goals_json = serde_json::to_string_pretty(goals).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Note id: {}\nCondition tags: {}\n\nNote:\n{}\n\nGoals to score ({}):\n{}",
        note.note_id,
        note.condition_tags.join(", "),
        format_rows(&note.text),
        goals.len(),
        goals_json
    )
}
