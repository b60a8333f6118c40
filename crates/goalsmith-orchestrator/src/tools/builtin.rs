//! Tools every deployment registers: note retrieval, terminology lookup, and
//! the judge's evaluation plan.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{ToolArguments, ToolContext, ToolDescriptor, ToolHandler, ToolOutcome, ToolParameters, terminology};
use crate::config::ScoringConfig;
use crate::domain::{ClinicalNote, Criterion};
use crate::error::{PipelineError, Result};

/// Name of the note retrieval tool.
pub const FETCH_NOTE: &str = "fetch_note";
/// Name of the terminology tool.
pub const TERMINOLOGY_LOOKUP: &str = "terminology_lookup";
/// Name of the evaluation plan tool.
pub const BUILD_EVAL_PLAN: &str = "build_eval_plan";
/// Every built-in tool.
pub const BUILTIN_TOOL_NAMES: [&str; 3] = [FETCH_NOTE, TERMINOLOGY_LOOKUP, BUILD_EVAL_PLAN];

/// Puts each `@`-delimited row of a note on its own line.
pub fn format_rows(raw: &str) -> String {
    raw.split('@').map(str::trim).filter(|row| !row.is_empty()).collect::<Vec<_>>().join("\n")
}

/// Notes `fetch_note` can return: registered in memory, or read from disk.
#[derive(Debug, Clone, Default)]
pub struct NoteStore {
    notes: HashMap<String, ClinicalNote>,
    notes_dir: Option<PathBuf>,
}

impl NoteStore {
    /// An empty store reading paths relative to the working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative references against `dir`.
    #[must_use]
    pub fn with_notes_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.notes_dir = Some(dir.into());
        self
    }

    /// Registers an in-memory note under its id.
    #[must_use]
    pub fn with_note(mut self, note: ClinicalNote) -> Self {
        self.notes.insert(note.note_id.clone(), note);
        self
    }

    /// Finds a note by id, then by path.
    ///
    /// Returns `Ok(None)` when nothing matches.
    pub async fn resolve(&self, data_source: &str) -> std::result::Result<Option<ClinicalNote>, String> {
        if let Some(note) = self.notes.get(data_source) {
            return Ok(Some(note.clone()));
        }

        let reference = Path::new(data_source);
        if reference.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(format!("reference '{data_source}' escapes the notes directory"));
        }
        let path = match &self.notes_dir {
            Some(dir) => {
                if reference.is_absolute() || reference.has_root() {
                    return Err(format!("reference '{data_source}' is outside the notes directory"));
                }
                let joined = dir.join(reference);
                if !tokio::fs::try_exists(&joined).await.unwrap_or(false) {
                    return Ok(None);
                }
                // Symlinks inside the directory may still point out of it.
                let root = tokio::fs::canonicalize(dir)
                    .await
                    .map_err(|e| format!("notes directory {} unavailable: {e}", dir.display()))?;
                let target = tokio::fs::canonicalize(&joined)
                    .await
                    .map_err(|e| format!("failed to resolve {}: {e}", joined.display()))?;
                if !target.starts_with(&root) {
                    return Err(format!("reference '{data_source}' is outside the notes directory"));
                }
                target
            }
            None => {
                if !tokio::fs::try_exists(reference).await.unwrap_or(false) {
                    return Ok(None);
                }
                reference.to_path_buf()
            }
        };
        read_note_file(&path).await.map(Some)
    }
}

/// Reads a note from a `.json` file (a serialized `ClinicalNote`) or any text file.
///
/// Text notes take the file stem as id and get condition tags detected from
/// the terminology table.
pub async fn read_note_file(path: &Path) -> std::result::Result<ClinicalNote, String> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;

    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        let mut note: ClinicalNote = serde_json::from_str(&content)
            .map_err(|e| format!("invalid note file {}: {e}", path.display()))?;
        note.source.get_or_insert_with(|| path.display().to_string());
        return Ok(note);
    }

    let note_id = path.file_stem().map_or_else(|| "note".to_string(), |s| s.to_string_lossy().into_owned());
    let tags = terminology::detect_conditions(&format_rows(&content));
    Ok(ClinicalNote::new(note_id, content.trim().to_string())
        .with_tags(tags)
        .with_source(path.display().to_string()))
}

#[derive(Debug, Deserialize)]
struct NoteMeta {
    note_id: String,
    #[serde(default)]
    condition_tags: Vec<String>,
    recorded_at: DateTime<Utc>,
    #[serde(default)]
    source: Option<String>,
}

/// Rebuilds a note from a `fetch_note` payload.
pub fn note_from_payload(payload: &Value) -> Option<ClinicalNote> {
    let meta: NoteMeta = serde_json::from_value(payload.get("meta")?.clone()).ok()?;
    Some(ClinicalNote {
        note_id: meta.note_id,
        text: payload.get("raw_text")?.as_str()?.to_string(),
        condition_tags: meta.condition_tags,
        recorded_at: meta.recorded_at,
        source: meta.source,
    })
}

struct FetchNoteHandler {
    store: Arc<NoteStore>,
}

#[async_trait]
impl ToolHandler for FetchNoteHandler {
    async fn execute(&self, args: &ToolArguments, context: &ToolContext) -> Result<ToolOutcome> {
        let data_source = args.get_string("data_source").unwrap_or_default();
        debug!(correlation_id = %context.correlation_id, data_source = %data_source, "Fetching note");

        match self.store.resolve(&data_source).await {
            Ok(Some(note)) => Ok(ToolOutcome::ok(json!({
                "raw_text": note.text,
                "formatted_text": format_rows(&note.text),
                "meta": {
                    "note_id": note.note_id,
                    "condition_tags": note.condition_tags,
                    "recorded_at": note.recorded_at,
                    "source": note.source,
                },
            }))),
            Ok(None) => Ok(ToolOutcome::error("note_not_found", format!("no note found for '{data_source}'"))),
            Err(reason) => Ok(ToolOutcome::error("note_unreadable", reason)),
        }
    }
}

struct TerminologyHandler;

#[async_trait]
impl ToolHandler for TerminologyHandler {
    async fn execute(&self, args: &ToolArguments, _context: &ToolContext) -> Result<ToolOutcome> {
        let term = args.get_string("term").unwrap_or_default();
        Ok(match terminology::lookup(&term) {
            Some(entry) => ToolOutcome::ok(json!({
                "term": term,
                "condition_tag": entry.condition_tag,
                "canonical_name": entry.canonical_name,
                "code": entry.code,
                "synonyms": entry.synonyms,
            })),
            None => ToolOutcome::error("term_not_found", format!("'{term}' is not in the terminology table")),
        })
    }
}

struct EvalPlanHandler {
    scoring: ScoringConfig,
}

fn guidance(criterion: Criterion) -> &'static str {
    match criterion {
        Criterion::Specific => "Clearly states the behavior or target (who, what, when, where).",
        Criterion::Measurable => "Includes a quantifiable criterion (count, frequency, value).",
        Criterion::Actionable => "Names steps the client can take with their resources and constraints.",
        Criterion::Relevant => "Aligned to the conditions and needs documented in the note.",
        Criterion::TimeBound => "Contains a concrete timeframe or deadline.",
    }
}

#[async_trait]
impl ToolHandler for EvalPlanHandler {
    async fn execute(&self, args: &ToolArguments, _context: &ToolContext) -> Result<ToolOutcome> {
        let goal_count = args.get_u64("goal_count").unwrap_or(0);
        let criteria: Vec<Value> = Criterion::ALL
            .into_iter()
            .map(|c| json!({ "criterion": c, "guidance": guidance(c), "weight": self.scoring.weight(c) }))
            .collect();
        Ok(ToolOutcome::ok(json!({
            "evaluation_type": "smart_goals_rubric",
            "goal_count": goal_count,
            "criteria": criteria,
            "score_range": { "min": self.scoring.scale_min, "max": self.scoring.scale_max },
            "instructions": "Score every goal on every criterion. Return one judgment per goal, in goal order.",
        })))
    }
}

/// Descriptor for `fetch_note`.
pub fn fetch_note_tool(store: Arc<NoteStore>) -> ToolDescriptor {
    ToolDescriptor::local(
        FETCH_NOTE,
        "Fetch a clinician note by id or file path. Returns the raw text, the text with one row per line, and note metadata.",
        ToolParameters::new().add_property("data_source", "string", "Note id or path to the note file", true),
        json!({
            "type": "object",
            "properties": {
                "raw_text": { "type": "string" },
                "formatted_text": { "type": "string" },
                "meta": { "type": "object" }
            }
        }),
        Arc::new(FetchNoteHandler { store }),
    )
}

/// Descriptor for `terminology_lookup`.
pub fn terminology_tool() -> ToolDescriptor {
    ToolDescriptor::local(
        TERMINOLOGY_LOOKUP,
        "Look up a behavioral-health condition term. Returns the condition tag, canonical name, ICD-10 code, and synonyms.",
        ToolParameters::new().add_property("term", "string", "Condition name, synonym, or code", true),
        json!({
            "type": "object",
            "properties": {
                "condition_tag": { "type": "string" },
                "canonical_name": { "type": "string" },
                "code": { "type": "string" },
                "synonyms": { "type": "array" }
            }
        }),
        Arc::new(TerminologyHandler),
    )
}

/// Descriptor for `build_eval_plan`.
pub fn eval_plan_tool(scoring: ScoringConfig) -> ToolDescriptor {
    ToolDescriptor::local(
        BUILD_EVAL_PLAN,
        "Get the scoring rubric for S.M.A.R.T. goals: criteria, guidance per criterion, and the score range.",
        ToolParameters::new().add_property("goal_count", "integer", "Number of goals to be scored", true),
        json!({
            "type": "object",
            "properties": {
                "criteria": { "type": "array" },
                "score_range": { "type": "object" }
            }
        }),
        Arc::new(EvalPlanHandler { scoring }),
    )
}

/// All built-in descriptors.
pub fn builtin_tools(store: Arc<NoteStore>, scoring: &ScoringConfig) -> Vec<ToolDescriptor> {
    vec![fetch_note_tool(store), terminology_tool(), eval_plan_tool(scoring.clone())]
}

/// Pulls the note out of a `fetch_note` outcome, or explains why not.
pub fn expect_note(outcome: &ToolOutcome, reference: &str) -> Result<ClinicalNote> {
    if let Some(code) = &outcome.error_code {
        return Err(PipelineError::Config { reason: format!("note reference '{reference}' not resolved ({code})") });
    }
    note_from_payload(&outcome.payload).ok_or_else(|| PipelineError::Config {
        reason: format!("{FETCH_NOTE} returned an unexpected payload for '{reference}'"),
    })
}
