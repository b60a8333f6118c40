//! Notes, goals, and judgments exchanged between the agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A clinician note. Immutable input to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalNote {
    /// Note identifier.
    pub note_id: String,
    /// Free text written by the clinician.
    pub text: String,
    /// Conditions the note is about (e.g. "diabetes").
    #[serde(default)]
    pub condition_tags: Vec<String>,
    /// When the note was recorded.
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
    /// Where the note came from, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ClinicalNote {
    /// Creates a note recorded now with no tags.
    pub fn new(note_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            note_id: note_id.into(),
            text: text.into(),
            condition_tags: Vec::new(),
            recorded_at: Utc::now(),
            source: None,
        }
    }

    /// Adds condition tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.condition_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets the note source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Whether `tag` is one of the note's condition tags, ignoring case.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.condition_tags.iter().any(|t| t.eq_ignore_ascii_case(tag.trim()))
    }
}

/// The five S.M.A.R.T. criteria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// The goal states exactly what will change.
    Specific,
    /// Progress can be counted or observed.
    Measurable,
    /// The client can act on it.
    Actionable,
    /// It addresses the documented condition.
    Relevant,
    /// It has a deadline or review date.
    TimeBound,
}

impl Criterion {
    /// All criteria in canonical order.
    pub const ALL: [Self; 5] =
        [Self::Specific, Self::Measurable, Self::Actionable, Self::Relevant, Self::TimeBound];

    /// Snake-case name, as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Specific => "specific",
            Self::Measurable => "measurable",
            Self::Actionable => "actionable",
            Self::Relevant => "relevant",
            Self::TimeBound => "time_bound",
        }
    }

    /// Parses a criterion name, tolerating case, spaces, and hyphens.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|c| c.as_str() == normalized)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A S.M.A.R.T. goal produced by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartGoal {
    /// Run-scoped id, `goal-1`..`goal-n` in output order.
    pub goal_id: String,
    /// What exactly will change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific: Option<String>,
    /// How progress is measured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurable: Option<String>,
    /// Steps the client takes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actionable: Option<String>,
    /// Link to the documented condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant: Option<String>,
    /// Deadline or review date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_bound: Option<String>,
    /// Condition the goal addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_tag: Option<String>,
    /// Whole goal in one sentence.
    #[serde(default)]
    pub description: String,
}

/// The judge's assessment of one goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    /// Goal this judgment refers to.
    pub goal_id: String,
    /// One score per criterion.
    pub scores: BTreeMap<Criterion, f64>,
    /// Weighted overall score.
    pub overall_score: f64,
    /// Judge's reasoning.
    #[serde(default)]
    pub rationale: String,
}
