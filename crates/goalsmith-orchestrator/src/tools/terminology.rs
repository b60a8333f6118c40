//! Built-in table of behavioral-health condition terms.

use serde::Serialize;

/// One condition and the names it goes by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TermEntry {
    /// Short tag used on notes and goals.
    pub condition_tag: &'static str,
    /// Preferred clinical name.
    pub canonical_name: &'static str,
    /// ICD-10-CM code.
    pub code: &'static str,
    /// Other names that map to this condition.
    pub synonyms: &'static [&'static str],
}

const TABLE: &[TermEntry] = &[
    TermEntry {
        condition_tag: "diabetes",
        canonical_name: "Type 2 diabetes mellitus",
        code: "E11",
        synonyms: &["t2dm", "diabetes mellitus", "type 2 diabetes", "high blood sugar"],
    },
    TermEntry {
        condition_tag: "hypertension",
        canonical_name: "Essential (primary) hypertension",
        code: "I10",
        synonyms: &["htn", "high blood pressure"],
    },
    TermEntry {
        condition_tag: "depression",
        canonical_name: "Major depressive disorder",
        code: "F32",
        synonyms: &["mdd", "major depression", "depressive disorder"],
    },
    TermEntry {
        condition_tag: "anxiety",
        canonical_name: "Generalized anxiety disorder",
        code: "F41.1",
        synonyms: &["gad", "generalized anxiety", "anxiety disorder"],
    },
    TermEntry {
        condition_tag: "ptsd",
        canonical_name: "Post-traumatic stress disorder",
        code: "F43.1",
        synonyms: &["post-traumatic stress", "posttraumatic stress disorder"],
    },
    TermEntry {
        condition_tag: "alcohol use disorder",
        canonical_name: "Alcohol use disorder",
        code: "F10",
        synonyms: &["aud", "alcohol dependence", "alcoholism", "alcohol abuse"],
    },
    TermEntry {
        condition_tag: "insomnia",
        canonical_name: "Insomnia",
        code: "G47.0",
        synonyms: &["sleep disorder", "trouble sleeping"],
    },
    TermEntry {
        condition_tag: "obesity",
        canonical_name: "Obesity",
        code: "E66",
        synonyms: &["overweight", "elevated bmi"],
    },
];

/// Finds the entry whose tag, name, code, or synonym equals `term`, ignoring case.
pub fn lookup(term: &str) -> Option<&'static TermEntry> {
    let term = term.trim();
    TABLE.iter().find(|entry| {
        entry.condition_tag.eq_ignore_ascii_case(term)
            || entry.canonical_name.eq_ignore_ascii_case(term)
            || entry.code.eq_ignore_ascii_case(term)
            || entry.synonyms.iter().any(|s| s.eq_ignore_ascii_case(term))
    })
}

/// Condition tags whose tag or synonyms occur as whole words in `text`.
pub fn detect_conditions(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TABLE
        .iter()
        .filter(|entry| {
            std::iter::once(entry.condition_tag)
                .chain(entry.synonyms.iter().copied())
                .any(|name| contains_word(&lowered, name))
        })
        .map(|entry| entry.condition_tag.to_string())
        .collect()
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
