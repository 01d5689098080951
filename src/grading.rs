//! Graded result ingestion.
//!
//! The external grader attaches a single-letter `grade` code to each answer
//! record. The code is decided once, here, into [`Grade`]; nothing downstream
//! looks at the raw string again.

use crate::schema::{file_stem, lenient_text, read_json, read_text, SchemaError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

/// Grade code meaning "matches the reference answer"
pub const MATCH_CODE: &str = "T";
/// Grade code meaning "does not match"
pub const NO_MATCH_CODE: &str = "F";

/// Tri-state grade decided at ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Grade {
    Match,
    NoMatch,
    #[default]
    Unknown,
}

impl Grade {
    /// Normalize a wire code: trimmed, case-insensitive
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        let normalized = code.trim().to_uppercase();
        if normalized == MATCH_CODE {
            Self::Match
        } else if normalized == NO_MATCH_CODE {
            Self::NoMatch
        } else {
            Self::Unknown
        }
    }

    /// Only `Match` counts as a match; unknown grades count against the model
    #[must_use]
    pub const fn is_match(self) -> bool {
        matches!(self, Self::Match)
    }

    /// Wire code for this grade
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Match => MATCH_CODE,
            Self::NoMatch => NO_MATCH_CODE,
            Self::Unknown => "",
        }
    }
}

impl Serialize for Grade {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Grade {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Any JSON value is accepted; only string codes can be a match
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::String(code) => Self::from_code(&code),
            _ => Self::Unknown,
        })
    }
}

/// An answer record with the grader's verdict attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedItem {
    /// Identity key; optional for concatenated inputs
    #[serde(default)]
    pub question_num: Option<u64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub question: String,
    #[serde(default, rename = "model_ans", deserialize_with = "lenient_text")]
    pub model_answer: String,
    #[serde(default, rename = "correct_ans", deserialize_with = "lenient_text")]
    pub reference_answer: String,
    #[serde(default)]
    pub grade: Grade,
}

impl GradedItem {
    /// Identity key, falling back to the list position
    #[must_use]
    pub fn key_or(&self, index: usize) -> u64 {
        self.question_num.unwrap_or(index as u64)
    }
}

/// Graded items loaded from one or more files, with a display label
#[derive(Debug, Clone, Default)]
pub struct GradedResults {
    /// Source label: file stem, or stems joined with `+`
    pub label: String,
    /// Items in file order
    pub items: Vec<GradedItem>,
}

impl GradedResults {
    #[must_use]
    pub fn new(label: &str, items: Vec<GradedItem>) -> Self {
        Self {
            label: label.to_string(),
            items,
        }
    }

    /// Load a single graded `.json` file
    ///
    /// # Errors
    ///
    /// Returns a `SchemaError` if the file is unreadable or not a list of records.
    pub fn load_json(path: &Path) -> Result<Self, SchemaError> {
        let items: Vec<GradedItem> = read_json(path)?;
        Ok(Self {
            label: file_stem(path),
            items,
        })
    }

    /// Load a `.json` file, or a `.txt` list of `.json` paths concatenated in
    /// list order. Listed files that are missing or malformed are skipped with
    /// a warning.
    ///
    /// # Errors
    ///
    /// Returns a `SchemaError` for an unreadable source, a malformed single
    /// `.json` source, or an unsupported extension.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::load_json(path),
            Some("txt") => Self::load_list(path),
            other => Err(SchemaError::invalid(
                path,
                format!("input must be .json or .txt, got {}", other.unwrap_or("no extension")),
            )),
        }
    }

    fn load_list(path: &Path) -> Result<Self, SchemaError> {
        let listing = read_text(path)?;
        let mut items = Vec::new();
        let mut labels = Vec::new();

        for line in listing.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let entry = Path::new(line);
            if !entry.exists() {
                tracing::warn!(path = %entry.display(), "listed result file not found, skipping");
                continue;
            }
            match Self::load_json(entry) {
                Ok(part) => {
                    items.extend(part.items);
                    labels.push(part.label);
                }
                Err(e) => {
                    tracing::warn!(path = %entry.display(), error = %e, "malformed result file, skipping");
                }
            }
        }

        Ok(Self {
            label: labels.join("+"),
            items,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fraction of items graded as a match
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn accuracy(&self) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        let matches = self.items.iter().filter(|i| i.grade.is_match()).count();
        matches as f64 / self.items.len() as f64
    }
}
