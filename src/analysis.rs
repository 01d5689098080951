//! Per-question analysis over graded result files.
//!
//! These helpers operate on raw JSON records rather than [`GradedItem`] so
//! that every field the grader or earlier tooling attached survives a
//! filter-and-rewrite untouched.
//!
//! [`GradedItem`]: crate::grading::GradedItem

use crate::grading::Grade;
use crate::schema::{files_with_extension, glob_sorted, read_json, read_text, write_json_atomic, SchemaError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default key holding the grade code
pub const DEFAULT_GRADE_KEY: &str = "grade";

/// Errors that can occur during question analysis
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("no files matched: {0}")]
    NoFiles(String),
}

/// Grade stored under `grade_key`; anything but a string code is unknown
#[must_use]
pub fn grade_of(item: &Value, grade_key: &str) -> Grade {
    item.get(grade_key)
        .and_then(Value::as_str)
        .map_or(Grade::Unknown, Grade::from_code)
}

/// `question_num` of a record, if present and integral
#[must_use]
pub fn question_num_of(item: &Value) -> Option<u64> {
    match item.get("question_num")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Every record whose grade is not a match
#[must_use]
pub fn incorrect_items(items: &[Value], grade_key: &str) -> Vec<Value> {
    items
        .iter()
        .filter(|item| !grade_of(item, grade_key).is_match())
        .cloned()
        .collect()
}

/// Question ids that every run got right, and those every run got wrong
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consensus {
    pub all_correct: BTreeSet<u64>,
    pub all_incorrect: BTreeSet<u64>,
    /// Runs that took part
    pub runs: usize,
}

impl Consensus {
    /// Intersect per-run outcomes. The id is `question_num`, falling back to
    /// the list position; missing and unknown grades count as wrong.
    #[must_use]
    pub fn from_runs<'a, I>(runs: I, grade_key: &str) -> Self
    where
        I: IntoIterator<Item = &'a [Value]>,
    {
        let mut consensus: Option<Self> = None;
        for items in runs {
            let mut correct = BTreeSet::new();
            let mut incorrect = BTreeSet::new();
            for (index, item) in items.iter().enumerate() {
                let id = question_num_of(item).unwrap_or(index as u64);
                if grade_of(item, grade_key).is_match() {
                    correct.insert(id);
                } else {
                    incorrect.insert(id);
                }
            }

            consensus = Some(match consensus {
                None => Self {
                    all_correct: correct,
                    all_incorrect: incorrect,
                    runs: 1,
                },
                Some(acc) => Self {
                    all_correct: acc.all_correct.intersection(&correct).copied().collect(),
                    all_incorrect: acc.all_incorrect.intersection(&incorrect).copied().collect(),
                    runs: acc.runs + 1,
                },
            });
        }
        consensus.unwrap_or_default()
    }

    /// Records of `reference` whose `question_num` every run got wrong
    #[must_use]
    pub fn incorrect_in(&self, reference: &[Value]) -> Vec<Value> {
        reference
            .iter()
            .filter(|item| question_num_of(item).is_some_and(|id| self.all_incorrect.contains(&id)))
            .cloned()
            .collect()
    }
}

/// How a record is matched against the ids to remove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// `question_num`, falling back to the list position
    #[default]
    Auto,
    /// List position only
    Index,
    /// `question_num`, falling back to the list position
    QuestionNum,
}

/// Drop records whose key is in `ids`, keeping everything else verbatim.
/// Returns the kept records and the number removed.
#[must_use]
pub fn remove_questions(items: Vec<Value>, ids: &BTreeSet<u64>, mode: MatchMode) -> (Vec<Value>, usize) {
    let before = items.len();
    let kept: Vec<Value> = items
        .into_iter()
        .enumerate()
        .filter(|(index, item)| {
            let key = match mode {
                MatchMode::Index => *index as u64,
                MatchMode::Auto | MatchMode::QuestionNum => {
                    question_num_of(item).unwrap_or(*index as u64)
                }
            };
            !ids.contains(&key)
        })
        .map(|(_, item)| item)
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}

/// Parse a comma-separated id list, ignoring blanks
///
/// # Errors
///
/// Returns the offending token if one is not a non-negative integer.
pub fn parse_id_list(list: &str) -> Result<BTreeSet<u64>, String> {
    list.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<u64>().map_err(|_| t.to_string()))
        .collect()
}

/// Read a JSON file that must hold a list of records
///
/// # Errors
///
/// Returns a `SchemaError` if the file is unreadable or not a list.
pub fn read_records(path: &Path) -> Result<Vec<Value>, SchemaError> {
    match read_json::<Value>(path)? {
        Value::Array(items) => Ok(items),
        _ => Err(SchemaError::invalid(path, "expected a list of records")),
    }
}

/// Write the incorrectly answered records of `input` to `output`.
/// Returns how many were written.
///
/// # Errors
///
/// Returns a `SchemaError` if the input is not a list or the write fails.
pub fn extract_incorrect(input: &Path, output: &Path, grade_key: &str) -> Result<usize, SchemaError> {
    let items = read_records(input)?;
    let incorrect = incorrect_items(&items, grade_key);
    write_json_atomic(output, &incorrect)?;
    tracing::info!(count = incorrect.len(), output = %output.display(), "wrote incorrect items");
    Ok(incorrect.len())
}

/// Consensus over every `*.json` in `dir`. Files that are not lists of
/// records are skipped.
///
/// # Errors
///
/// Returns `AnalysisError::NoFiles` if the directory holds no `.json` files.
pub fn consensus_in_dir(dir: &Path, grade_key: &str) -> Result<Consensus, AnalysisError> {
    let files = files_with_extension(dir, "json")?;
    if files.is_empty() {
        return Err(AnalysisError::NoFiles(format!("{}/*.json", dir.display())));
    }

    let mut runs = Vec::new();
    for path in &files {
        match read_records(path) {
            Ok(items) => runs.push(items),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping results file"),
        }
    }
    let consensus = Consensus::from_runs(runs.iter().map(Vec::as_slice), grade_key);
    tracing::info!(
        runs = consensus.runs,
        all_correct = consensus.all_correct.len(),
        all_incorrect = consensus.all_incorrect.len(),
        "computed consensus"
    );
    Ok(consensus)
}

/// Outcome of removing questions from one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub path: PathBuf,
    pub removed: usize,
    /// False for dry runs and untouched files
    pub written: bool,
}

/// Remove `ids` from every JSON list matched by `pattern`, rewriting the
/// files in place unless `dry_run`. Empty and non-list files are skipped.
///
/// # Errors
///
/// Returns an error if the pattern is invalid, matches nothing, or a
/// matched file cannot be read or written.
pub fn remove_questions_in_files(
    pattern: &str,
    ids: &BTreeSet<u64>,
    mode: MatchMode,
    dry_run: bool,
) -> Result<Vec<RemovalOutcome>, AnalysisError> {
    let targets = glob_sorted(pattern)?;
    if targets.is_empty() {
        return Err(AnalysisError::NoFiles(pattern.to_string()));
    }

    let mut outcomes = Vec::with_capacity(targets.len());
    for path in targets {
        if read_text(&path)?.trim().is_empty() {
            continue;
        }
        let items = match read_json::<Value>(&path)? {
            Value::Array(items) => items,
            _ => continue,
        };

        let (kept, removed) = remove_questions(items, ids, mode);
        if dry_run {
            tracing::info!(path = %path.display(), removed, "dry run: would remove questions");
        } else {
            write_json_atomic(&path, &kept)?;
            tracing::info!(path = %path.display(), removed, "removed questions");
        }
        outcomes.push(RemovalOutcome {
            path,
            removed,
            written: !dry_run,
        });
    }
    Ok(outcomes)
}
