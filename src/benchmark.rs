//! Benchmark loading.
//!
//! The benchmark file is a JSON object with a `qa_pairs` list; the runner
//! consumes a length-bounded prefix of it. Each question is assigned its
//! zero-based position as `question_num`, the join key used downstream.

use crate::schema::{lenient_text, read_text, SchemaError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single benchmark question with its reference answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionItem {
    /// Zero-based position in the benchmark
    pub question_num: usize,
    /// Question text
    pub question: String,
    /// Reference answer
    pub reference_answer: String,
}

#[derive(Debug, Deserialize)]
struct RawPair {
    #[serde(default, deserialize_with = "lenient_text")]
    question: String,
    #[serde(default, deserialize_with = "lenient_text")]
    answer: String,
}

#[derive(Debug, Deserialize)]
struct RawBenchmark {
    qa_pairs: Vec<RawPair>,
}

/// Ordered question set
#[derive(Debug, Clone, Default)]
pub struct Benchmark {
    questions: Vec<QuestionItem>,
}

impl Benchmark {
    /// Load at most `limit` questions from a benchmark file
    ///
    /// # Errors
    ///
    /// Returns a `SchemaError` if the file cannot be read, is not a JSON
    /// object, or lacks a `qa_pairs` list.
    pub fn load<P: AsRef<Path>>(path: P, limit: usize) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let content = read_text(path)?;
        Self::from_json(&content, limit).map_err(|reason| SchemaError::invalid(path, reason))
    }

    /// Parse a benchmark from a JSON string
    ///
    /// # Errors
    ///
    /// Returns a description of the schema violation.
    pub fn from_json(json: &str, limit: usize) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| format!("not valid JSON: {e}"))?;
        if !value.is_object() {
            return Err("expected an object with 'qa_pairs'".to_string());
        }
        match value.get("qa_pairs") {
            None => return Err("missing 'qa_pairs'".to_string()),
            Some(pairs) if !pairs.is_array() => {
                return Err("'qa_pairs' must be a list".to_string());
            }
            Some(_) => {}
        }
        let raw: RawBenchmark =
            serde_json::from_value(value).map_err(|e| format!("malformed qa pair: {e}"))?;

        Ok(Self::from_pairs(
            raw.qa_pairs
                .into_iter()
                .take(limit)
                .map(|pair| (pair.question, pair.answer)),
        ))
    }

    /// Build a benchmark from (question, answer) pairs in order
    pub fn from_pairs<I, Q, A>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Q, A)>,
        Q: Into<String>,
        A: Into<String>,
    {
        let questions = pairs
            .into_iter()
            .enumerate()
            .map(|(question_num, (question, answer))| QuestionItem {
                question_num,
                question: question.into(),
                reference_answer: answer.into(),
            })
            .collect();
        Self { questions }
    }

    /// Questions in benchmark order
    #[must_use]
    pub fn questions(&self) -> &[QuestionItem] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuestionItem> {
        self.questions.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "qa_pairs": [
            {"question": "Who won in 1905?", "answer": "Norway"},
            {"question": "Capital?", "answer": "Kristiania"},
            {"question": "Year?"}
        ]
    }"#;

    #[test]
    fn test_from_json_assigns_positions() {
        let bench = Benchmark::from_json(SAMPLE, 10).unwrap();
        assert_eq!(bench.len(), 3);
        for (idx, item) in bench.iter().enumerate() {
            assert_eq!(item.question_num, idx);
        }
        assert_eq!(bench.questions()[1].reference_answer, "Kristiania");
        // Missing answer defaults to empty
        assert_eq!(bench.questions()[2].reference_answer, "");
    }

    #[test]
    fn test_from_json_limits_prefix() {
        let bench = Benchmark::from_json(SAMPLE, 2).unwrap();
        assert_eq!(bench.len(), 2);
        assert_eq!(bench.questions()[1].question, "Capital?");
    }

    #[test]
    fn test_from_json_stringifies_scalars() {
        let json = r#"{"qa_pairs": [
            {"question": "Year of the union dissolution?", "answer": 1905},
            {"question": 42, "answer": null}
        ]}"#;
        let bench = Benchmark::from_json(json, 10).unwrap();
        assert_eq!(bench.questions()[0].reference_answer, "1905");
        assert_eq!(bench.questions()[1].question, "42");
        assert_eq!(bench.questions()[1].reference_answer, "");
    }

    #[test]
    fn test_from_json_zero_limit() {
        let bench = Benchmark::from_json(SAMPLE, 0).unwrap();
        assert!(bench.is_empty());
    }

    #[test]
    fn test_from_json_rejects_list_root() {
        let err = Benchmark::from_json("[]", 10).unwrap_err();
        assert!(err.contains("qa_pairs"));
    }

    #[test]
    fn test_from_json_rejects_missing_pairs() {
        assert!(Benchmark::from_json(r#"{"pairs": []}"#, 10).is_err());
    }

    #[test]
    fn test_from_json_rejects_non_list_pairs() {
        let err = Benchmark::from_json(r#"{"qa_pairs": {}}"#, 10).unwrap_err();
        assert!(err.contains("must be a list"));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("qa.json");
        std::fs::write(&path, r#"{"qa_pairs": 3}"#).unwrap();

        let err = Benchmark::load(&path, 10).unwrap_err();
        assert!(matches!(err, SchemaError::Invalid { .. }));
        assert_eq!(err.path(), path.as_path());
    }

    #[test]
    fn test_load_not_found() {
        let err = Benchmark::load("/nonexistent/qa.json", 10).unwrap_err();
        assert!(matches!(err, SchemaError::Io { .. }));
    }
}
