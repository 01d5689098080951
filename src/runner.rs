//! Evaluation runner.
//!
//! Sends every benchmark question to a [`Backend`], one at a time and in
//! order, retrying transient failures with a fixed delay. A question whose
//! attempts are exhausted is recorded with the failure sentinel; the run
//! itself never aborts because of one question.

use crate::backend::Backend;
use crate::benchmark::QuestionItem;
use crate::config::EvalSettings;
use crate::naming::output_stem;
use crate::schema::{commit_tmp, write_json_tmp, SchemaError};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Prefix of the answer recorded when every attempt failed
pub const FAILURE_PREFIX: &str = "ERROR: ";

/// Progress is logged on the first question and every this many questions
const PROGRESS_EVERY: usize = 25;

/// Run-level failures. Per-question backend errors never surface here.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Invalid runner configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Removes the first delimited reasoning span from a raw answer
#[derive(Debug, Clone)]
pub struct ReasoningFilter {
    pattern: Regex,
}

impl ReasoningFilter {
    /// Build a filter for spans bounded by `start` and `end` markers
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::InvalidConfig` if either marker is empty.
    pub fn new(start: &str, end: &str) -> Result<Self, RunnerError> {
        if start.is_empty() || end.is_empty() {
            return Err(RunnerError::InvalidConfig(
                "reasoning markers must be non-empty".to_string(),
            ));
        }
        // Non-greedy, dot matches newlines, swallow one trailing newline
        let source = format!("(?s){}.*?{}\n?", regex::escape(start), regex::escape(end));
        let pattern =
            Regex::new(&source).map_err(|e| RunnerError::InvalidConfig(e.to_string()))?;
        Ok(Self { pattern })
    }

    /// Filter for `<think>...</think>` spans
    ///
    /// # Errors
    ///
    /// Never fails for the built-in markers; the signature mirrors [`Self::new`].
    pub fn think_tags() -> Result<Self, RunnerError> {
        Self::new("<think>", "</think>")
    }

    /// Strip the first span
    #[must_use]
    pub fn strip<'a>(&self, text: &'a str) -> std::borrow::Cow<'a, str> {
        self.pattern.replacen(text, 1, "")
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Attempts per question (at least 1)
    pub max_retries: usize,
    /// Sleep between attempts
    pub retry_delay: Duration,
    /// Timeout handed to each backend call
    pub timeout: Duration,
    /// Optional reasoning-span filter
    pub reasoning: Option<ReasoningFilter>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(120),
            reasoning: None,
        }
    }
}

impl RunnerConfig {
    /// Runner configuration from validated settings
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::InvalidConfig` if the reasoning markers are unusable.
    pub fn from_settings(settings: &EvalSettings) -> Result<Self, RunnerError> {
        let reasoning = if settings.strip_reasoning {
            Some(ReasoningFilter::new(
                &settings.reasoning_start,
                &settings.reasoning_end,
            )?)
        } else {
            None
        };
        Ok(Self {
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay(),
            timeout: settings.timeout(),
            reasoning,
        })
    }
}

/// One answered (or failed) question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Zero-based benchmark position; the downstream join key
    pub question_num: usize,
    /// Question text
    pub question: String,
    /// Model answer, or the failure sentinel
    #[serde(rename = "model_ans")]
    pub model_answer: String,
    /// Reference answer
    #[serde(rename = "correct_ans")]
    pub reference_answer: String,
}

impl AnswerRecord {
    /// Whether the answer is the failure sentinel
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.model_answer.starts_with(FAILURE_PREFIX)
    }
}

/// Run summary written next to the answer records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Backend model identifier
    pub model: String,
    /// Prompt language code
    pub lang: String,
    /// Number of questions run
    #[serde(rename = "num_q")]
    pub num_questions: usize,
    /// Questions recorded with the failure sentinel
    #[serde(default)]
    pub num_failed: usize,
    /// Wall-clock duration of the whole pass, retries and sleeps included
    #[serde(rename = "duration_s")]
    pub duration_seconds: f64,
    /// Opaque environment metadata (job ids, node name)
    #[serde(flatten)]
    pub environment: BTreeMap<String, serde_json::Value>,
}

/// Capture scheduler metadata from the environment; unset variables map to null
#[must_use]
pub fn environment_metadata() -> BTreeMap<String, serde_json::Value> {
    [
        ("slurm_job_id", "SLURM_JOB_ID"),
        ("slurm_array_task_id", "SLURM_ARRAY_TASK_ID"),
        ("node", "SLURMD_NODENAME"),
    ]
    .into_iter()
    .map(|(key, var)| {
        let value = std::env::var(var).map_or(serde_json::Value::Null, serde_json::Value::String);
        (key.to_string(), value)
    })
    .collect()
}

/// Output of a completed run
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// One record per question, in input order
    pub records: Vec<AnswerRecord>,
    /// Run summary
    pub summary: RunSummary,
}

/// Sequential evaluation runner
pub struct EvalRunner<B: Backend> {
    backend: B,
    config: RunnerConfig,
}

impl<B: Backend> EvalRunner<B> {
    /// Create a runner with default configuration
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: RunnerConfig::default(),
        }
    }

    /// Create a runner with custom configuration
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::InvalidConfig` if `max_retries` is zero.
    pub fn with_config(backend: B, config: RunnerConfig) -> Result<Self, RunnerError> {
        if config.max_retries == 0 {
            return Err(RunnerError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(Self { backend, config })
    }

    /// Get current configuration
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run every question and time the whole pass
    ///
    /// `question_num` of each record is its position in `questions`.
    pub fn run(
        &self,
        model: &str,
        lang: &str,
        system_prompt: &str,
        questions: &[QuestionItem],
    ) -> RunOutput {
        tracing::info!(
            model = %model,
            lang = %lang,
            num_questions = questions.len(),
            "starting evaluation"
        );

        let start = Instant::now();
        let mut records = Vec::with_capacity(questions.len());

        for (idx, item) in questions.iter().enumerate() {
            let model_answer = self.answer(model, system_prompt, idx, &item.question);

            if idx == 0 || (idx + 1) % PROGRESS_EVERY == 0 {
                tracing::info!(
                    question = idx,
                    elapsed_s = start.elapsed().as_secs_f64(),
                    "evaluating question"
                );
            }

            records.push(AnswerRecord {
                question_num: idx,
                question: item.question.clone(),
                model_answer,
                reference_answer: item.reference_answer.clone(),
            });
        }

        let duration_seconds = round_millis(start.elapsed().as_secs_f64());
        let num_failed = records.iter().filter(|r| r.is_failure()).count();

        tracing::info!(
            model = %model,
            duration_s = duration_seconds,
            num_failed,
            "finished evaluation"
        );

        RunOutput {
            summary: RunSummary {
                timestamp: Utc::now(),
                model: model.to_string(),
                lang: lang.to_string(),
                num_questions: records.len(),
                num_failed,
                duration_seconds,
                environment: environment_metadata(),
            },
            records,
        }
    }

    /// Ask one question with retries; exhaustion yields the failure sentinel
    fn answer(&self, model: &str, system_prompt: &str, idx: usize, question: &str) -> String {
        let max = self.config.max_retries;
        let mut last_error = None;

        for attempt in 1..=max {
            match self
                .backend
                .ask(model, system_prompt, question, self.config.timeout)
            {
                Ok(raw) => return self.postprocess(&raw),
                Err(e) => {
                    tracing::warn!(
                        question = idx,
                        attempt,
                        max_retries = max,
                        error = %e,
                        "backend call failed"
                    );
                    last_error = Some(e);
                    if attempt < max && !self.config.retry_delay.is_zero() {
                        std::thread::sleep(self.config.retry_delay);
                    }
                }
            }
        }

        last_error.map_or_else(
            || "ERROR".to_string(),
            |e| format!("{FAILURE_PREFIX}{e}"),
        )
    }

    fn postprocess(&self, raw: &str) -> String {
        match &self.config.reasoning {
            Some(filter) => filter.strip(raw).trim().to_string(),
            None => raw.trim().to_string(),
        }
    }
}

fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

/// Paths written for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
    /// Answer records (`<stem>.json`)
    pub records_path: PathBuf,
    /// Run summary (`<stem>.log`)
    pub summary_path: PathBuf,
}

/// Persist a run: both files are staged first and renamed into place only
/// once both were written.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or a write fails.
pub fn write_run_output(out_dir: &Path, output: &RunOutput) -> Result<RunArtifacts, RunnerError> {
    std::fs::create_dir_all(out_dir)?;
    let stem = output_stem(&output.summary.model, &output.summary.lang);
    let records_path = out_dir.join(format!("{stem}.json"));
    let summary_path = out_dir.join(format!("{stem}.log"));

    let records_tmp = write_json_tmp(&records_path, &output.records)?;
    let summary_tmp = match write_json_tmp(&summary_path, &output.summary) {
        Ok(tmp) => tmp,
        Err(e) => {
            std::fs::remove_file(&records_tmp).ok();
            return Err(e.into());
        }
    };

    if let Err(e) = commit_tmp(&records_tmp, &records_path) {
        std::fs::remove_file(&records_tmp).ok();
        std::fs::remove_file(&summary_tmp).ok();
        return Err(e.into());
    }
    if let Err(e) = commit_tmp(&summary_tmp, &summary_path) {
        // A records file without its summary would be picked up as a run
        std::fs::remove_file(&summary_tmp).ok();
        std::fs::remove_file(&records_path).ok();
        tracing::warn!(path = %summary_path.display(), error = %e, "rolled back run output");
        return Err(e.into());
    }

    Ok(RunArtifacts {
        records_path,
        summary_path,
    })
}
