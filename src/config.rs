//! Configuration for evaluation runs and frontier analysis.
//!
//! Both halves load from YAML with per-field defaults. The frontier lookup
//! tables (GPU counts, parameter counts, model families) are injectable so
//! they can be overridden without touching the analysis code.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for a single evaluation run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalSettings {
    /// Backend model identifier
    #[serde(default)]
    pub model: String,
    /// Prompt language code (lower-cased on validation)
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Maximum number of benchmark questions to run
    #[serde(default = "default_num_questions")]
    pub num_questions: usize,
    /// Benchmark file path
    #[serde(default = "default_qa_path")]
    pub qa_path: PathBuf,
    /// Output directory for answer records and run summaries
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    /// Backend host URL
    #[serde(default = "default_host")]
    pub host: String,
    /// Attempts per question (at least 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Sleep between attempts, in seconds
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: f64,
    /// Per-request timeout, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Strip the reasoning span from answers
    #[serde(default = "default_strip_reasoning")]
    pub strip_reasoning: bool,
    /// Opening marker of the reasoning span
    #[serde(default = "default_reasoning_start")]
    pub reasoning_start: String,
    /// Closing marker of the reasoning span
    #[serde(default = "default_reasoning_end")]
    pub reasoning_end: String,
}

fn default_lang() -> String {
    "en".to_string()
}
const fn default_num_questions() -> usize {
    1000
}
fn default_qa_path() -> PathBuf {
    PathBuf::from("qa_pairs.json")
}
fn default_out_dir() -> PathBuf {
    PathBuf::from("results")
}
fn default_host() -> String {
    "http://localhost:11434".to_string()
}
const fn default_max_retries() -> usize {
    3
}
const fn default_retry_delay_secs() -> f64 {
    10.0
}
const fn default_timeout_secs() -> u64 {
    120
}
const fn default_strip_reasoning() -> bool {
    true
}
fn default_reasoning_start() -> String {
    "<think>".to_string()
}
fn default_reasoning_end() -> String {
    "</think>".to_string()
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            lang: default_lang(),
            num_questions: default_num_questions(),
            qa_path: default_qa_path(),
            out_dir: default_out_dir(),
            host: default_host(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
            strip_reasoning: default_strip_reasoning(),
            reasoning_start: default_reasoning_start(),
            reasoning_end: default_reasoning_end(),
        }
    }
}

impl EvalSettings {
    /// Load settings from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load settings from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_yaml::from_str(yaml)?;
        Ok(settings)
    }

    /// Check invariants and normalize the language code
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when no model is set, `max_retries` is zero,
    /// or the retry delay is negative or not finite.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "no model specified (set --model, MODEL or MODELS)".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".to_string()));
        }
        if !self.retry_delay_secs.is_finite() || self.retry_delay_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "retry_delay_secs must be >= 0, got {}",
                self.retry_delay_secs
            )));
        }
        self.lang = self.lang.to_lowercase();
        Ok(self)
    }

    /// Delay between attempts
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs.max(0.0))
    }

    /// Per-request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Pick the model to evaluate: an explicit model wins, otherwise the first
/// whitespace-separated entry of `models`.
#[must_use]
pub fn pick_model(explicit: Option<&str>, models: &str) -> Option<String> {
    explicit
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
        .or_else(|| models.split_whitespace().next().map(str::to_string))
}

/// System prompt for a prompt language
#[must_use]
pub fn system_prompt(lang: &str) -> &'static str {
    if lang.to_lowercase().starts_with("no") {
        "Du er ekspert på norsk språk og verdenshistorie før 1940. \
         Svar kort (1–2 setninger) og bruk kun kunnskap før 1940. Svar på norsk."
    } else {
        "You are an expert in answering history quizzes using only knowledge from up to 1940. \
         Answer in one or two sentences, using only knowledge up to 1940."
    }
}

/// Lookup tables for the cost/accuracy frontier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrontierConfig {
    /// Language codes recognized as run-name suffixes, in grouping order
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    /// GPU count for models absent from `gpu_counts`
    #[serde(default = "default_num_gpus")]
    pub default_num_gpus: u32,
    /// GPU counts for known large models, keyed by base model id
    #[serde(default = "default_gpu_counts")]
    pub gpu_counts: BTreeMap<String, u32>,
    /// Parameter counts in billions, keyed by base model id
    #[serde(default = "default_param_counts")]
    pub param_counts: BTreeMap<String, f64>,
    /// Model families, matched by substring in this order
    #[serde(default = "default_families")]
    pub families: Vec<String>,
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string(), "no".to_string()]
}

const fn default_num_gpus() -> u32 {
    1
}

fn default_gpu_counts() -> BTreeMap<String, u32> {
    [
        ("deepseek-r1:671b", 3),
        ("llama3.1:405b", 4),
        ("qwen2.5:230b", 2),
        ("qwen3:235b", 2),
        ("gpt-oss:120b", 2),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[allow(clippy::too_many_lines)]
fn default_param_counts() -> BTreeMap<String, f64> {
    [
        ("deepseek-r1:1.5b", 1.5),
        ("deepseek-r1:7b", 7.0),
        ("deepseek-r1:14b", 14.0),
        ("deepseek-r1:32b", 32.0),
        ("deepseek-r1:70b", 70.0),
        ("deepseek-r1:671b", 671.0),
        ("llama3.1:8b", 8.0),
        ("llama3.1:70b", 70.0),
        ("llama3.1:405b", 405.0),
        ("llama3.1:70b-instruct-q4", 70.0),
        ("qwen2.5:0.5b", 0.5),
        ("qwen2.5:3b", 3.0),
        ("qwen2.5:7b", 7.0),
        ("qwen2.5:14b", 14.0),
        ("qwen2.5:32b", 32.0),
        ("qwen2.5:72b", 72.0),
        ("qwen2.5:230b", 230.0),
        ("qwen3:0.6b", 0.6),
        ("qwen3:1.7b", 1.7),
        ("qwen3:8b", 8.0),
        ("qwen3:14b", 14.0),
        ("qwen3:32b", 32.0),
        ("qwen3:235b", 235.0),
        ("qwq:32b", 32.0),
        ("gemma3:270m", 0.27),
        ("gemma3:1b", 1.0),
        ("gemma3:4b", 4.0),
        ("gemma3:27b", 27.0),
        ("magistral:24b", 24.0),
        ("NorwAI-Magistral-24B-reasoning:Q8:0", 24.0),
        ("norwai-mixtral-8x7b", 47.0),
        ("mimir-mistral-7b-core-instruct-Q4", 7.0),
        ("mimir-mistral:7b-core-instruct-Q4", 7.0),
        ("mimir-mistral-7b-core-scratch-instruct-Q4", 7.0),
        ("mimir-mistral:7b-core-scratch-instruct-Q4", 7.0),
        ("gpt-oss:20b", 20.0),
        ("gpt-oss:120b", 120.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_families() -> Vec<String> {
    [
        "deepseek",
        "llama",
        "qwen",
        "gemma",
        "magistral",
        "norwai",
        "mimir",
        "gpt-oss",
        "qwq",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            default_num_gpus: default_num_gpus(),
            gpu_counts: default_gpu_counts(),
            param_counts: default_param_counts(),
            families: default_families(),
        }
    }
}

impl FrontierConfig {
    /// Load frontier tables from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load frontier tables from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Whether runs tagged `lang` will be grouped by the frontier and series views
    #[must_use]
    pub fn is_known_language(&self, lang: &str) -> bool {
        self.languages.iter().any(|known| known == lang)
    }

    /// GPU count for a base model id, falling back to the default
    #[must_use]
    pub fn num_gpus_for(&self, base_id: &str) -> u32 {
        self.gpu_counts
            .get(base_id)
            .copied()
            .unwrap_or(self.default_num_gpus)
    }

    /// Parameter count in billions, 0.0 when unknown
    #[must_use]
    pub fn params_for(&self, base_id: &str) -> f64 {
        self.param_counts.get(base_id).copied().unwrap_or(0.0)
    }

    /// Family of a model id: the first configured family contained in the
    /// lower-cased id, or `"other"`
    #[must_use]
    pub fn family_for(&self, model_id: &str) -> String {
        let lower = model_id.to_lowercase();
        self.families
            .iter()
            .find(|family| lower.contains(family.as_str()))
            .cloned()
            .unwrap_or_else(|| "other".to_string())
    }
}
