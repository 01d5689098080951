//! # QA Pareto Eval
//!
//! Evaluate language models on a question-answer benchmark and compare the
//! graded outcomes.
//!
//! ## Pipeline
//!
//! ```text
//! Benchmark (qa_pairs.json)
//!        ↓
//! Evaluation Runner (retry/backoff per question, one request in flight)
//!        ↓
//! Answer records + run summary (<model>-<lang>.json / .log)
//!        ↓
//! External grader (adds `grade` per record, `accuracy` per run)
//!        ↓
//! ┌──────────────────────────────┬─────────────────────────────────┐
//! │ McNemar paired comparison    │ Pareto frontier: accuracy vs    │
//! │ of two graded result sets    │ GPU-hours, grouped by language  │
//! └──────────────────────────────┴─────────────────────────────────┘
//! ```
//!
//! The runner and backends live in [`runner`] and [`backend`]; the
//! statistics in [`comparator`] and [`pareto`]. Everything else is loading,
//! naming and rendering around them.

pub mod analysis;
pub mod backend;
pub mod benchmark;
pub mod comparator;
pub mod config;
pub mod grading;
pub mod naming;
pub mod pareto;
pub mod report;
pub mod runner;
pub mod schema;
pub mod series;

pub use analysis::{AnalysisError, Consensus, MatchMode, RemovalOutcome};
pub use backend::{Backend, BackendError, ChatCompletionsBackend, OllamaBackend};
pub use benchmark::{Benchmark, QuestionItem};
pub use comparator::{
    mcnemar_p_value, mcnemar_statistic, AlignmentAudit, AlignmentMode, CompareError, Comparator,
    ContingencyTable, McNemarResult, Verdict,
};
pub use config::{pick_model, system_prompt, ConfigError, EvalSettings, FrontierConfig};
pub use grading::{Grade, GradedItem, GradedResults};
pub use naming::{split_model_lang, NameParser, RunName, UnparseableName};
pub use pareto::{
    backfill_num_gpus, pareto_flags, scan_run_logs, FrontierEntry, FrontierError, FrontierGroup,
    FrontierReport, RunLog, RunPoint,
};
pub use report::{append_mcnemar_csv, ReportError, ReportFormat};
pub use runner::{
    write_run_output, AnswerRecord, EvalRunner, ReasoningFilter, RunArtifacts, RunOutput,
    RunSummary, RunnerConfig, RunnerError,
};
pub use schema::SchemaError;
pub use series::{AccuracySeries, FamilySeries, ModelRow, RunAccuracy};
