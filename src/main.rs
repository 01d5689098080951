//! QA Pareto Eval CLI
//!
//! Evaluate models on a QA benchmark, compare graded results, and analyze
//! the accuracy vs GPU-hours frontier.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use qa_pareto_eval::analysis::{self, DEFAULT_GRADE_KEY};
use qa_pareto_eval::{
    append_mcnemar_csv, backfill_num_gpus, pick_model, scan_run_logs, series, system_prompt,
    write_run_output, AccuracySeries, AlignmentMode, Backend, Benchmark, ChatCompletionsBackend,
    Comparator, EvalRunner, EvalSettings, FrontierConfig, FrontierReport, GradedResults,
    MatchMode, OllamaBackend, ReportFormat, RunnerConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qa-pareto-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate answers for the benchmark with one model
    Evaluate {
        /// YAML settings file; flags override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Model name
        #[arg(long, env = "MODEL")]
        model: Option<String>,

        /// Whitespace-separated model list; the first entry is used when --model is unset
        #[arg(long, env = "MODELS", default_value = "")]
        models: String,

        /// Language tag used in prompts and file names
        #[arg(long, env = "LANG")]
        lang: Option<String>,

        /// Number of questions
        #[arg(long, env = "NUM_Q")]
        num_q: Option<usize>,

        /// Benchmark file
        #[arg(long, env = "QA_PATH")]
        qa_path: Option<PathBuf>,

        /// Output directory
        #[arg(long, env = "OUT_DIR")]
        out_dir: Option<PathBuf>,

        /// Ollama host
        #[arg(long, env = "OLLAMA_HOST")]
        ollama_host: Option<String>,

        /// OpenAI-compatible chat completions URL (replaces Ollama)
        #[arg(long, requires = "api_key")]
        api_url: Option<String>,

        /// Bearer token for --api-url
        #[arg(long, env = "API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Attempts per question
        #[arg(long)]
        max_retries: Option<usize>,

        /// Seconds to sleep between attempts
        #[arg(long)]
        retry_sleep_s: Option<f64>,

        /// Keep <think>...</think> blocks in answers
        #[arg(long)]
        no_strip_think: bool,
    },

    /// Send one question to a chat completions endpoint
    Ask {
        /// Chat completions URL
        #[arg(long)]
        url: String,

        /// Bearer token
        #[arg(long, env = "API_KEY", hide_env_values = true)]
        api_key: String,

        /// Model name
        #[arg(long)]
        model: String,

        /// Optional system prompt
        #[arg(long, default_value = "")]
        system: String,

        /// Request timeout in seconds
        #[arg(long, default_value = "60")]
        timeout_s: f64,

        /// Question text
        question: String,
    },

    /// McNemar test between two graded result sets (.json or .txt list)
    Mcnemar {
        file1: PathBuf,
        file2: PathBuf,

        /// Pair by position only, warning on question_num mismatches
        #[arg(long)]
        relaxed: bool,

        /// CSV file the result is appended to
        #[arg(long, default_value = "mcnemar_results.csv")]
        output_csv: PathBuf,

        /// Do not write CSV output
        #[arg(long)]
        no_append: bool,

        /// Output format (text, markdown, json)
        #[arg(long, default_value = "text")]
        format: ReportFormat,
    },

    /// Pareto frontier of accuracy vs GPU-hours per language
    Pareto {
        /// Directory containing graded .log files
        #[arg(long, env = "OUT_DIR", default_value = "results")]
        results_dir: PathBuf,

        /// YAML file with lookup tables
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format (text, markdown, json)
        #[arg(long, default_value = "text")]
        format: ReportFormat,
    },

    /// Add num_gpus to .log files that lack it
    BackfillGpus {
        #[arg(long, default_value = "results")]
        results_dir: PathBuf,

        /// Fallback GPU count for unknown models (overrides the config file)
        #[arg(long)]
        default_num_gpus: Option<u32>,

        /// YAML file with lookup tables
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Extract incorrectly answered questions from a graded results file
    Incorrect {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        output: PathBuf,

        /// Key holding grade values
        #[arg(long, default_value = DEFAULT_GRADE_KEY)]
        grade_key: String,
    },

    /// Question IDs every graded run answered correctly / incorrectly
    Consensus {
        #[arg(long, env = "OUT_DIR", default_value = "results")]
        results_dir: PathBuf,

        /// Results file the all-incorrect questions are copied from
        #[arg(long)]
        reference: PathBuf,

        #[arg(long, default_value = "all_models_incorrect_q.json")]
        output: PathBuf,

        #[arg(long, default_value = DEFAULT_GRADE_KEY)]
        grade_key: String,
    },

    /// Remove selected question IDs from results files in place
    RemoveQuestions {
        /// Comma-separated question IDs
        #[arg(long)]
        questions: String,

        /// Glob pattern for files to edit
        #[arg(long, default_value = "results/*.json")]
        glob: String,

        /// Match by auto, index or question_num
        #[arg(long = "match", default_value = "auto", value_parser = parse_match_mode)]
        match_mode: MatchMode,

        /// Do not write files
        #[arg(long)]
        dry_run: bool,
    },

    /// Accuracy series per model and per family, as JSON
    Series {
        #[arg(long, env = "OUT_DIR", default_value = "results")]
        results_dir: PathBuf,

        /// YAML file with lookup tables
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn parse_match_mode(s: &str) -> Result<MatchMode, String> {
    match s {
        "auto" => Ok(MatchMode::Auto),
        "index" => Ok(MatchMode::Index),
        "question_num" => Ok(MatchMode::QuestionNum),
        other => Err(format!("expected auto, index or question_num, got {other}")),
    }
}

fn load_frontier_config(path: Option<&PathBuf>) -> Result<FrontierConfig> {
    path.map_or_else(
        || Ok(FrontierConfig::default()),
        |p| {
            FrontierConfig::load(p)
                .with_context(|| format!("failed to load frontier config {}", p.display()))
        },
    )
}

#[allow(clippy::too_many_arguments)]
fn evaluate_settings(
    config: Option<&PathBuf>,
    model: Option<&str>,
    models: &str,
    lang: Option<String>,
    num_q: Option<usize>,
    qa_path: Option<PathBuf>,
    out_dir: Option<PathBuf>,
    ollama_host: Option<String>,
    max_retries: Option<usize>,
    retry_sleep_s: Option<f64>,
    no_strip_think: bool,
) -> Result<EvalSettings> {
    let mut settings = match config {
        Some(path) => EvalSettings::load(path)
            .with_context(|| format!("failed to load settings {}", path.display()))?,
        None => EvalSettings::default(),
    };

    let file_model = Some(settings.model.as_str()).filter(|m| !m.is_empty());
    if let Some(picked) = pick_model(model.or(file_model), models) {
        settings.model = picked;
    }
    if let Some(lang) = lang {
        settings.lang = lang;
    }
    if let Some(n) = num_q {
        settings.num_questions = n;
    }
    if let Some(path) = qa_path {
        settings.qa_path = path;
    }
    if let Some(dir) = out_dir {
        settings.out_dir = dir;
    }
    if let Some(host) = ollama_host {
        settings.host = host;
    }
    if let Some(n) = max_retries {
        settings.max_retries = n;
    }
    if let Some(secs) = retry_sleep_s {
        settings.retry_delay_secs = secs;
    }
    if no_strip_think {
        settings.strip_reasoning = false;
    }

    Ok(settings.validate()?)
}

fn run_evaluation<B: Backend>(backend: B, settings: &EvalSettings) -> Result<()> {
    let benchmark = Benchmark::load(&settings.qa_path, settings.num_questions)
        .context("failed to load benchmark")?;
    let runner = EvalRunner::with_config(backend, RunnerConfig::from_settings(settings)?)?;

    let output = runner.run(
        &settings.model,
        &settings.lang,
        system_prompt(&settings.lang),
        benchmark.questions(),
    );
    let artifacts = write_run_output(&settings.out_dir, &output)
        .context("failed to write run output")?;

    println!(
        "Wrote {} answers ({} failed) in {:.1}s",
        output.summary.num_questions, output.summary.num_failed, output.summary.duration_seconds
    );
    println!("  answers: {}", artifacts.records_path.display());
    println!("  summary: {}", artifacts.summary_path.display());
    Ok(())
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Evaluate {
            config,
            model,
            models,
            lang,
            num_q,
            qa_path,
            out_dir,
            ollama_host,
            api_url,
            api_key,
            max_retries,
            retry_sleep_s,
            no_strip_think,
        } => {
            let settings = evaluate_settings(
                config.as_ref(),
                model.as_deref(),
                &models,
                lang,
                num_q,
                qa_path,
                out_dir,
                ollama_host,
                max_retries,
                retry_sleep_s,
                no_strip_think,
            )?;
            let frontier = FrontierConfig::default();
            if !frontier.is_known_language(&settings.lang) {
                tracing::warn!(
                    lang = %settings.lang,
                    known = ?frontier.languages,
                    "language is not a known run suffix; pareto and series will not group this run (pass --lang)"
                );
            }
            tracing::info!(
                model = %settings.model,
                lang = %settings.lang,
                num_questions = settings.num_questions,
                out_dir = %settings.out_dir.display(),
                "Starting evaluation"
            );

            match (api_url, api_key) {
                (Some(url), Some(key)) => {
                    run_evaluation(ChatCompletionsBackend::new(&url, &key), &settings)
                }
                _ => run_evaluation(OllamaBackend::new(&settings.host), &settings),
            }
        }
        Commands::Ask {
            url,
            api_key,
            model,
            system,
            timeout_s,
            question,
        } => {
            if !timeout_s.is_finite() || timeout_s <= 0.0 {
                bail!("--timeout-s must be positive, got {timeout_s}");
            }
            let backend = ChatCompletionsBackend::new(&url, &api_key);
            let answer = backend
                .ask(&model, &system, &question, Duration::from_secs_f64(timeout_s))
                .context("chat completion request failed")?;
            println!("{answer}");
            Ok(())
        }
        Commands::Mcnemar {
            file1,
            file2,
            relaxed,
            output_csv,
            no_append,
            format,
        } => {
            let first = GradedResults::load(&file1)?;
            let second = GradedResults::load(&file2)?;
            let mode = if relaxed {
                AlignmentMode::Relaxed
            } else {
                AlignmentMode::Strict
            };
            tracing::info!(
                model1 = %first.label,
                model2 = %second.label,
                mode = ?mode,
                "Comparing result sets"
            );

            let result = Comparator::new(mode)
                .compare(&first, &second)
                .with_context(|| format!("cannot compare {} and {}", first.label, second.label))?;

            match format {
                ReportFormat::Text => print!("{}", result.to_text()),
                ReportFormat::Markdown => print!("{}", result.to_markdown()),
                ReportFormat::Json => println!("{}", result.to_json()?),
            }

            if !no_append {
                append_mcnemar_csv(&output_csv, &result)
                    .with_context(|| format!("failed to append to {}", output_csv.display()))?;
                tracing::info!(path = %output_csv.display(), "results appended");
            }
            Ok(())
        }
        Commands::Pareto {
            results_dir,
            config,
            format,
        } => {
            let config = load_frontier_config(config.as_ref())?;
            let points = scan_run_logs(&results_dir, &config)?;
            if points.is_empty() {
                bail!("no usable .log files in {}", results_dir.display());
            }
            let report = FrontierReport::analyze(&points, &config.languages);
            print!("{}", report.render(format)?);
            Ok(())
        }
        Commands::BackfillGpus {
            results_dir,
            default_num_gpus,
            config,
        } => {
            if !results_dir.exists() {
                bail!("results dir not found: {}", results_dir.display());
            }
            let mut config = load_frontier_config(config.as_ref())?;
            if let Some(n) = default_num_gpus {
                config.default_num_gpus = n;
            }
            let updated = backfill_num_gpus(&results_dir, &config)?;
            println!("updated {updated} log files");
            Ok(())
        }
        Commands::Incorrect {
            input,
            output,
            grade_key,
        } => {
            let count = analysis::extract_incorrect(&input, &output, &grade_key)?;
            println!("wrote {count} incorrect items to {}", output.display());
            Ok(())
        }
        Commands::Consensus {
            results_dir,
            reference,
            output,
            grade_key,
        } => {
            let consensus = analysis::consensus_in_dir(&results_dir, &grade_key)?;
            println!("answers all models answered correctly {:?}", consensus.all_correct);
            println!("answers all models answered incorrectly {:?}", consensus.all_incorrect);

            let reference_items = analysis::read_records(&reference)
                .with_context(|| format!("reference file {}", reference.display()))?;
            let incorrect = consensus.incorrect_in(&reference_items);
            qa_pareto_eval::schema::write_json_atomic(&output, &incorrect)?;
            println!("wrote {} items to {}", incorrect.len(), output.display());
            Ok(())
        }
        Commands::RemoveQuestions {
            questions,
            glob,
            match_mode,
            dry_run,
        } => {
            let ids = analysis::parse_id_list(&questions)
                .map_err(|token| anyhow::anyhow!("invalid question id: {token}"))?;
            let outcomes = analysis::remove_questions_in_files(&glob, &ids, match_mode, dry_run)?;
            for outcome in &outcomes {
                let verb = if outcome.written { "removed" } else { "would remove" };
                println!("{}: {verb} {} questions", outcome.path.display(), outcome.removed);
            }
            Ok(())
        }
        Commands::Series {
            results_dir,
            config,
        } => {
            let config = load_frontier_config(config.as_ref())?;
            let runs = series::load_accuracies(&results_dir)?;
            if runs.is_empty() {
                bail!("no results found in .log files under {}", results_dir.display());
            }
            let accuracy = AccuracySeries::build(&runs, &config.languages)?;
            println!("{}", serde_json::to_string_pretty(&accuracy)?);
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
