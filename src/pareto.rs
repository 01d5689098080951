//! Pareto frontier analysis for accuracy vs GPU-hours.
//!
//! A run is Pareto-optimal when no other run in its group is both cheaper
//! (strictly lower GPU-hours) and better (strictly higher accuracy). Ties on
//! either axis never dominate.
//!
//! Groups hold tens of runs, so dominance is the plain pairwise O(n^2) scan.

use crate::config::FrontierConfig;
use crate::naming::{base_model_id, split_model_lang};
use crate::schema::{file_stem, files_with_extension, read_json, read_text, write_json_atomic, SchemaError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while building a frontier
#[derive(Error, Debug)]
pub enum FrontierError {
    #[error("no runs in group '{0}'")]
    EmptyGroup(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Invalid name pattern: {0}")]
    Regex(#[from] regex::Error),
}

/// Graded run summary as read back from a `.log` file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunLog {
    /// Whole-run wall clock, seconds
    pub duration_s: f64,
    /// Grader-attached accuracy in [0, 1]
    pub accuracy: f64,
    /// GPUs the run occupied, when recorded
    #[serde(default)]
    pub num_gpus: Option<u32>,
}

impl RunLog {
    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns a description of the first out-of-range field.
    pub fn validate(&self) -> Result<(), String> {
        if !self.duration_s.is_finite() || self.duration_s < 0.0 {
            return Err(format!("duration_s must be >= 0, got {}", self.duration_s));
        }
        if !(0.0..=1.0).contains(&self.accuracy) {
            return Err(format!("accuracy must be in [0, 1], got {}", self.accuracy));
        }
        Ok(())
    }
}

/// One run on the cost/accuracy plane
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunPoint {
    /// Run identifier (file stem)
    pub id: String,
    /// Model id with the language suffix stripped
    pub base_id: String,
    /// Prompt language, `None` when the id carries no known suffix
    pub lang: Option<String>,
    pub family: String,
    /// Parameter count in billions, 0.0 when unknown
    pub param_count_b: f64,
    /// Accuracy in percent
    pub accuracy_pct: f64,
    pub duration_hours: f64,
    pub num_gpus: u32,
    /// `duration_hours * num_gpus`, the cost axis
    pub gpu_hours: f64,
}

impl RunPoint {
    /// Build a point from a graded run summary.
    ///
    /// GPU count: the value recorded in the log, else the lookup table for
    /// the base model, else the configured default.
    #[must_use]
    pub fn from_log(id: &str, log: &RunLog, config: &FrontierConfig) -> Self {
        let (base_id, lang) = match split_model_lang(id, &config.languages) {
            Ok(name) => (name.base_id, Some(name.lang)),
            Err(_) => (id.to_string(), None),
        };
        let num_gpus = log
            .num_gpus
            .unwrap_or_else(|| config.num_gpus_for(&base_id));
        let duration_hours = log.duration_s / 3600.0;

        Self {
            id: id.to_string(),
            family: config.family_for(id),
            param_count_b: config.params_for(&base_id),
            accuracy_pct: log.accuracy * 100.0,
            duration_hours,
            num_gpus,
            gpu_hours: duration_hours * f64::from(num_gpus),
            base_id,
            lang,
        }
    }

    /// Check if `self` dominates `other`: strictly cheaper AND strictly more accurate
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        self.gpu_hours < other.gpu_hours && self.accuracy_pct > other.accuracy_pct
    }
}

/// Pareto flag for each point, in input order
#[must_use]
pub fn pareto_flags(points: &[RunPoint]) -> Vec<bool> {
    points
        .iter()
        .enumerate()
        .map(|(i, candidate)| {
            !points
                .iter()
                .enumerate()
                .any(|(j, other)| i != j && other.dominates(candidate))
        })
        .collect()
}

/// Sum of GPU-hours over every point
#[must_use]
pub fn total_gpu_hours(points: &[RunPoint]) -> f64 {
    points.iter().map(|p| p.gpu_hours).sum()
}

/// Frontier output row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrontierEntry {
    pub id: String,
    pub family: String,
    pub param_count_b: f64,
    pub num_gpus: u32,
    pub gpu_hours: f64,
    pub accuracy_pct: f64,
    pub pareto_optimal: bool,
}

/// One comparison group, ordered by ascending GPU-hours
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrontierGroup {
    /// Group key (prompt language)
    pub lang: String,
    pub entries: Vec<FrontierEntry>,
}

impl FrontierGroup {
    /// Flag and order the points of one group
    ///
    /// # Errors
    ///
    /// Returns `FrontierError::EmptyGroup` if `points` is empty.
    pub fn build(lang: &str, points: &[RunPoint]) -> Result<Self, FrontierError> {
        if points.is_empty() {
            return Err(FrontierError::EmptyGroup(lang.to_string()));
        }

        let flags = pareto_flags(points);
        let mut entries: Vec<FrontierEntry> = points
            .iter()
            .zip(flags)
            .map(|(point, pareto_optimal)| FrontierEntry {
                id: point.id.clone(),
                family: point.family.clone(),
                param_count_b: point.param_count_b,
                num_gpus: point.num_gpus,
                gpu_hours: point.gpu_hours,
                accuracy_pct: point.accuracy_pct,
                pareto_optimal,
            })
            .collect();

        // Ties keep no particular order
        entries.sort_by(|a, b| {
            a.gpu_hours
                .partial_cmp(&b.gpu_hours)
                .unwrap_or(Ordering::Equal)
        });

        Ok(Self {
            lang: lang.to_string(),
            entries,
        })
    }

    /// Entries on the frontier, cheapest first
    pub fn optimal(&self) -> impl Iterator<Item = &FrontierEntry> {
        self.entries.iter().filter(|e| e.pareto_optimal)
    }
}

/// Per-group frontiers plus the aggregate cost of every input run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrontierReport {
    pub groups: Vec<FrontierGroup>,
    /// GPU-hours summed over all runs, grouped or not
    pub total_gpu_hours: f64,
    /// Number of runs considered
    pub num_runs: usize,
}

impl FrontierReport {
    /// Group by language (in `languages` order) and flag each group.
    /// Languages with no runs are left out.
    #[must_use]
    pub fn analyze<S: AsRef<str>>(points: &[RunPoint], languages: &[S]) -> Self {
        let groups = languages
            .iter()
            .map(AsRef::as_ref)
            .filter_map(|lang| {
                let members: Vec<RunPoint> = points
                    .iter()
                    .filter(|p| p.lang.as_deref() == Some(lang))
                    .cloned()
                    .collect();
                FrontierGroup::build(lang, &members).ok()
            })
            .collect();

        Self {
            groups,
            total_gpu_hours: total_gpu_hours(points),
            num_runs: points.len(),
        }
    }

    /// Group for a language
    #[must_use]
    pub fn group(&self, lang: &str) -> Option<&FrontierGroup> {
        self.groups.iter().find(|g| g.lang == lang)
    }
}

/// Load one graded `.log` file as a point
///
/// # Errors
///
/// Returns a `SchemaError` if the file is unreadable, lacks `duration_s` or
/// `accuracy`, or holds out-of-range values.
pub fn load_run_point(path: &Path, config: &FrontierConfig) -> Result<RunPoint, SchemaError> {
    let log: RunLog = read_json(path)?;
    log.validate().map_err(|reason| SchemaError::invalid(path, reason))?;
    Ok(RunPoint::from_log(&file_stem(path), &log, config))
}

/// Load every `*.log` in `dir`, sorted by name. Malformed files are skipped
/// with a warning.
///
/// # Errors
///
/// Returns an error only if the directory pattern is invalid.
pub fn scan_run_logs(dir: &Path, config: &FrontierConfig) -> Result<Vec<RunPoint>, FrontierError> {
    let mut points = Vec::new();
    for path in files_with_extension(dir, "log")? {
        match load_run_point(&path, config) {
            Ok(point) => points.push(point),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping run log"),
        }
    }
    tracing::info!(runs = points.len(), dir = %dir.display(), "loaded run logs");
    Ok(points)
}

/// Add `num_gpus` to every `*.log` in `dir` that lacks it. The count comes
/// from the lookup table for the base model, else the configured default.
/// Files are rewritten atomically; empty, non-object or unreadable files are
/// skipped. Returns the number of files updated.
///
/// # Errors
///
/// Returns an error only if the directory pattern is invalid.
pub fn backfill_num_gpus(dir: &Path, config: &FrontierConfig) -> Result<usize, FrontierError> {
    let mut updated = 0;
    for path in files_with_extension(dir, "log")? {
        match backfill_file(&path, config) {
            Ok(Some(num_gpus)) => {
                updated += 1;
                if num_gpus > 1 {
                    tracing::info!(path = %path.display(), num_gpus, "backfilled num_gpus");
                } else {
                    tracing::debug!(path = %path.display(), num_gpus, "backfilled num_gpus");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping run log"),
        }
    }
    Ok(updated)
}

fn backfill_file(path: &Path, config: &FrontierConfig) -> Result<Option<u32>, SchemaError> {
    let raw = read_text(path)?;
    if raw.trim().is_empty() {
        tracing::debug!(path = %path.display(), "skip empty file");
        return Ok(None);
    }
    let mut data: serde_json::Value = serde_json::from_str(&raw).map_err(|source| SchemaError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let Some(object) = data.as_object_mut() else {
        tracing::debug!(path = %path.display(), "skip non-object json");
        return Ok(None);
    };
    if object.contains_key("num_gpus") {
        return Ok(None);
    }

    let base_id = base_model_id(&file_stem(path), &config.languages);
    let num_gpus = config.num_gpus_for(&base_id);
    object.insert("num_gpus".to_string(), num_gpus.into());
    write_json_atomic(path, &data)?;
    Ok(Some(num_gpus))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn point(id: &str, gpu_hours: f64, accuracy_pct: f64) -> RunPoint {
        RunPoint {
            id: id.to_string(),
            base_id: id.to_string(),
            lang: Some("en".to_string()),
            family: "other".to_string(),
            param_count_b: 0.0,
            accuracy_pct,
            duration_hours: gpu_hours,
            num_gpus: 1,
            gpu_hours,
        }
    }

    fn log(duration_s: f64, accuracy: f64, num_gpus: Option<u32>) -> RunLog {
        RunLog {
            duration_s,
            accuracy,
            num_gpus,
        }
    }

    #[test]
    fn test_dominance_strict_both_axes() {
        let cheap_good = point("a", 1.0, 90.0);
        let pricey_bad = point("b", 2.0, 80.0);
        assert!(cheap_good.dominates(&pricey_bad));
        assert!(!pricey_bad.dominates(&cheap_good));
    }

    #[test]
    fn test_dominance_ties_do_not_dominate() {
        let a = point("a", 1.0, 80.0);
        let same_cost = point("b", 1.0, 70.0);
        let same_acc = point("c", 2.0, 80.0);
        assert!(!a.dominates(&same_cost));
        assert!(!a.dominates(&same_acc));
        assert!(!a.dominates(&a.clone()));
    }

    #[test]
    fn test_three_run_case() {
        let points = vec![point("a", 1.0, 50.0), point("b", 2.0, 80.0), point("c", 3.0, 80.0)];
        // Equal accuracy at a higher cost is not dominated: both axes are strict
        assert_eq!(pareto_flags(&points), vec![true, true, true]);
    }

    #[test]
    fn test_three_run_case_with_accuracy_gap() {
        let points = vec![point("a", 1.0, 50.0), point("b", 2.0, 80.0), point("c", 3.0, 79.0)];
        assert_eq!(pareto_flags(&points), vec![true, true, false]);
    }

    #[test]
    fn test_cheapest_and_most_accurate_always_optimal() {
        let points = vec![
            point("mid", 5.0, 60.0),
            point("cheapest", 0.5, 10.0),
            point("best", 40.0, 95.0),
            point("waste", 30.0, 20.0),
        ];
        let flags = pareto_flags(&points);
        assert!(flags[1]);
        assert!(flags[2]);
        assert!(!flags[3]);
    }

    #[test]
    fn test_removing_dominated_point_keeps_optimal_set() {
        let points = vec![
            point("a", 1.0, 40.0),
            point("b", 2.0, 70.0),
            point("dominated", 3.0, 50.0),
            point("c", 4.0, 90.0),
        ];
        let flags = pareto_flags(&points);
        assert!(!flags[2]);

        let reduced: Vec<RunPoint> = points
            .iter()
            .filter(|p| p.id != "dominated")
            .cloned()
            .collect();
        let reduced_flags = pareto_flags(&reduced);
        let before: Vec<&str> = points
            .iter()
            .zip(&flags)
            .filter(|(_, &f)| f)
            .map(|(p, _)| p.id.as_str())
            .collect();
        let after: Vec<&str> = reduced
            .iter()
            .zip(&reduced_flags)
            .filter(|(_, &f)| f)
            .map(|(p, _)| p.id.as_str())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_from_log_default_multiplier() {
        let config = FrontierConfig::default();
        let p = RunPoint::from_log("qwen3:8b-en", &log(7200.0, 0.5, None), &config);
        assert_eq!(p.base_id, "qwen3:8b");
        assert_eq!(p.lang.as_deref(), Some("en"));
        assert_eq!(p.num_gpus, 1);
        assert_eq!(p.duration_hours, 2.0);
        assert_eq!(p.gpu_hours, 2.0);
        assert_eq!(p.accuracy_pct, 50.0);
        assert_eq!(p.family, "qwen");
        assert_eq!(p.param_count_b, 8.0);
    }

    #[test]
    fn test_gpu_hours_scale_with_multiplier() {
        let config = FrontierConfig::default();
        let one = RunPoint::from_log("m-en", &log(3600.0, 0.5, Some(1)), &config);
        let four = RunPoint::from_log("m-en", &log(3600.0, 0.5, Some(4)), &config);
        assert_eq!(four.gpu_hours, one.gpu_hours * 4.0);
        assert_eq!(four.duration_hours, one.duration_hours);
    }

    #[test]
    fn test_lookup_table_multiplier() {
        let config = FrontierConfig::default();
        let p = RunPoint::from_log("llama3.1:405b_no", &log(3600.0, 0.8, None), &config);
        assert_eq!(p.num_gpus, 4);
        assert_eq!(p.gpu_hours, 4.0);

        // A recorded count beats the table
        let p = RunPoint::from_log("llama3.1:405b_no", &log(3600.0, 0.8, Some(8)), &config);
        assert_eq!(p.num_gpus, 8);
    }

    #[test]
    fn test_unsuffixed_run_counts_toward_total_only() {
        let config = FrontierConfig::default();
        let points = vec![
            RunPoint::from_log("a-en", &log(3600.0, 0.5, None), &config),
            RunPoint::from_log("b-no", &log(7200.0, 0.6, None), &config),
            RunPoint::from_log("legacy", &log(3600.0, 0.9, None), &config),
        ];
        let report = FrontierReport::analyze(&points, &config.languages);

        assert_eq!(report.num_runs, 3);
        assert_eq!(report.total_gpu_hours, 4.0);
        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.group("en").unwrap().entries.len(), 1);
        assert!(report
            .groups
            .iter()
            .all(|g| g.entries.iter().all(|e| e.id != "legacy")));
    }

    #[test]
    fn test_groups_are_independent() {
        let mut en_cheap = point("x-en", 1.0, 90.0);
        en_cheap.lang = Some("en".to_string());
        let mut no_pricey = point("y-no", 5.0, 10.0);
        no_pricey.lang = Some("no".to_string());

        let report = FrontierReport::analyze(&[en_cheap, no_pricey], &["en", "no"]);
        // y-no would be dominated by x-en if they shared a group
        assert!(report.group("no").unwrap().entries[0].pareto_optimal);
    }

    #[test]
    fn test_group_sorted_by_gpu_hours() {
        let points = vec![point("c", 3.0, 90.0), point("a", 1.0, 50.0), point("b", 2.0, 70.0)];
        let group = FrontierGroup::build("en", &points).unwrap();
        let ids: Vec<&str> = group.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(group.optimal().count(), 3);
    }

    #[test]
    fn test_empty_group() {
        let err = FrontierGroup::build("en", &[]).unwrap_err();
        assert!(matches!(err, FrontierError::EmptyGroup(lang) if lang == "en"));
    }

    #[test]
    fn test_empty_groups_omitted() {
        let report = FrontierReport::analyze(&[point("a-en", 1.0, 1.0)], &["en", "no"]);
        assert_eq!(report.groups.len(), 1);
        assert!(report.group("no").is_none());
    }

    #[test]
    fn test_run_log_validate() {
        assert!(log(10.0, 0.5, None).validate().is_ok());
        assert!(log(-1.0, 0.5, None).validate().is_err());
        assert!(log(10.0, 1.5, None).validate().is_err());
        assert!(log(f64::NAN, 0.5, None).validate().is_err());
    }

    #[test]
    fn test_scan_skips_malformed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("qwen3:8b-en.log"),
            r#"{"duration_s": 3600, "accuracy": 0.7, "model": "qwen3:8b"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken-en.log"), "not json").unwrap();
        std::fs::write(dir.path().join("ungraded-en.log"), r#"{"duration_s": 10}"#).unwrap();
        std::fs::write(dir.path().join("qwen3:8b-en.json"), "[]").unwrap();

        let points = scan_run_logs(dir.path(), &FrontierConfig::default()).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, "qwen3:8b-en");
        assert!((points[0].accuracy_pct - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_backfill_num_gpus() {
        let dir = TempDir::new().unwrap();
        let big = dir.path().join("deepseek-r1:671b_en.log");
        let small = dir.path().join("qwen3:8b-no.log");
        let done = dir.path().join("gemma3:4b-en.log");
        let empty = dir.path().join("empty-en.log");
        let list = dir.path().join("list-en.log");
        std::fs::write(&big, r#"{"duration_s": 10}"#).unwrap();
        std::fs::write(&small, r#"{"duration_s": 10}"#).unwrap();
        std::fs::write(&done, r#"{"duration_s": 10, "num_gpus": 2}"#).unwrap();
        std::fs::write(&empty, "  \n").unwrap();
        std::fs::write(&list, "[1, 2]").unwrap();

        let updated = backfill_num_gpus(dir.path(), &FrontierConfig::default()).unwrap();
        assert_eq!(updated, 2);

        let big: serde_json::Value = read_json(&big).unwrap();
        assert_eq!(big["num_gpus"], 3);
        assert_eq!(big["duration_s"], 10);
        let small: serde_json::Value = read_json(&small).unwrap();
        assert_eq!(small["num_gpus"], 1);
        let done: serde_json::Value = read_json(&done).unwrap();
        assert_eq!(done["num_gpus"], 2);

        // Second pass has nothing left to do
        assert_eq!(backfill_num_gpus(dir.path(), &FrontierConfig::default()).unwrap(), 0);
    }

    #[test]
    fn test_backfill_custom_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("unknown-en.log");
        std::fs::write(&path, r#"{"duration_s": 10}"#).unwrap();

        let config = FrontierConfig {
            default_num_gpus: 2,
            ..FrontierConfig::default()
        };
        backfill_num_gpus(dir.path(), &config).unwrap();
        let value: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(value["num_gpus"], 2);
    }
}
