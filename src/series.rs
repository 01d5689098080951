//! Accuracy series for external chart renderers.
//!
//! Two views over graded run logs:
//! - a model x language accuracy matrix
//! - per-family series of accuracy by model size
//!
//! Values are percentages; a model with no run for a language reads as 0.

use crate::naming::{fold_all_gpus, split_model_lang, NameParser};
use crate::pareto::FrontierError;
use crate::schema::{file_stem, files_with_extension, read_json};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

/// Accuracy of one run, keyed by its file stem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAccuracy {
    pub id: String,
    /// Fraction in [0, 1]; 0 when the log carries none
    pub accuracy: f64,
}

#[derive(Debug, Deserialize)]
struct AccuracyLog {
    #[serde(default)]
    accuracy: f64,
}

/// Read the accuracy of every `*.log` in `dir`. Unreadable files are skipped
/// with a warning.
///
/// # Errors
///
/// Returns an error only if the directory pattern is invalid.
pub fn load_accuracies(dir: &Path) -> Result<Vec<RunAccuracy>, FrontierError> {
    let mut runs = Vec::new();
    for path in files_with_extension(dir, "log")? {
        match read_json::<AccuracyLog>(&path) {
            Ok(log) => runs.push(RunAccuracy {
                id: file_stem(&path),
                accuracy: log.accuracy,
            }),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not process file"),
        }
    }
    Ok(runs)
}

/// One model's accuracy per language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRow {
    pub model: String,
    pub accuracy_pct: BTreeMap<String, f64>,
}

/// Accuracy at one model size, per language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizePoint {
    pub billions: f64,
    pub label: String,
    pub accuracy_pct: BTreeMap<String, f64>,
}

/// One family's sizes in ascending order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySeries {
    pub family: String,
    pub points: Vec<SizePoint>,
}

/// Both views, ready to serialize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySeries {
    pub languages: Vec<String>,
    pub models: Vec<ModelRow>,
    pub families: Vec<FamilySeries>,
}

impl AccuracySeries {
    /// Build both views from run accuracies
    ///
    /// # Errors
    ///
    /// Returns `FrontierError::Regex` if the name patterns fail to compile.
    pub fn build<S: AsRef<str>>(runs: &[RunAccuracy], languages: &[S]) -> Result<Self, FrontierError> {
        let parser = NameParser::new()?;
        Ok(Self {
            languages: languages.iter().map(|l| l.as_ref().to_string()).collect(),
            models: accuracy_matrix(runs, languages),
            families: family_series(runs, languages, &parser),
        })
    }
}

fn fill_languages<S: AsRef<str>>(languages: &[S], found: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    languages
        .iter()
        .map(|lang| {
            let lang = lang.as_ref();
            (lang.to_string(), found.get(lang).copied().unwrap_or(0.0) * 100.0)
        })
        .collect()
}

/// Model x language matrix, models sorted by name. The all-GPUs marker is
/// folded into the base name, so such a run replaces the plain one.
#[must_use]
pub fn accuracy_matrix<S: AsRef<str>>(runs: &[RunAccuracy], languages: &[S]) -> Vec<ModelRow> {
    let mut models: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
    for run in runs {
        let Ok(name) = split_model_lang(&run.id, languages) else {
            tracing::warn!(run = %run.id, "skipping malformed log file name");
            continue;
        };
        models
            .entry(fold_all_gpus(&name.base_id))
            .or_default()
            .insert(name.lang, run.accuracy);
    }

    models
        .into_iter()
        .map(|(model, found)| ModelRow {
            accuracy_pct: fill_languages(languages, &found),
            model,
        })
        .collect()
}

/// Per-family size series, families sorted by name
#[must_use]
pub fn family_series<S: AsRef<str>>(
    runs: &[RunAccuracy],
    languages: &[S],
    parser: &NameParser,
) -> Vec<FamilySeries> {
    // family -> (size, label, lang, accuracy) in input order
    let mut families: BTreeMap<String, Vec<(f64, String, String, f64)>> = BTreeMap::new();
    for run in runs {
        let Ok(name) = split_model_lang(&run.id, languages) else {
            tracing::warn!(run = %run.id, "invalid name for log file");
            continue;
        };
        let Some(family) = parser.family(&name.base_id) else {
            continue;
        };
        let size = parser.model_size(&name.base_id);
        families
            .entry(family.to_string())
            .or_default()
            .push((size.billions, size.label, name.lang, run.accuracy));
    }

    families
        .into_iter()
        .map(|(family, entries)| {
            // Distinct sizes, first label seen wins
            let mut sizes: Vec<(f64, String)> = entries
                .iter()
                .map(|(billions, label, _, _)| (*billions, label.clone()))
                .collect();
            sizes.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
            sizes.dedup_by(|later, earlier| later.0 == earlier.0);

            let points = sizes
                .into_iter()
                .map(|(billions, label)| {
                    let found: BTreeMap<String, f64> = entries
                        .iter()
                        .filter(|(b, ..)| *b == billions)
                        .map(|(_, _, lang, accuracy)| (lang.clone(), *accuracy))
                        .collect();
                    SizePoint {
                        billions,
                        label,
                        accuracy_pct: fill_languages(languages, &found),
                    }
                })
                .collect();
            FamilySeries { family, points }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LANGS: [&str; 2] = ["en", "no"];

    fn acc(id: &str, accuracy: f64) -> RunAccuracy {
        RunAccuracy {
            id: id.to_string(),
            accuracy,
        }
    }

    #[test]
    fn test_matrix_fills_missing_with_zero() {
        let runs = vec![acc("qwen3:8b-en", 0.5), acc("qwen3:8b_no", 0.25), acc("gemma3:4b-en", 0.4)];
        let rows = accuracy_matrix(&runs, &LANGS);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].model, "gemma3:4b");
        assert_eq!(rows[0].accuracy_pct["en"], 40.0);
        assert_eq!(rows[0].accuracy_pct["no"], 0.0);
        assert_eq!(rows[1].accuracy_pct["no"], 25.0);
    }

    #[test]
    fn test_matrix_folds_all_gpus_and_skips_unparseable() {
        let runs = vec![acc("qwen3:235b-all-gpus-en", 0.8), acc("bare", 0.9)];
        let rows = accuracy_matrix(&runs, &LANGS);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].model, "qwen3:235b");
    }

    #[test]
    fn test_family_series_sorted_by_size() {
        let parser = NameParser::new().unwrap();
        let runs = vec![
            acc("qwen3:8b-en", 0.6),
            acc("qwen3:0.6b-en", 0.1),
            acc("qwen3:8b-no", 0.5),
            acc("gemma3:270m-en", 0.05),
        ];
        let series = family_series(&runs, &LANGS, &parser);

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].family, "gemma3");
        let qwen = &series[1];
        assert_eq!(qwen.family, "qwen3");
        let labels: Vec<&str> = qwen.points.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["0.6B", "8B"]);
        assert_eq!(qwen.points[1].accuracy_pct["en"], 60.0);
        assert_eq!(qwen.points[1].accuracy_pct["no"], 50.0);
        assert_eq!(qwen.points[0].accuracy_pct["no"], 0.0);
    }

    #[test]
    fn test_family_series_special_cases_stay_distinct() {
        let parser = NameParser::new().unwrap();
        let runs = vec![
            acc("mimir-mistral:7b-core-instruct-Q4-en", 0.3),
            acc("mimir-mistral:7b-core-scratch-instruct-Q4-en", 0.2),
        ];
        let series = family_series(&runs, &LANGS, &parser);
        assert_eq!(series[0].family, "mimir-mistral");
        assert_eq!(series[0].points.len(), 2);
        assert_eq!(series[0].points[0].label, "7B-core-scratch-instruct");
    }

    #[test]
    fn test_load_accuracies_defaults_missing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a-en.log"), r#"{"accuracy": 0.5}"#).unwrap();
        std::fs::write(dir.path().join("b-en.log"), r#"{"duration_s": 1}"#).unwrap();
        std::fs::write(dir.path().join("c-en.log"), "oops").unwrap();

        let runs = load_accuracies(dir.path()).unwrap();
        assert_eq!(runs, vec![acc("a-en", 0.5), acc("b-en", 0.0)]);
    }

    #[test]
    fn test_build_serializes() {
        let series = AccuracySeries::build(&[acc("qwen3:8b-en", 0.5)], &LANGS).unwrap();
        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(json["languages"][1], "no");
        assert_eq!(json["models"][0]["accuracy_pct"]["en"], 50.0);
        assert_eq!(json["families"][0]["points"][0]["label"], "8B");
    }
}
