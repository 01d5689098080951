//! Report generation for comparison and frontier results.
//!
//! Renders:
//! - McNemar comparisons as text, markdown, JSON and an appendable CSV row
//! - Pareto frontiers per language as text, markdown and JSON

use crate::comparator::{McNemarResult, Verdict};
use crate::pareto::{FrontierGroup, FrontierReport};
use serde::Serialize;
use std::fmt::Write as FmtWrite;
use std::path::Path;
use tabled::{Table, Tabled};
use thiserror::Error;

/// Errors that can occur while writing a report
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Markdown,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format: {other}")),
        }
    }
}

const RULE: &str = "───────────────────────────────────────────────────────────────";

/// One appended CSV line
#[derive(Debug, Serialize)]
struct McNemarCsvRow<'a> {
    model1: &'a str,
    model2: &'a str,
    a: usize,
    b: usize,
    c: usize,
    d: usize,
    total: usize,
    chi_squared: String,
    p_value: String,
    significant: &'static str,
}

impl<'a> From<&'a McNemarResult> for McNemarCsvRow<'a> {
    fn from(result: &'a McNemarResult) -> Self {
        Self {
            model1: &result.model1,
            model2: &result.model2,
            a: result.a,
            b: result.b,
            c: result.c,
            d: result.d,
            total: result.total,
            chi_squared: format!("{:.3}", result.chi_squared),
            p_value: format!("{:.4}", result.p_value),
            significant: if result.significant { "yes" } else { "no" },
        }
    }
}

/// Append a comparison to a CSV file, writing the header only when the file
/// is new or empty
///
/// # Errors
///
/// Returns an error if the file cannot be opened or written.
pub fn append_mcnemar_csv(path: &Path, result: &McNemarResult) -> Result<(), ReportError> {
    let needs_header = std::fs::metadata(path).map_or(true, |m| m.len() == 0);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    writer.serialize(McNemarCsvRow::from(result))?;
    writer.flush()?;
    Ok(())
}

impl McNemarResult {
    /// One-line verdict
    #[must_use]
    pub fn verdict_line(&self) -> String {
        match (self.verdict, self.winner()) {
            (Verdict::Indistinguishable, _) | (_, None) => {
                "not statistically significant, basically the same".to_string()
            }
            (_, Some(winner)) => format!("statistically significant (p<0.05) - {winner} is better"),
        }
    }

    /// Render as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Render as plain text
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut output = String::new();

        writeln!(output, "comparing {} vs {}", self.model1, self.model2).ok();
        writeln!(output, "{RULE}").ok();
        writeln!(output, "  both correct:        {}", self.a).ok();
        writeln!(output, "  m1 right, m2 wrong:  {}", self.b).ok();
        writeln!(output, "  m1 wrong, m2 right:  {}", self.c).ok();
        writeln!(output, "  both wrong:          {}", self.d).ok();
        writeln!(output, "  total:               {}", self.total).ok();
        writeln!(output).ok();
        writeln!(output, "  chi-squared: {:.3}", self.chi_squared).ok();
        writeln!(output, "  p-value:     {:.4}", self.p_value).ok();
        writeln!(output).ok();
        writeln!(output, "{}", self.verdict_line()).ok();

        if let Some((first, second)) = self.audit.truncated_from {
            writeln!(output, "warning: result count mismatch: {first} vs {second}").ok();
        }
        if !self.audit.identity_mismatches.is_empty() {
            writeln!(
                output,
                "warning: {} question_num mismatches tolerated (relaxed alignment)",
                self.audit.identity_mismatches.len()
            )
            .ok();
        }

        output
    }

    /// Render as markdown
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        writeln!(output, "## {} vs {}", self.model1, self.model2).ok();
        writeln!(output).ok();
        writeln!(output, "| | {} right | {} wrong |", self.model2, self.model2).ok();
        writeln!(output, "|---|---|---|").ok();
        writeln!(output, "| **{} right** | {} | {} |", self.model1, self.a, self.b).ok();
        writeln!(output, "| **{} wrong** | {} | {} |", self.model1, self.c, self.d).ok();
        writeln!(output).ok();
        writeln!(
            output,
            "**chi-squared:** {:.3} | **p-value:** {:.4} | **significant:** {}",
            self.chi_squared,
            self.p_value,
            if self.significant { "Yes" } else { "No" }
        )
        .ok();
        writeln!(output).ok();
        writeln!(output, "{}", self.verdict_line()).ok();

        output
    }
}

/// Table row for frontier output
#[derive(Tabled)]
struct FrontierTableRow {
    #[tabled(rename = "Run")]
    id: String,
    #[tabled(rename = "Family")]
    family: String,
    #[tabled(rename = "Params (B)")]
    params: String,
    #[tabled(rename = "GPUs")]
    num_gpus: u32,
    #[tabled(rename = "GPU-hours")]
    gpu_hours: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "Pareto")]
    pareto: String,
}

fn group_rows(group: &FrontierGroup) -> Vec<FrontierTableRow> {
    group
        .entries
        .iter()
        .map(|e| FrontierTableRow {
            id: e.id.clone(),
            family: e.family.clone(),
            params: if e.param_count_b > 0.0 {
                format!("{}", e.param_count_b)
            } else {
                "-".to_string()
            },
            num_gpus: e.num_gpus,
            gpu_hours: format!("{:.3}", e.gpu_hours),
            accuracy: format!("{:.1}%", e.accuracy_pct),
            pareto: if e.pareto_optimal { "✓" } else { "" }.to_string(),
        })
        .collect()
}

impl FrontierReport {
    /// Render as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Render as plain text tables, one per language
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut output = String::new();

        for group in &self.groups {
            writeln!(output, "PARETO FRONTIER ({})", group.lang.to_uppercase()).ok();
            writeln!(output, "{RULE}").ok();
            writeln!(output, "{}", Table::new(group_rows(group))).ok();
            let optimal: Vec<&str> = group.optimal().map(|e| e.id.as_str()).collect();
            writeln!(output, "  optimal: {}", optimal.join(", ")).ok();
            writeln!(output).ok();
        }

        writeln!(output, "  runs loaded:     {}", self.num_runs).ok();
        writeln!(output, "  total GPU-hours: {:.2}", self.total_gpu_hours).ok();
        output
    }

    /// Render as markdown
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        writeln!(output, "# Pareto Frontier: Accuracy vs GPU-hours").ok();
        writeln!(output).ok();

        for group in &self.groups {
            writeln!(output, "## {}", group.lang).ok();
            writeln!(output).ok();
            writeln!(output, "| Run | GPUs | GPU-hours | Accuracy | Pareto |").ok();
            writeln!(output, "|-----|------|-----------|----------|--------|").ok();
            for e in &group.entries {
                writeln!(
                    output,
                    "| {} | {} | {:.3} | {:.1}% | {} |",
                    e.id,
                    e.num_gpus,
                    e.gpu_hours,
                    e.accuracy_pct,
                    if e.pareto_optimal { "Yes" } else { "No" }
                )
                .ok();
            }
            writeln!(output).ok();
        }

        writeln!(
            output,
            "**Total GPU-hours ({} runs):** {:.2}",
            self.num_runs, self.total_gpu_hours
        )
        .ok();
        output
    }

    /// Render in the chosen format
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render(&self, format: ReportFormat) -> Result<String, serde_json::Error> {
        match format {
            ReportFormat::Text => Ok(self.to_text()),
            ReportFormat::Markdown => Ok(self.to_markdown()),
            ReportFormat::Json => self.to_json(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::comparator::{AlignmentAudit, Comparator, ContingencyTable};
    use crate::pareto::RunPoint;
    use tempfile::TempDir;

    fn comparison(b: usize, c: usize) -> McNemarResult {
        Comparator::default().evaluate(
            "qwen3:8b-en",
            "gemma3:4b-en",
            ContingencyTable { a: 5, b, c, d: 3 },
            AlignmentAudit::default(),
        )
    }

    fn frontier() -> FrontierReport {
        let points: Vec<RunPoint> = [("a-en", 1.0, 50.0), ("b-en", 2.0, 80.0), ("c-en", 3.0, 70.0)]
            .into_iter()
            .map(|(id, gpu_hours, accuracy_pct)| RunPoint {
                id: id.to_string(),
                base_id: id.trim_end_matches("-en").to_string(),
                lang: Some("en".to_string()),
                family: "other".to_string(),
                param_count_b: 0.0,
                accuracy_pct,
                duration_hours: gpu_hours,
                num_gpus: 1,
                gpu_hours,
            })
            .collect();
        FrontierReport::analyze(&points, &["en", "no"])
    }

    #[test]
    fn test_report_format_from_str() {
        assert_eq!("md".parse::<ReportFormat>().unwrap(), ReportFormat::Markdown);
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("pdf".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_verdict_line() {
        assert!(comparison(10, 2).verdict_line().contains("qwen3:8b-en is better"));
        assert!(comparison(2, 10).verdict_line().contains("gemma3:4b-en is better"));
        assert!(comparison(1, 1).verdict_line().contains("basically the same"));
    }

    #[test]
    fn test_comparison_to_text() {
        let text = comparison(10, 2).to_text();
        assert!(text.contains("comparing qwen3:8b-en vs gemma3:4b-en"));
        assert!(text.contains("chi-squared: 4.083"));
        assert!(!text.contains("warning"));
    }

    #[test]
    fn test_comparison_to_text_reports_truncation() {
        let mut result = comparison(1, 1);
        result.audit.truncated_from = Some((10, 8));
        assert!(result.to_text().contains("mismatch: 10 vs 8"));
    }

    #[test]
    fn test_comparison_to_markdown_and_json() {
        let result = comparison(10, 2);
        assert!(result.to_markdown().contains("**significant:** Yes"));
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["b"], 10);
        assert_eq!(json["verdict"], "first_better");
    }

    #[test]
    fn test_append_mcnemar_csv_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mcnemar_results.csv");

        append_mcnemar_csv(&path, &comparison(10, 2)).unwrap();
        append_mcnemar_csv(&path, &comparison(1, 1)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "model1,model2,a,b,c,d,total,chi_squared,p_value,significant"
        );
        assert_eq!(lines[1], "qwen3:8b-en,gemma3:4b-en,5,10,2,3,20,4.083,0.0433,yes");
        assert!(lines[2].ends_with(",0.500,0.4795,no"));
    }

    #[test]
    fn test_frontier_to_text() {
        let text = frontier().to_text();
        assert!(text.contains("PARETO FRONTIER (EN)"));
        assert!(text.contains("optimal: a-en, b-en"));
        assert!(text.contains("total GPU-hours: 6.00"));
        assert!(!text.contains("(NO)"));
    }

    #[test]
    fn test_frontier_to_markdown() {
        let markdown = frontier().to_markdown();
        assert!(markdown.contains("## en"));
        assert!(markdown.contains("| c-en | 1 | 3.000 | 70.0% | No |"));
        assert!(markdown.contains("**Total GPU-hours (3 runs):** 6.00"));
    }

    #[test]
    fn test_frontier_render_json() {
        let json = frontier().render(ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["groups"][0]["entries"][0]["id"], "a-en");
        assert_eq!(value["total_gpu_hours"], 6.0);
    }
}
