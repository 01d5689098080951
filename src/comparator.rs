//! Paired comparison of two graded result sets.
//!
//! Builds the 2x2 contingency table of per-question match outcomes and runs
//! McNemar's test with continuity correction:
//!
//! ```text
//! chi_sq = (|b - c| - 1)^2 / (b + c)      (0 when b + c == 0)
//! p      = 1 - F_chi2(chi_sq; df = 1)
//! ```
//!
//! The null hypothesis is rejected when `p < alpha` (0.05 by default); the
//! side with the larger discordant count is then reported as the winner.

use crate::grading::{GradedItem, GradedResults};
use crate::schema::SchemaError;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use thiserror::Error;

/// Default significance threshold
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Errors that can occur during a comparison
#[derive(Error, Debug)]
pub enum CompareError {
    #[error("question_num mismatch at position {position}: {first:?} vs {second:?}")]
    Alignment {
        position: usize,
        first: Option<u64>,
        second: Option<u64>,
    },

    #[error("no paired items to compare")]
    EmptyInput,

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// How aligned positions are checked against each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    /// Identity mismatch at any position fails the comparison
    #[default]
    Strict,
    /// Pair purely by position; identity mismatches are logged and counted.
    /// Only meant for concatenations of several subsets where ids repeat.
    Relaxed,
}

/// Paired outcome counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContingencyTable {
    /// Both match
    pub a: usize,
    /// First matches, second does not
    pub b: usize,
    /// First does not, second matches
    pub c: usize,
    /// Neither matches
    pub d: usize,
}

impl ContingencyTable {
    /// Count one pair of outcomes
    pub fn record(&mut self, first: bool, second: bool) {
        match (first, second) {
            (true, true) => self.a += 1,
            (true, false) => self.b += 1,
            (false, true) => self.c += 1,
            (false, false) => self.d += 1,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.a + self.b + self.c + self.d
    }

    /// Number of discordant pairs
    #[must_use]
    pub const fn discordant(&self) -> usize {
        self.b + self.c
    }
}

/// McNemar chi-squared statistic with continuity correction
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mcnemar_statistic(b: usize, c: usize) -> f64 {
    if b + c == 0 {
        return 0.0;
    }
    let diff = b.abs_diff(c) as f64;
    (diff - 1.0).powi(2) / (b + c) as f64
}

/// Upper tail of the chi-squared distribution with one degree of freedom
#[must_use]
pub fn mcnemar_p_value(chi_squared: f64) -> f64 {
    ChiSquared::new(1.0).map_or(1.0, |dist| 1.0 - dist.cdf(chi_squared))
}

/// Outcome of the significance decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Not significant
    Indistinguishable,
    /// Significant, first set owns more discordant matches (`b > c`)
    FirstBetter,
    /// Significant, second set wins
    SecondBetter,
}

/// Identity mismatch tolerated under relaxed alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityMismatch {
    pub position: usize,
    pub first: u64,
    pub second: u64,
}

/// What alignment had to do to pair the inputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentAudit {
    /// Mode the comparison ran under
    pub mode: AlignmentMode,
    /// Original lengths when they differed and were truncated
    pub truncated_from: Option<(usize, usize)>,
    /// Mismatches tolerated in relaxed mode
    pub identity_mismatches: Vec<IdentityMismatch>,
}

/// McNemar comparison record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McNemarResult {
    pub model1: String,
    pub model2: String,
    pub a: usize,
    pub b: usize,
    pub c: usize,
    pub d: usize,
    pub total: usize,
    pub chi_squared: f64,
    pub p_value: f64,
    pub significant: bool,
    pub verdict: Verdict,
    #[serde(default)]
    pub audit: AlignmentAudit,
}

impl McNemarResult {
    /// Contingency table of this result
    #[must_use]
    pub const fn table(&self) -> ContingencyTable {
        ContingencyTable {
            a: self.a,
            b: self.b,
            c: self.c,
            d: self.d,
        }
    }

    /// Label of the winning side, if the difference is significant
    #[must_use]
    pub fn winner(&self) -> Option<&str> {
        match self.verdict {
            Verdict::FirstBetter => Some(&self.model1),
            Verdict::SecondBetter => Some(&self.model2),
            Verdict::Indistinguishable => None,
        }
    }
}

/// Paired-outcome comparator
#[derive(Debug, Clone)]
pub struct Comparator {
    mode: AlignmentMode,
    alpha: f64,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(AlignmentMode::Strict)
    }
}

impl Comparator {
    #[must_use]
    pub const fn new(mode: AlignmentMode) -> Self {
        Self {
            mode,
            alpha: DEFAULT_ALPHA,
        }
    }

    /// Override the significance threshold
    #[must_use]
    pub const fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    #[must_use]
    pub const fn mode(&self) -> AlignmentMode {
        self.mode
    }

    /// Pair two item sequences and count outcomes
    ///
    /// # Errors
    ///
    /// Returns `CompareError::Alignment` on an identity mismatch in strict
    /// mode, `CompareError::EmptyInput` when nothing can be paired.
    pub fn contingency(
        &self,
        first: &[GradedItem],
        second: &[GradedItem],
    ) -> Result<(ContingencyTable, AlignmentAudit), CompareError> {
        let mut audit = AlignmentAudit {
            mode: self.mode,
            ..AlignmentAudit::default()
        };

        let len = first.len().min(second.len());
        if first.len() != second.len() {
            tracing::warn!(
                first = first.len(),
                second = second.len(),
                truncated_to = len,
                "result count mismatch, truncating to the shorter input"
            );
            audit.truncated_from = Some((first.len(), second.len()));
        }
        if len == 0 {
            return Err(CompareError::EmptyInput);
        }

        let mut table = ContingencyTable::default();
        for (position, (q1, q2)) in first.iter().zip(second).take(len).enumerate() {
            match self.mode {
                AlignmentMode::Strict => {
                    if q1.question_num != q2.question_num {
                        return Err(CompareError::Alignment {
                            position,
                            first: q1.question_num,
                            second: q2.question_num,
                        });
                    }
                }
                AlignmentMode::Relaxed => {
                    if let (Some(k1), Some(k2)) = (q1.question_num, q2.question_num) {
                        if k1 != k2 {
                            tracing::warn!(
                                position,
                                first = k1,
                                second = k2,
                                "question_num mismatch tolerated under relaxed alignment"
                            );
                            audit.identity_mismatches.push(IdentityMismatch {
                                position,
                                first: k1,
                                second: k2,
                            });
                        }
                    }
                }
            }
            table.record(q1.grade.is_match(), q2.grade.is_match());
        }

        Ok((table, audit))
    }

    /// Compare two labelled result sets
    ///
    /// # Errors
    ///
    /// See [`Self::contingency`].
    pub fn compare(
        &self,
        first: &GradedResults,
        second: &GradedResults,
    ) -> Result<McNemarResult, CompareError> {
        let (table, audit) = self.contingency(&first.items, &second.items)?;
        Ok(self.evaluate(&first.label, &second.label, table, audit))
    }

    /// Run the test on an already-built table
    #[must_use]
    pub fn evaluate(
        &self,
        model1: &str,
        model2: &str,
        table: ContingencyTable,
        audit: AlignmentAudit,
    ) -> McNemarResult {
        let chi_squared = mcnemar_statistic(table.b, table.c);
        let p_value = mcnemar_p_value(chi_squared);
        let significant = p_value < self.alpha;
        let verdict = match (significant, table.b > table.c) {
            (false, _) => Verdict::Indistinguishable,
            (true, true) => Verdict::FirstBetter,
            (true, false) => Verdict::SecondBetter,
        };

        McNemarResult {
            model1: model1.to_string(),
            model2: model2.to_string(),
            a: table.a,
            b: table.b,
            c: table.c,
            d: table.d,
            total: table.total(),
            chi_squared,
            p_value,
            significant,
            verdict,
            audit,
        }
    }
}
