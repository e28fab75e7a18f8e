// Copyright 2025 Alignmeter (https://github.com/alignmeter)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Confusion matrix and derived alignment metrics
//!
//! The evaluator under measurement is a binary classifier: it either fails an
//! example (flags the issue) or passes it. Human labels supply the ground
//! truth side. Beyond the raw counters this module derives the usual
//! threshold-free summary metrics, including the Matthews Correlation
//! Coefficient used as the headline alignment score.
//!
//! ## Why MCC?
//!
//! Accuracy and F1 can be misleading on imbalanced label sets. MCC ranges
//! [-1, +1] where 0 = no skill, and correctly penalizes evaluators that
//! ignore the minority class. The example selector keeps the two sides
//! balanced, but incremental merges can drift, so the robust score is kept.

use serde::{Deserialize, Serialize};

/// What the human label says the evaluator ought to do with an example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedSide {
    /// The span carries the issue; a well-aligned evaluator fails it.
    ShouldFail,
    /// The span is free of the issue; a well-aligned evaluator passes it.
    ShouldPass,
}

/// Pass/fail judgment produced by one dry-run of the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Four non-negative counters. Created at zero, fully replaced on a full
/// recalculation, additively merged on an incremental one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: u64,
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
}

impl ConfusionMatrix {
    pub fn total(&self) -> u64 {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    /// Classify one judged example into its cell.
    ///
    /// "Positive" means the evaluator flagged the issue (verdict Fail), so a
    /// should-fail example that fails is a true positive and a should-fail
    /// example that passes is a false negative.
    pub fn record(&mut self, expected: ExpectedSide, verdict: Verdict) {
        match (expected, verdict) {
            (ExpectedSide::ShouldFail, Verdict::Fail) => self.true_positives += 1,
            (ExpectedSide::ShouldFail, Verdict::Pass) => self.false_negatives += 1,
            (ExpectedSide::ShouldPass, Verdict::Pass) => self.true_negatives += 1,
            (ExpectedSide::ShouldPass, Verdict::Fail) => self.false_positives += 1,
        }
    }

    /// Additive merge used by incremental recalculation. Saturating so a
    /// corrupt counter can never wrap an otherwise-good record.
    pub fn merge(&self, other: &ConfusionMatrix) -> ConfusionMatrix {
        ConfusionMatrix {
            true_positives: self.true_positives.saturating_add(other.true_positives),
            true_negatives: self.true_negatives.saturating_add(other.true_negatives),
            false_positives: self.false_positives.saturating_add(other.false_positives),
            false_negatives: self.false_negatives.saturating_add(other.false_negatives),
        }
    }

    /// Derive the summary metrics from the counters.
    pub fn metrics(&self) -> AlignmentMetrics {
        let tp = self.true_positives as f64;
        let tn = self.true_negatives as f64;
        let fp = self.false_positives as f64;
        let fn_ = self.false_negatives as f64;
        let total = self.total() as f64;

        let accuracy = if total > 0.0 { (tp + tn) / total } else { 0.0 };
        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
        let specificity = if tn + fp > 0.0 { tn / (tn + fp) } else { 0.0 };

        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let mcc_num = tp * tn - fp * fn_;
        let mcc_denom = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
        let mcc = if mcc_denom > 0.0 {
            mcc_num / mcc_denom
        } else {
            0.0
        };

        AlignmentMetrics {
            accuracy,
            precision,
            recall,
            specificity,
            f1_score,
            mcc,
        }
    }
}

/// Summary metrics derived from a confusion matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub specificity: f64,
    pub f1_score: f64,
    /// Matthews Correlation Coefficient, the headline alignment score.
    pub mcc: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn judged(matrix: &mut ConfusionMatrix, cases: &[(ExpectedSide, Verdict)]) {
        for (expected, verdict) in cases {
            matrix.record(*expected, *verdict);
        }
    }

    #[test]
    fn test_perfect_alignment() {
        let mut m = ConfusionMatrix::default();
        judged(
            &mut m,
            &[
                (ExpectedSide::ShouldFail, Verdict::Fail),
                (ExpectedSide::ShouldFail, Verdict::Fail),
                (ExpectedSide::ShouldPass, Verdict::Pass),
                (ExpectedSide::ShouldPass, Verdict::Pass),
            ],
        );

        assert_eq!(m.true_positives, 2);
        assert_eq!(m.true_negatives, 2);
        assert_eq!(m.false_positives, 0);
        assert_eq!(m.false_negatives, 0);

        let metrics = m.metrics();
        assert!((metrics.accuracy - 1.0).abs() < 1e-9);
        assert!((metrics.mcc - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_skill_evaluator() {
        // Fails everything regardless of label.
        let mut m = ConfusionMatrix::default();
        judged(
            &mut m,
            &[
                (ExpectedSide::ShouldFail, Verdict::Fail),
                (ExpectedSide::ShouldFail, Verdict::Fail),
                (ExpectedSide::ShouldPass, Verdict::Fail),
                (ExpectedSide::ShouldPass, Verdict::Fail),
            ],
        );

        let metrics = m.metrics();
        // Recall is perfect but the correlation score shows no skill.
        assert!((metrics.recall - 1.0).abs() < 1e-9);
        assert!(metrics.mcc.abs() < 1e-9);
    }

    #[test]
    fn test_merge_is_additive() {
        let a = ConfusionMatrix {
            true_positives: 1,
            true_negatives: 3,
            false_positives: 0,
            false_negatives: 2,
        };
        let b = ConfusionMatrix {
            true_positives: 2,
            true_negatives: 1,
            false_positives: 1,
            false_negatives: 0,
        };

        let merged = a.merge(&b);
        assert_eq!(merged.true_positives, 3);
        assert_eq!(merged.true_negatives, 4);
        assert_eq!(merged.false_positives, 1);
        assert_eq!(merged.false_negatives, 2);
        assert_eq!(merged.total(), 10);
    }

    #[test]
    fn test_merge_saturates() {
        let a = ConfusionMatrix {
            true_positives: u64::MAX,
            ..Default::default()
        };
        let b = ConfusionMatrix {
            true_positives: 1,
            ..Default::default()
        };
        assert_eq!(a.merge(&b).true_positives, u64::MAX);
    }

    #[test]
    fn test_empty_matrix_metrics_are_zero() {
        let metrics = ConfusionMatrix::default().metrics();
        assert_eq!(metrics.accuracy, 0.0);
        assert_eq!(metrics.mcc, 0.0);
    }
}
