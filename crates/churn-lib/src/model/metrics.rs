//! Binary classification metrics

use serde::{Deserialize, Serialize};

/// Counts of predicted vs. actual labels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(actual: &[u8], predicted: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&a, &p) in actual.iter().zip(predicted) {
            match (a, p) {
                (1, 1) => cm.true_positives += 1,
                (0, 1) => cm.false_positives += 1,
                (1, _) => cm.false_negatives += 1,
                _ => cm.true_negatives += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }
}

/// Held-out evaluation of a fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// Absent when the evaluation set holds a single class
    pub roc_auc: Option<f64>,
    pub confusion_matrix: ConfusionMatrix,
    pub samples: usize,
}

impl EvaluationMetrics {
    /// Score hard predictions and probabilities against the true labels
    pub fn compute(actual: &[u8], predicted: &[u8], probabilities: &[f64]) -> Self {
        let cm = ConfusionMatrix::from_labels(actual, predicted);
        let tp = cm.true_positives as f64;

        let accuracy = ratio(tp + cm.true_negatives as f64, cm.total() as f64);
        let precision = ratio(tp, tp + cm.false_positives as f64);
        let recall = ratio(tp, tp + cm.false_negatives as f64);
        let f1_score = ratio(2.0 * precision * recall, precision + recall);

        Self {
            accuracy,
            precision,
            recall,
            f1_score,
            roc_auc: roc_auc(actual, probabilities),
            confusion_matrix: cm,
            samples: actual.len(),
        }
    }
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged
pub fn roc_auc(actual: &[u8], scores: &[f64]) -> Option<f64> {
    let n_pos = actual.iter().filter(|&&y| y == 1).count();
    let n_neg = actual.len() - n_pos;
    if n_pos == 0 || n_neg == 0 || scores.len() != actual.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based average rank of the tie group
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = actual
        .iter()
        .zip(&ranks)
        .filter(|(&y, _)| y == 1)
        .map(|(_, &r)| r)
        .sum();
    let n_pos = n_pos as f64;
    let u = pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    Some(u / (n_pos * n_neg as f64))
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
