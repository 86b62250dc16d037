//! L2-regularized logistic regression fitted by batch gradient descent
//!
//! Features are standardized internally; the stored coefficients apply to the
//! standardized space, so the scaler travels with the weights.

use serde::{Deserialize, Serialize};

/// Hyperparameters for [`LogisticRegression`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    pub max_iter: usize,
    pub learning_rate: f64,
    /// Inverse regularization strength
    pub c: f64,
    pub tolerance: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            learning_rate: 0.5,
            c: 1.0,
            tolerance: 1e-6,
        }
    }
}

/// Fitted logistic regression parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub weights: Vec<f64>,
    pub intercept: f64,
    pub iterations: usize,
}

impl LogisticRegression {
    /// Fit on validated, non-empty data with binary labels
    pub fn fit(rows: &[Vec<f64>], labels: &[u8], params: &LogisticParams) -> Self {
        let n = rows.len().max(1) as f64;
        let d = rows.first().map(Vec::len).unwrap_or(0);
        let (means, scales) = standardizer(rows, d);

        let x: Vec<Vec<f64>> = rows
            .iter()
            .map(|r| standardize(r, &means, &scales))
            .collect();
        let y: Vec<f64> = labels.iter().map(|&l| f64::from(l)).collect();

        let lambda = if params.c > 0.0 { 1.0 / (params.c * n) } else { 0.0 };
        let mut weights = vec![0.0; d];
        let mut intercept = 0.0;
        let mut iterations = 0;

        for iter in 0..params.max_iter {
            iterations = iter + 1;
            let mut grad_w = vec![0.0; d];
            let mut grad_b = 0.0;

            for (xi, &yi) in x.iter().zip(&y) {
                let err = sigmoid(dot(&weights, xi) + intercept) - yi;
                for (g, &v) in grad_w.iter_mut().zip(xi) {
                    *g += err * v;
                }
                grad_b += err;
            }

            let mut max_step: f64 = 0.0;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                let step = params.learning_rate * (g / n + lambda * *w);
                *w -= step;
                max_step = max_step.max(step.abs());
            }
            let step_b = params.learning_rate * grad_b / n;
            intercept -= step_b;
            max_step = max_step.max(step_b.abs());

            if max_step < params.tolerance {
                break;
            }
        }

        Self {
            means,
            scales,
            weights,
            intercept,
            iterations,
        }
    }

    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter()
            .map(|r| {
                let z = standardize(r, &self.means, &self.scales);
                sigmoid(dot(&self.weights, &z) + self.intercept)
            })
            .collect()
    }
}

fn standardizer(rows: &[Vec<f64>], d: usize) -> (Vec<f64>, Vec<f64>) {
    let n = rows.len().max(1) as f64;
    let mut means = vec![0.0; d];
    for row in rows {
        for (m, v) in means.iter_mut().zip(row) {
            *m += v;
        }
    }
    means.iter_mut().for_each(|m| *m /= n);

    let mut scales = vec![0.0; d];
    for row in rows {
        for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
            *s += (v - m).powi(2);
        }
    }
    // Constant columns keep a unit scale
    for s in scales.iter_mut() {
        let var = *s / n;
        *s = if var > 0.0 { var.sqrt() } else { 1.0 };
    }
    (means, scales)
}

fn standardize(row: &[f64], means: &[f64], scales: &[f64]) -> Vec<f64> {
    row.iter()
        .zip(means)
        .zip(scales)
        .map(|((v, m), s)| (v - m) / s)
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
