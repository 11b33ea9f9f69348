//! Classification metrics.

use serde::{Deserialize, Serialize};

/// Held-out metrics logged for every run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    /// F1 averaged over classes, weighted by true-class support.
    pub f1_score: f64,
}

impl ClassificationMetrics {
    pub fn compute(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> Self {
        Self {
            accuracy: accuracy_score(y_true, y_pred),
            f1_score: f1_score_weighted(y_true, y_pred, n_classes),
        }
    }

    /// Key/value pairs as logged to the tracker.
    pub fn as_pairs(&self) -> Vec<(String, f64)> {
        vec![
            ("accuracy".to_string(), self.accuracy),
            ("f1_score".to_string(), self.f1_score),
        ]
    }
}

/// Fraction of exact matches. Empty input scores 0.
pub fn accuracy_score(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Support-weighted F1. Classes with no predicted or true samples contribute
/// an F1 of zero. Pairs whose true label is not below `n_classes` are skipped.
pub fn f1_score_weighted(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> f64 {
    let mut tp = vec![0usize; n_classes];
    let mut fp = vec![0usize; n_classes];
    let mut support = vec![0usize; n_classes];

    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t >= n_classes {
            continue;
        }
        support[t] += 1;
        if t == p {
            tp[t] += 1;
        } else if p < n_classes {
            fp[p] += 1;
        }
    }

    let total: usize = support.iter().sum();
    if total == 0 {
        return 0.0;
    }

    (0..n_classes)
        .map(|c| {
            let fn_ = support[c] - tp[c];
            let denom = 2 * tp[c] + fp[c] + fn_;
            let f1 = if denom == 0 {
                0.0
            } else {
                2.0 * tp[c] as f64 / denom as f64
            };
            f1 * support[c] as f64
        })
        .sum::<f64>()
        / total as f64
}
