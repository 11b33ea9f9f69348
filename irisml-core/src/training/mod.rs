//! Training infrastructure: run parameters and evaluation metrics.

pub mod metrics;
pub mod params;

pub use metrics::{ClassificationMetrics, accuracy_score, f1_score_weighted};
pub use params::TrainingParams;
