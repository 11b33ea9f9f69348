//! Hyperparameters recorded with every training run.

use crate::algorithms::{FitOptions, Solver};
use serde::{Deserialize, Serialize};

/// The parameters a run is tracked under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub max_iter: usize,
    pub random_state: u64,
    pub solver: Solver,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            max_iter: 200,
            random_state: 42,
            solver: Solver::Lbfgs,
        }
    }
}

impl TrainingParams {
    pub fn fit_options(&self) -> FitOptions {
        FitOptions::new(self.solver, self.max_iter, self.random_state)
    }

    /// Key/value pairs as logged to the tracker.
    pub fn as_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("max_iter".to_string(), self.max_iter.to_string()),
            ("random_state".to_string(), self.random_state.to_string()),
            ("solver".to_string(), self.solver.to_string()),
        ]
    }
}
