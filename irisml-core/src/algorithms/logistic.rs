//! Multinomial logistic regression.

use super::solver::{self, SoftmaxObjective, Solver, SolverReport};
use crate::data::Dataset;
use crate::error::IrisError;
use serde::{Deserialize, Serialize};

/// Inverse regularisation strength.
pub const DEFAULT_C: f64 = 1.0;

/// Stopping tolerance on the gradient (L-BFGS, Newton-CG) or relative step (SAG, SAGA).
pub const DEFAULT_TOL: f64 = 1e-4;

/// Hyperparameters for a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    pub solver: Solver,
    pub max_iter: usize,
    pub tol: f64,
    pub c: f64,
    /// Seed for solvers that sample.
    pub seed: u64,
}

impl FitOptions {
    pub fn new(solver: Solver, max_iter: usize, seed: u64) -> Self {
        Self {
            solver,
            max_iter,
            tol: DEFAULT_TOL,
            c: DEFAULT_C,
            seed,
        }
    }
}

impl Default for FitOptions {
    fn default() -> Self {
        Self::new(Solver::Lbfgs, 200, 42)
    }
}

/// A fitted linear softmax classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// `[n_classes][n_features]`
    coefficients: Vec<Vec<f64>>,
    /// One intercept per class.
    intercepts: Vec<f64>,
}

/// A fitted model together with how the optimiser fared.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub model: LogisticRegression,
    pub report: SolverReport,
}

impl LogisticRegression {
    pub fn new(coefficients: Vec<Vec<f64>>, intercepts: Vec<f64>) -> Result<Self, IrisError> {
        let model = Self {
            coefficients,
            intercepts,
        };
        model.check_shape()?;
        Ok(model)
    }

    /// Verify the parameter arrays are consistent. Used after deserialising.
    pub fn check_shape(&self) -> Result<(), IrisError> {
        if self.coefficients.len() < 2 {
            return Err(IrisError::model("a classifier needs at least two classes"));
        }
        if self.intercepts.len() != self.coefficients.len() {
            return Err(IrisError::model(format!(
                "{} coefficient rows but {} intercepts",
                self.coefficients.len(),
                self.intercepts.len()
            )));
        }
        let n_features = self.coefficients[0].len();
        if n_features == 0 || self.coefficients.iter().any(|row| row.len() != n_features) {
            return Err(IrisError::model("coefficient rows must share a non-zero width"));
        }
        Ok(())
    }

    /// Fit on `data`. Not converging within `max_iter` is logged, not an error.
    pub fn fit(data: &Dataset, options: &FitOptions) -> Result<FitOutcome, IrisError> {
        if data.is_empty() {
            return Err(IrisError::training("cannot fit on an empty dataset"));
        }
        if data.n_classes < 2 {
            return Err(IrisError::training("need at least two classes"));
        }
        if !(options.c > 0.0) {
            return Err(IrisError::training(format!("C must be positive, got {}", options.c)));
        }

        let objective = SoftmaxObjective::new(data, options.c);
        let (theta, report) = solver::minimize(
            options.solver,
            &objective,
            options.max_iter,
            options.tol,
            options.seed,
        );

        if !report.converged {
            tracing::warn!(
                solver = %report.solver,
                max_iter = options.max_iter,
                "Solver did not converge; increase max_iter"
            );
        }

        let n_features = data.features[0].len();
        let mut coefficients = Vec::with_capacity(data.n_classes);
        let mut intercepts = Vec::with_capacity(data.n_classes);
        for block in theta.chunks(n_features + 1) {
            coefficients.push(block[..n_features].to_vec());
            intercepts.push(block[n_features]);
        }

        Ok(FitOutcome {
            model: Self::new(coefficients, intercepts)?,
            report,
        })
    }

    pub fn n_classes(&self) -> usize {
        self.intercepts.len()
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.first().map_or(0, Vec::len)
    }

    pub fn coefficients(&self) -> &[Vec<f64>] {
        &self.coefficients
    }

    pub fn intercepts(&self) -> &[f64] {
        &self.intercepts
    }

    /// Per-class linear scores.
    pub fn decision_function(&self, x: &[f64]) -> Result<Vec<f64>, IrisError> {
        if x.len() != self.n_features() {
            return Err(IrisError::invalid_input(format!(
                "expected {} features, got {}",
                self.n_features(),
                x.len()
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(IrisError::invalid_input("features must be finite numbers"));
        }
        let scores: Vec<f64> = self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(w, b)| solver::dot(w, x) + b)
            .collect();
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(IrisError::model("non-finite decision scores"));
        }
        Ok(scores)
    }

    /// Class probability distribution (sums to one).
    pub fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>, IrisError> {
        Ok(softmax(&self.decision_function(x)?))
    }

    /// Most probable class index. Ties go to the lowest index.
    pub fn predict(&self, x: &[f64]) -> Result<usize, IrisError> {
        let scores = self.decision_function(x)?;
        let mut best = 0;
        for (k, s) in scores.iter().enumerate().skip(1) {
            if *s > scores[best] {
                best = k;
            }
        }
        Ok(best)
    }
}

/// Numerically stable softmax.
pub fn softmax(z: &[f64]) -> Vec<f64> {
    let max = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = z.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted_on_train_split(solver: Solver) -> FitOutcome {
        let (train, _) = Dataset::iris().train_test_split(0.2, 42).unwrap();
        LogisticRegression::fit(&train, &FitOptions::new(solver, 200, 42)).unwrap()
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1000.0, 999.0, -5.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[0] > p[1] && p[1] > p[2]);
    }

    #[test]
    fn test_new_rejects_bad_shapes() {
        assert!(LogisticRegression::new(vec![vec![1.0]], vec![0.0]).is_err());
        assert!(LogisticRegression::new(vec![vec![1.0], vec![1.0]], vec![0.0]).is_err());
        assert!(LogisticRegression::new(vec![vec![1.0], vec![1.0, 2.0]], vec![0.0, 0.0]).is_err());
        assert!(LogisticRegression::new(vec![vec![1.0], vec![2.0]], vec![0.0, 0.0]).is_ok());
    }

    #[test]
    fn test_predict_uses_highest_score() {
        let model = LogisticRegression::new(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.0, 0.0]],
            vec![0.0, 0.0, 0.5],
        )
        .unwrap();
        assert_eq!(model.predict(&[2.0, 0.0]).unwrap(), 0);
        assert_eq!(model.predict(&[0.0, 2.0]).unwrap(), 1);
        assert_eq!(model.predict(&[0.0, 0.0]).unwrap(), 2);
        assert!(model.predict(&[0.0]).is_err());
        assert!(model.predict(&[f64::NAN, 0.0]).is_err());
    }

    #[test]
    fn test_lbfgs_fit_on_iris() {
        let outcome = fitted_on_train_split(Solver::Lbfgs);
        assert!(outcome.report.converged);
        assert!(outcome.report.iterations <= 200);

        let model = &outcome.model;
        assert_eq!(model.n_classes(), 3);
        assert_eq!(model.n_features(), 4);

        let setosa = model.predict_proba(&[5.1, 3.5, 1.4, 0.2]).unwrap();
        assert_eq!(model.predict(&[5.1, 3.5, 1.4, 0.2]).unwrap(), 0);
        assert!(setosa[0] >= 0.9, "setosa probability {}", setosa[0]);

        assert_eq!(model.predict(&[6.7, 3.0, 5.2, 2.3]).unwrap(), 2);
        assert_eq!(model.predict(&[5.9, 3.0, 4.2, 1.5]).unwrap(), 1);
    }

    #[test]
    fn test_lbfgs_fit_is_deterministic() {
        let a = fitted_on_train_split(Solver::Lbfgs);
        let b = fitted_on_train_split(Solver::Lbfgs);
        assert_eq!(a.model, b.model);
    }

    #[test]
    fn test_sag_fit_on_iris() {
        let outcome = fitted_on_train_split(Solver::Sag);
        assert_eq!(outcome.report.solver, Solver::Sag);
        let model = &outcome.model;
        assert_eq!(model.predict(&[5.1, 3.5, 1.4, 0.2]).unwrap(), 0);
        assert_eq!(model.predict(&[6.7, 3.0, 5.2, 2.3]).unwrap(), 2);
    }

    #[test]
    fn test_overflowing_scores_are_a_model_error() {
        let outcome = fitted_on_train_split(Solver::Lbfgs);
        let x = [1e308; 4];
        let err = outcome.model.decision_function(&x).unwrap_err();
        assert!(matches!(err, IrisError::Model(_)), "{err:?}");
        assert!(err.to_string().contains("non-finite"));
        assert!(outcome.model.predict(&x).is_err());
        assert!(outcome.model.predict_proba(&x).is_err());
    }

    #[test]
    fn test_newton_cg_fit_on_iris() {
        let outcome = fitted_on_train_split(Solver::NewtonCg);
        assert_eq!(outcome.report.solver, Solver::NewtonCg);
        assert!(outcome.report.converged);
        assert!(outcome.report.iterations < 50);

        let model = &outcome.model;
        assert_eq!(model.predict(&[5.1, 3.5, 1.4, 0.2]).unwrap(), 0);
        assert_eq!(model.predict(&[6.7, 3.0, 5.2, 2.3]).unwrap(), 2);
        assert_eq!(model.predict(&[5.9, 3.0, 4.2, 1.5]).unwrap(), 1);
    }

    #[test]
    fn test_saga_fit_on_iris() {
        let outcome = fitted_on_train_split(Solver::Saga);
        assert_eq!(outcome.report.solver, Solver::Saga);
        let model = &outcome.model;
        assert_eq!(model.predict(&[5.1, 3.5, 1.4, 0.2]).unwrap(), 0);
        assert_eq!(model.predict(&[6.7, 3.0, 5.2, 2.3]).unwrap(), 2);
        assert_eq!(fitted_on_train_split(Solver::Saga).model, outcome.model);
    }

    #[test]
    fn test_fit_rejects_empty() {
        let empty = Dataset::new(vec![], vec![], 3).unwrap();
        assert!(LogisticRegression::fit(&empty, &FitOptions::default()).is_err());
    }
}
