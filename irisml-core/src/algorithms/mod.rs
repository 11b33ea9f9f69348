//! Classification algorithms.
//!
//! A single model family is implemented: L2-regularised multinomial logistic
//! regression, fitted with either L-BFGS or stochastic average gradient.

pub mod logistic;
pub mod solver;

pub use logistic::{FitOptions, FitOutcome, LogisticRegression, softmax};
pub use solver::{Solver, SolverReport};
