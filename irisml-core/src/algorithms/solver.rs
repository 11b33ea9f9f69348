//! Optimisers for the softmax cross-entropy objective.
//!
//! Parameters are a flat vector of `n_classes` blocks, each holding
//! `n_features` coefficients followed by the class intercept. The objective is
//!
//! ```text
//! f(θ) = mean_i CE(softmax(W x_i + b), y_i) + ||W||² / (2 C n)
//! ```
//!
//! which has the same minimiser as `C · Σ CE + ||W||² / 2`. Intercepts are not
//! penalised.
//!
//! `lbfgs` and `newton-cg` are full-batch. `sag` and `saga` draw one sample at
//! a time, uniformly with replacement, from a seeded [`StdRng`].

use crate::data::Dataset;
use crate::error::IrisError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

const LBFGS_MEMORY: usize = 10;
const ARMIJO_C1: f64 = 1e-4;
const MAX_LINE_SEARCH_STEPS: usize = 40;
const CURVATURE_EPS: f64 = 1e-10;
const MAX_CG_ITERATIONS: usize = 200;

/// Optimisation algorithm used to fit the classifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Solver {
    /// Limited-memory BFGS with a backtracking Armijo line search.
    #[default]
    Lbfgs,
    /// Newton steps solved by conjugate gradient on Hessian-vector products.
    NewtonCg,
    /// Stochastic average gradient.
    Sag,
    /// SAGA: the unbiased variant of SAG.
    Saga,
}

impl Solver {
    pub const SUPPORTED: [&'static str; 4] = ["lbfgs", "newton-cg", "sag", "saga"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lbfgs => "lbfgs",
            Self::NewtonCg => "newton-cg",
            Self::Sag => "sag",
            Self::Saga => "saga",
        }
    }
}

impl fmt::Display for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Solver {
    type Err = IrisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lbfgs" => Ok(Self::Lbfgs),
            "newton-cg" | "newton_cg" => Ok(Self::NewtonCg),
            "sag" => Ok(Self::Sag),
            "saga" => Ok(Self::Saga),
            "liblinear" => Err(IrisError::invalid_input(format!(
                "solver 'liblinear' fits one-vs-rest binary models, not a multinomial one \
                 (expected one of: {})",
                Self::SUPPORTED.join(", ")
            ))),
            other => Err(IrisError::invalid_input(format!(
                "unsupported solver '{other}' (expected one of: {})",
                Self::SUPPORTED.join(", ")
            ))),
        }
    }
}

/// Outcome of an optimisation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverReport {
    pub solver: Solver,
    pub iterations: usize,
    pub converged: bool,
    pub final_loss: f64,
}

/// Regularised softmax cross-entropy over a dataset.
pub(crate) struct SoftmaxObjective<'a> {
    data: &'a Dataset,
    n_features: usize,
    alpha: f64,
}

impl<'a> SoftmaxObjective<'a> {
    pub(crate) fn new(data: &'a Dataset, c: f64) -> Self {
        let n_features = data.features.first().map_or(0, |row| row.len());
        Self {
            data,
            n_features,
            alpha: 1.0 / (c * data.len() as f64),
        }
    }

    fn stride(&self) -> usize {
        self.n_features + 1
    }

    pub(crate) fn dim(&self) -> usize {
        self.data.n_classes * self.stride()
    }

    fn logits(&self, theta: &[f64], x: &[f64]) -> Vec<f64> {
        theta
            .chunks(self.stride())
            .map(|block| {
                let (w, b) = block.split_at(self.n_features);
                dot(w, x) + b[0]
            })
            .collect()
    }

    /// `softmax(logits) - onehot(target)` for sample `i`, plus its log-loss.
    fn residual(&self, theta: &[f64], i: usize) -> (Vec<f64>, f64) {
        let target = self.data.targets[i];
        let mut p = super::logistic::softmax(&self.logits(theta, &self.data.features[i]));
        let loss = -p[target].max(f64::MIN_POSITIVE).ln();
        p[target] -= 1.0;
        (p, loss)
    }

    pub(crate) fn loss_grad(&self, theta: &[f64]) -> (f64, Vec<f64>) {
        let n = self.data.len() as f64;
        let stride = self.stride();
        let mut loss = 0.0;
        let mut grad = vec![0.0; theta.len()];

        for i in 0..self.data.len() {
            let (r, l) = self.residual(theta, i);
            loss += l;
            let x = &self.data.features[i];
            for (k, rk) in r.iter().enumerate() {
                let block = &mut grad[k * stride..(k + 1) * stride];
                for (g, xj) in block.iter_mut().zip(x.iter()) {
                    *g += rk * xj;
                }
                block[self.n_features] += rk;
            }
        }

        loss /= n;
        for g in grad.iter_mut() {
            *g /= n;
        }
        for (k, block) in theta.chunks(stride).enumerate() {
            for (j, w) in block[..self.n_features].iter().enumerate() {
                loss += 0.5 * self.alpha * w * w;
                grad[k * stride + j] += self.alpha * w;
            }
        }
        (loss, grad)
    }

    /// Class probabilities of every sample at `theta`.
    pub(crate) fn probabilities(&self, theta: &[f64]) -> Vec<Vec<f64>> {
        self.data
            .features
            .iter()
            .map(|x| super::logistic::softmax(&self.logits(theta, x)))
            .collect()
    }

    /// Hessian-vector product `H v` at the point whose per-sample
    /// probabilities are `probs`.
    pub(crate) fn hess_vec(&self, probs: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
        let n = self.data.len() as f64;
        let stride = self.stride();
        let mut out = vec![0.0; v.len()];

        for (x, p) in self.data.features.iter().zip(probs) {
            let u = self.logits(v, x);
            let pu = dot(p, &u);
            for (k, (pk, uk)) in p.iter().zip(&u).enumerate() {
                let c = pk * (uk - pu);
                let block = &mut out[k * stride..(k + 1) * stride];
                for (o, xj) in block.iter_mut().zip(x.iter()) {
                    *o += c * xj;
                }
                block[self.n_features] += c;
            }
        }

        for (j, (o, vj)) in out.iter_mut().zip(v).enumerate() {
            *o /= n;
            if j % stride < self.n_features {
                *o += self.alpha * vj;
            }
        }
        out
    }
}

/// Run `solver` from a zero start. Returns the flat parameters and a report.
pub(crate) fn minimize(
    solver: Solver,
    objective: &SoftmaxObjective<'_>,
    max_iter: usize,
    tol: f64,
    seed: u64,
) -> (Vec<f64>, SolverReport) {
    match solver {
        Solver::Lbfgs => lbfgs(objective, max_iter, tol),
        Solver::NewtonCg => newton_cg(objective, max_iter, tol),
        Solver::Sag | Solver::Saga => stochastic_average(solver, objective, max_iter, tol, seed),
    }
}

/// Backtracking Armijo search along `direction`. Returns the accepted point
/// with its loss and gradient.
fn backtrack(
    objective: &SoftmaxObjective<'_>,
    theta: &[f64],
    direction: &[f64],
    loss: f64,
    slope: f64,
) -> Option<(Vec<f64>, f64, Vec<f64>)> {
    let mut step = 1.0;
    for _ in 0..MAX_LINE_SEARCH_STEPS {
        let candidate: Vec<f64> = theta
            .iter()
            .zip(direction)
            .map(|(t, d)| t + step * d)
            .collect();
        let (c_loss, c_grad) = objective.loss_grad(&candidate);
        if c_loss <= loss + ARMIJO_C1 * step * slope {
            return Some((candidate, c_loss, c_grad));
        }
        step *= 0.5;
    }
    None
}

fn lbfgs(objective: &SoftmaxObjective<'_>, max_iter: usize, tol: f64) -> (Vec<f64>, SolverReport) {
    let mut theta = vec![0.0; objective.dim()];
    let (mut loss, mut grad) = objective.loss_grad(&theta);
    let mut history: VecDeque<(Vec<f64>, Vec<f64>)> = VecDeque::with_capacity(LBFGS_MEMORY);
    let mut iterations = 0;

    while iterations < max_iter && max_abs(&grad) > tol {
        let mut direction = two_loop(&grad, &history);
        let mut slope = dot(&grad, &direction);
        if slope >= 0.0 {
            history.clear();
            direction = grad.iter().map(|g| -g).collect();
            slope = dot(&grad, &direction);
        }

        let Some((next, next_loss, next_grad)) =
            backtrack(objective, &theta, &direction, loss, slope)
        else {
            tracing::debug!(iterations, "L-BFGS line search stalled");
            break;
        };

        let s: Vec<f64> = next.iter().zip(&theta).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = next_grad.iter().zip(&grad).map(|(a, b)| a - b).collect();
        if dot(&s, &y) > CURVATURE_EPS {
            if history.len() == LBFGS_MEMORY {
                history.pop_front();
            }
            history.push_back((s, y));
        }

        theta = next;
        loss = next_loss;
        grad = next_grad;
        iterations += 1;
    }

    let report = SolverReport {
        solver: Solver::Lbfgs,
        iterations,
        converged: max_abs(&grad) <= tol,
        final_loss: loss,
    };
    (theta, report)
}

/// Two-loop recursion: returns the quasi-Newton descent direction `-H g`.
fn two_loop(grad: &[f64], history: &VecDeque<(Vec<f64>, Vec<f64>)>) -> Vec<f64> {
    let mut q = grad.to_vec();
    let mut alphas = Vec::with_capacity(history.len());
    for (s, y) in history.iter().rev() {
        let rho = 1.0 / dot(y, s);
        let a = rho * dot(s, &q);
        axpy(&mut q, -a, y);
        alphas.push((a, rho));
    }

    let gamma = match history.back() {
        Some((s, y)) => dot(s, y) / dot(y, y),
        None => 1.0 / dot(grad, grad).sqrt().max(1e-12),
    };
    let mut r: Vec<f64> = q.iter().map(|v| v * gamma).collect();

    for ((s, y), (a, rho)) in history.iter().zip(alphas.iter().rev()) {
        let b = rho * dot(y, &r);
        axpy(&mut r, a - b, s);
    }
    r.iter().map(|v| -v).collect()
}

fn newton_cg(
    objective: &SoftmaxObjective<'_>,
    max_iter: usize,
    tol: f64,
) -> (Vec<f64>, SolverReport) {
    let mut theta = vec![0.0; objective.dim()];
    let (mut loss, mut grad) = objective.loss_grad(&theta);
    let mut iterations = 0;

    while iterations < max_iter && max_abs(&grad) > tol {
        let probs = objective.probabilities(&theta);
        let mut direction = conjugate_gradient(|v| objective.hess_vec(&probs, v), &grad);
        let mut slope = dot(&grad, &direction);
        if slope >= 0.0 {
            direction = grad.iter().map(|g| -g).collect();
            slope = dot(&grad, &direction);
        }

        let Some((next, next_loss, next_grad)) =
            backtrack(objective, &theta, &direction, loss, slope)
        else {
            tracing::debug!(iterations, "Newton-CG line search stalled");
            break;
        };
        theta = next;
        loss = next_loss;
        grad = next_grad;
        iterations += 1;
    }

    let report = SolverReport {
        solver: Solver::NewtonCg,
        iterations,
        converged: max_abs(&grad) <= tol,
        final_loss: loss,
    };
    (theta, report)
}

/// Approximately solve `H x = -grad` by conjugate gradient, stopping once the
/// residual norm falls below `min(0.5, sqrt(|grad|)) * |grad|`.
fn conjugate_gradient(hess: impl Fn(&[f64]) -> Vec<f64>, grad: &[f64]) -> Vec<f64> {
    let grad_norm = dot(grad, grad).sqrt();
    let tolerance = grad_norm.sqrt().min(0.5) * grad_norm;

    let mut x = vec![0.0; grad.len()];
    let mut r: Vec<f64> = grad.iter().map(|g| -g).collect();
    let mut d = r.clone();
    let mut rs = dot(&r, &r);

    for i in 0..MAX_CG_ITERATIONS {
        if rs.sqrt() <= tolerance {
            break;
        }
        let hd = hess(&d);
        let curvature = dot(&d, &hd);
        if curvature <= f64::EPSILON * dot(&d, &d) {
            // Not positive definite along d: fall back to steepest descent.
            if i == 0 {
                x = d.clone();
            }
            break;
        }
        let a = rs / curvature;
        axpy(&mut x, a, &d);
        axpy(&mut r, -a, &hd);
        let rs_next = dot(&r, &r);
        let beta = rs_next / rs;
        for (di, ri) in d.iter_mut().zip(&r) {
            *di = ri + beta * *di;
        }
        rs = rs_next;
    }
    x
}

/// SAG and SAGA. Both keep the last residual of every sample; SAG steps along
/// the running average gradient, SAGA along the fresh sample gradient
/// corrected by the stored average.
fn stochastic_average(
    solver: Solver,
    objective: &SoftmaxObjective<'_>,
    max_iter: usize,
    tol: f64,
    seed: u64,
) -> (Vec<f64>, SolverReport) {
    let data = objective.data;
    let n = data.len();
    let n_classes = data.n_classes;
    let n_features = objective.n_features;
    let stride = objective.stride();
    let alpha = objective.alpha;
    let unbiased = solver == Solver::Saga;

    let max_sq_norm = data
        .features
        .iter()
        .map(|x| dot(x, x) + 1.0)
        .fold(0.0, f64::max);
    let lipschitz = 0.5 * max_sq_norm + alpha;
    let step = if unbiased {
        1.0 / (3.0 * lipschitz)
    } else {
        1.0 / lipschitz
    };

    let mut theta = vec![0.0; objective.dim()];
    let mut memory = vec![vec![0.0; n_classes]; n];
    let mut seen = vec![false; n];
    let mut n_seen = 0usize;
    let mut grad_sum = vec![0.0; theta.len()];
    let mut delta = vec![0.0; theta.len()];
    let mut rng = StdRng::seed_from_u64(seed);
    let penalty = |j: usize, t: f64| if j % stride < n_features { alpha * t } else { 0.0 };

    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iter {
        let previous = theta.clone();
        for _ in 0..n {
            let i = rng.gen_range(0..n);
            if !seen[i] {
                seen[i] = true;
                n_seen += 1;
            }
            let (r, _) = objective.residual(&theta, i);
            let x = &data.features[i];
            for (k, rk) in r.iter().enumerate() {
                let dk = rk - memory[i][k];
                memory[i][k] = *rk;
                let block = &mut delta[k * stride..(k + 1) * stride];
                for (d, xj) in block.iter_mut().zip(x.iter()) {
                    *d = dk * xj;
                }
                block[n_features] = dk;
            }

            if unbiased {
                for (j, t) in theta.iter_mut().enumerate() {
                    *t -= step * (delta[j] + grad_sum[j] / n as f64 + penalty(j, *t));
                }
                axpy(&mut grad_sum, 1.0, &delta);
            } else {
                axpy(&mut grad_sum, 1.0, &delta);
                for (j, t) in theta.iter_mut().enumerate() {
                    *t -= step * (grad_sum[j] / n_seen as f64 + penalty(j, *t));
                }
            }
        }
        iterations += 1;

        let max_change = theta
            .iter()
            .zip(&previous)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        let max_weight = max_abs(&theta);
        if max_weight > 0.0 && max_change / max_weight <= tol {
            converged = true;
            break;
        }
    }

    let (final_loss, _) = objective.loss_grad(&theta);
    let report = SolverReport {
        solver,
        iterations,
        converged,
        final_loss,
    };
    (theta, report)
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn axpy(y: &mut [f64], a: f64, x: &[f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += a * xi;
    }
}

fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0, |m, x| m.max(x.abs()))
}
