//! Epsilon-insensitive support vector regression with an RBF kernel.
//!
//! The intercept is folded into the kernel (`K'(a, b) = K(a, b) + 1`), which
//! removes the equality constraint from the dual. The dual
//!
//! ```text
//! min_β  ½ βᵀK'β − yᵀβ + ε‖β‖₁   subject to  −C ≤ βᵢ ≤ C
//! ```
//!
//! is then solved by cyclic coordinate descent over a precomputed Gram
//! matrix, visiting coordinates in a seeded random order each epoch.

use crate::error::TrainingError;
use crate::model::artifact::base64_floats;
use crate::model::cancel::StopSignal;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// RBF kernel width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gamma {
    /// `1 / (n_features · Var(X))`, or 1 when the variance is zero.
    Scale,
    /// `1 / n_features`.
    Auto,
    Value(f64),
}

impl Gamma {
    pub fn resolve(self, values: &[f64], n_features: usize) -> f64 {
        let n = n_features.max(1) as f64;
        match self {
            Gamma::Value(gamma) => gamma,
            Gamma::Auto => 1.0 / n,
            Gamma::Scale => {
                let var = variance(values);
                if var.is_finite() && var > 0.0 {
                    1.0 / (n * var)
                } else {
                    1.0
                }
            }
        }
    }
}

impl fmt::Display for Gamma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gamma::Scale => f.write_str("scale"),
            Gamma::Auto => f.write_str("auto"),
            Gamma::Value(gamma) => write!(f, "{gamma}"),
        }
    }
}

impl FromStr for Gamma {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scale" => Ok(Gamma::Scale),
            "auto" => Ok(Gamma::Auto),
            other => other
                .parse::<f64>()
                .map(Gamma::Value)
                .map_err(|_| format!("invalid gamma '{s}': expected 'scale', 'auto' or a number")),
        }
    }
}

/// Hyperparameters of one SVR fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SvrParams {
    pub c: f64,
    pub gamma: Gamma,
    pub epsilon: f64,
}

impl SvrParams {
    pub fn validate(&self) -> Result<(), TrainingError> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(TrainingError::InvalidConfig(format!("C must be positive, got {}", self.c)));
        }
        if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
            return Err(TrainingError::InvalidConfig(format!(
                "epsilon must be non-negative, got {}",
                self.epsilon
            )));
        }
        if let Gamma::Value(gamma) = self.gamma {
            if !(gamma.is_finite() && gamma > 0.0) {
                return Err(TrainingError::InvalidConfig(format!("gamma must be positive, got {gamma}")));
            }
        }
        Ok(())
    }
}

impl Default for SvrParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            gamma: Gamma::Scale,
            epsilon: 0.1,
        }
    }
}

impl fmt::Display for SvrParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C={}, gamma={}, epsilon={}", self.c, self.gamma, self.epsilon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    pub max_epochs: usize,
    /// Stop once no coordinate moves its own prediction by more than this.
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_epochs: 1000,
            tolerance: 1e-3,
            seed: 42,
        }
    }
}

/// A fitted regressor: support vectors with their dual coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvrModel {
    gamma: f64,
    n_features: usize,
    #[serde(with = "base64_floats")]
    support_vectors: Vec<f64>,
    dual_coef: Vec<f64>,
}

impl SvrModel {
    /// Fits on a row-major matrix `x` of `n_features` columns.
    pub fn fit(
        x: &[f64],
        n_features: usize,
        y: &[f64],
        params: &SvrParams,
        options: &SolverOptions,
        stop: &StopSignal,
    ) -> Result<Self, TrainingError> {
        params.validate()?;
        let n = y.len();
        if n == 0 || n_features == 0 || x.len() != n * n_features {
            return Err(TrainingError::DegenerateFeatures(format!(
                "expected a non-empty {n}x{n_features} matrix, got {} values",
                x.len()
            )));
        }
        if y.iter().chain(x).any(|v| !v.is_finite()) {
            return Err(TrainingError::Numerical("non-finite value in training data".to_string()));
        }

        let gamma = params.gamma.resolve(x, n_features);
        if !(gamma.is_finite() && gamma > 0.0) {
            return Err(TrainingError::Numerical(format!("kernel width resolved to {gamma}")));
        }

        let q = gram_matrix(x, n_features, gamma);
        let mut beta = vec![0.0f64; n];
        let mut f = vec![0.0f64; n];
        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut epochs = 0;
        let mut converged = false;

        while epochs < options.max_epochs {
            if stop.should_stop() {
                return Err(TrainingError::Cancelled);
            }
            epochs += 1;
            order.shuffle(&mut rng);
            let mut max_step = 0.0f64;

            for &i in &order {
                let row = &q[i * n..(i + 1) * n];
                let qii = f64::from(row[i]);
                let gradient = f[i] - y[i];
                let unconstrained = beta[i] - gradient / qii;
                let shrunk = unconstrained.signum() * (unconstrained.abs() - params.epsilon / qii).max(0.0);
                let updated = shrunk.clamp(-params.c, params.c);
                let delta = updated - beta[i];
                if delta != 0.0 {
                    // Q is symmetric, so row i doubles as column i.
                    for (fj, &qij) in f.iter_mut().zip(row) {
                        *fj += delta * f64::from(qij);
                    }
                    beta[i] = updated;
                    max_step = max_step.max(delta.abs() * qii);
                }
            }

            if !max_step.is_finite() {
                return Err(TrainingError::Numerical(format!("solver diverged in epoch {epochs}")));
            }
            if max_step < options.tolerance {
                converged = true;
                break;
            }
        }

        let mut support_vectors = Vec::new();
        let mut dual_coef = Vec::new();
        for (i, &b) in beta.iter().enumerate() {
            if b != 0.0 {
                support_vectors.extend_from_slice(&x[i * n_features..(i + 1) * n_features]);
                dual_coef.push(b);
            }
        }
        debug!(
            rows = n,
            support = dual_coef.len(),
            epochs,
            converged,
            params = %params,
            "fitted SVR"
        );

        Ok(Self {
            gamma,
            n_features,
            support_vectors,
            dual_coef,
        })
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_support(&self) -> usize {
        self.dual_coef.len()
    }

    /// Support vector count and width agree with the stored coefficients.
    pub fn is_consistent(&self) -> bool {
        self.n_features > 0 && self.support_vectors.len() == self.dual_coef.len() * self.n_features
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.support_vectors
            .chunks_exact(self.n_features)
            .zip(&self.dual_coef)
            .map(|(sv, coef)| coef * (rbf(sv, row, self.gamma) + 1.0))
            .sum()
    }

    /// Predicts every row of a row-major matrix with [`Self::n_features`] columns.
    pub fn predict(&self, x: &[f64]) -> Vec<f64> {
        x.par_chunks(self.n_features.max(1))
            .map(|row| self.predict_row(row))
            .collect()
    }
}

fn rbf(a: &[f64], b: &[f64], gamma: f64) -> f64 {
    let distance: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (-gamma * distance).exp()
}

/// Dense `K + 1` over all row pairs, stored in single precision.
fn gram_matrix(x: &[f64], n_features: usize, gamma: f64) -> Vec<f32> {
    let n = x.len() / n_features;
    let mut q = vec![0.0f32; n * n];
    q.par_chunks_mut(n).enumerate().for_each(|(i, out)| {
        let xi = &x[i * n_features..(i + 1) * n_features];
        for (j, cell) in out.iter_mut().enumerate() {
            let xj = &x[j * n_features..(j + 1) * n_features];
            *cell = (rbf(xi, xj, gamma) + 1.0) as f32;
        }
    });
    q
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}
