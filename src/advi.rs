//! Mean-field automatic differentiation variational inference.
//!
//! Every model is written as a log joint density over an unconstrained
//! parameter vector (positive parameters on the log scale, unit-interval
//! parameters on the logit scale, log-Jacobians folded into the density).
//! The approximation is a diagonal Gaussian `q(θ) = Π N(θᵢ; mᵢ, exp(ωᵢ)²)`
//! fitted by stochastic gradient ascent on the ELBO:
//!
//! ```text
//! θ = m + exp(ω) ⊙ ε,  ε ~ N(0, I)
//! ∇m  ELBO ≈ ∇θ log p(θ)
//! ∇ω  ELBO ≈ ∇θ log p(θ) ⊙ ε ⊙ exp(ω) + 1
//! ```
//!
//! Improper priors need no named distribution: they are extra log-weight
//! terms inside `log_density_grad`.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FitConfig;
use crate::error::{ModelError, Result};

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;
const LOG_SD_MIN: f64 = -14.0;
const LOG_SD_MAX: f64 = 4.0;
const TRACE_CHECKPOINTS: usize = 10;

/// Unnormalised log joint density over an unconstrained parameter vector.
pub trait LogDensity {
    fn dim(&self) -> usize;

    /// Starting point for the variational means.
    fn initial_point(&self) -> Vec<f64>;

    /// Returns `log p(θ)` and overwrites `grad` with its gradient.
    fn log_density_grad(&self, theta: &[f64], grad: &mut [f64]) -> f64;
}

/// Fitted diagonal Gaussian over the unconstrained parameters.
#[derive(Debug, Clone)]
pub struct MeanField {
    pub mean: Vec<f64>,
    pub log_sd: Vec<f64>,
}

impl MeanField {
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Draws of coordinate `idx`, mapped through `transform`.
    pub fn sample_coordinate<R, F>(&self, idx: usize, draws: usize, rng: &mut R, transform: F) -> Vec<f64>
    where
        R: Rng + ?Sized,
        F: Fn(f64) -> f64,
    {
        let m = self.mean[idx];
        let s = self.log_sd[idx].exp();
        (0..draws)
            .map(|_| {
                let eps: f64 = rng.sample(StandardNormal);
                transform(m + s * eps)
            })
            .collect()
    }

    /// Draws of `len` consecutive coordinates starting at `offset`, one
    /// column per coordinate.
    pub fn sample_block<R, F>(
        &self,
        offset: usize,
        len: usize,
        draws: usize,
        rng: &mut R,
        transform: F,
    ) -> Vec<Vec<f64>>
    where
        R: Rng + ?Sized,
        F: Fn(f64) -> f64,
    {
        (offset..offset + len)
            .map(|idx| self.sample_coordinate(idx, draws, rng, &transform))
            .collect()
    }
}

/// ELBO history of one optimisation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FitTrace {
    pub iterations: usize,
    pub checkpoints: Vec<(usize, f64)>,
    /// Mean single-draw ELBO estimate over the last tenth of the run.
    pub final_elbo: f64,
}

pub fn fit<D, R>(model: &'static str, density: &D, config: &FitConfig, rng: &mut R) -> Result<(MeanField, FitTrace)>
where
    D: LogDensity + ?Sized,
    R: Rng + ?Sized,
{
    let dim = density.dim();
    let mut mean = density.initial_point();
    if mean.len() != dim {
        return Err(ModelError::numerical(
            model,
            format!("initial point has {} coordinates, expected {dim}", mean.len()),
        ));
    }
    if let Some(idx) = mean.iter().position(|v| !v.is_finite()) {
        return Err(ModelError::numerical(
            model,
            format!("initial point coordinate {idx} is not finite"),
        ));
    }

    let iterations = config.iterations.max(1);
    let mc = config.gradient_draws.max(1);
    let lr = config.learning_rate;

    let mut log_sd = vec![config.initial_log_sd; dim];
    let mut m_mean = vec![0.0; dim];
    let mut v_mean = vec![0.0; dim];
    let mut m_sd = vec![0.0; dim];
    let mut v_sd = vec![0.0; dim];

    let mut eps = vec![0.0; dim];
    let mut theta = vec![0.0; dim];
    let mut grad = vec![0.0; dim];
    let mut g_mean = vec![0.0; dim];
    let mut g_sd = vec![0.0; dim];

    let every = (iterations / TRACE_CHECKPOINTS).max(1);
    let tail_start = iterations - (iterations / 10).max(1);
    let mut tail_sum = 0.0;
    let mut tail_n = 0usize;
    let mut trace = FitTrace {
        iterations,
        ..Default::default()
    };

    for step in 1..=iterations {
        g_mean.fill(0.0);
        g_sd.fill(0.0);
        let mut elbo = 0.0;

        for _ in 0..mc {
            for i in 0..dim {
                eps[i] = rng.sample(StandardNormal);
                theta[i] = mean[i] + log_sd[i].exp() * eps[i];
            }
            grad.fill(0.0);
            let lp = density.log_density_grad(&theta, &mut grad);
            if !lp.is_finite() {
                return Err(ModelError::numerical(
                    model,
                    format!("log density became non-finite at iteration {step}"),
                ));
            }
            for i in 0..dim {
                g_mean[i] += grad[i];
                g_sd[i] += grad[i] * eps[i] * log_sd[i].exp();
            }
            elbo += lp;
        }

        let scale = 1.0 / mc as f64;
        elbo = elbo * scale + log_sd.iter().sum::<f64>();
        for i in 0..dim {
            g_mean[i] *= scale;
            g_sd[i] = g_sd[i] * scale + 1.0;
            if !g_mean[i].is_finite() || !g_sd[i].is_finite() {
                return Err(ModelError::numerical(
                    model,
                    format!("gradient of coordinate {i} became non-finite at iteration {step}"),
                ));
            }
        }

        let bias1 = 1.0 - ADAM_BETA1.powi(step.min(i32::MAX as usize) as i32);
        let bias2 = 1.0 - ADAM_BETA2.powi(step.min(i32::MAX as usize) as i32);
        for i in 0..dim {
            mean[i] += adam_step(&mut m_mean[i], &mut v_mean[i], g_mean[i], bias1, bias2, lr);
            log_sd[i] += adam_step(&mut m_sd[i], &mut v_sd[i], g_sd[i], bias1, bias2, lr);
            log_sd[i] = log_sd[i].clamp(LOG_SD_MIN, LOG_SD_MAX);
        }

        if step > tail_start {
            tail_sum += elbo;
            tail_n += 1;
        }
        if step % every == 0 || step == iterations {
            debug!(model, step, elbo, "advi progress");
            trace.checkpoints.push((step, elbo));
        }
    }

    if let Some(idx) = mean.iter().position(|v| !v.is_finite()) {
        return Err(ModelError::numerical(
            model,
            format!("variational mean {idx} is not finite after optimisation"),
        ));
    }

    trace.final_elbo = if tail_n > 0 {
        tail_sum / tail_n as f64
    } else {
        f64::NAN
    };
    Ok((MeanField { mean, log_sd }, trace))
}

fn adam_step(m: &mut f64, v: &mut f64, g: f64, bias1: f64, bias2: f64, lr: f64) -> f64 {
    *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
    *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
    let m_hat = *m / bias1;
    let v_hat = *v / bias2;
    lr * m_hat / (v_hat.sqrt() + ADAM_EPS)
}
