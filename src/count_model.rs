//! Poisson–Gamma hierarchy for count statistics.
//!
//! ```text
//! β  ~ HalfNormal(100)
//! μ  ~ HalfFlat
//! λᵢ ~ Gamma(shape = μ·β, rate = β)        per-minute rate
//! yᵢ ~ Poisson(λᵢ · minutesᵢ)
//! ```
//!
//! Unconstrained layout: `[ln β, ln μ, ln λ₁ … ln λₙ]`.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::advi::{self, LogDensity};
use crate::config::FitConfig;
use crate::error::{ModelError, Result};
use crate::fit::{CountFit, CountHyper, ModelFit, observed_rows};
use crate::samples::SampleMatrix;
use crate::special::{digamma, half_normal_kernel, ln_gamma, mean, variance};

const MODEL: &str = "count";
const SEED_SALT: u64 = 0x0c0a_7e11;
const BETA_SCALE: f64 = 100.0;
const MINUTES_PER_90: f64 = 90.0;
const HYPER: usize = 2;

struct CountDensity {
    counts: Vec<f64>,
    minutes: Vec<f64>,
}

impl LogDensity for CountDensity {
    fn dim(&self) -> usize {
        HYPER + self.counts.len()
    }

    fn initial_point(&self) -> Vec<f64> {
        let rates = self
            .counts
            .iter()
            .zip(&self.minutes)
            .map(|(y, m)| (y.max(0.0) + 0.5) / m)
            .collect::<Vec<_>>();
        let mu = mean(&rates);
        let var = variance(&rates).max(mu * mu * 1e-2);
        let beta = (mu / var).clamp(1e-2, 300.0);

        let mut theta = Vec::with_capacity(self.dim());
        theta.push(beta.ln());
        theta.push(mu.ln());
        theta.extend(rates.iter().map(|r| r.ln()));
        theta
    }

    fn log_density_grad(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        let ln_beta = theta[0];
        let beta = ln_beta.exp();
        let mu = theta[1].exp();
        let shape = mu * beta;
        let lg_shape = ln_gamma(shape);
        let dg_shape = digamma(shape);

        let (hn, d_hn) = half_normal_kernel(beta, BETA_SCALE);
        // log-Jacobians of both exp transforms
        let mut lp = hn + theta[0] + theta[1];
        let mut d_beta = d_hn;
        let mut d_mu = 0.0;

        for (i, (y, m)) in self.counts.iter().zip(&self.minutes).enumerate() {
            let u = theta[HYPER + i];
            let lambda = u.exp();
            lp += shape * ln_beta - lg_shape + shape * u - beta * lambda;
            lp += y * u - m * lambda;
            grad[HYPER + i] = shape - beta * lambda + y - m * lambda;
            d_beta += mu * ln_beta + mu - mu * dg_shape + mu * u - lambda;
            d_mu += beta * ln_beta - beta * dg_shape + beta * u;
        }

        grad[0] = beta * d_beta + 1.0;
        grad[1] = mu * d_mu + 1.0;
        lp
    }
}

/// Fits the count model. `counts` and `minutes` are parallel per-player
/// columns; players need positive, finite minutes and a finite count.
/// Player draws are rates per 90 minutes.
pub fn fit_count_model(counts: &[f64], minutes: &[f64], config: &FitConfig) -> Result<ModelFit> {
    if counts.len() != minutes.len() {
        return Err(ModelError::shape(format!(
            "count model needs equal-length counts and minutes, got {} and {}",
            counts.len(),
            minutes.len()
        )));
    }

    let observed = counts
        .iter()
        .zip(minutes)
        .map(|(c, m)| *m > 0.0 && m.is_finite() && c.is_finite())
        .collect::<Vec<_>>();
    let rows = observed_rows(&observed);
    if rows.is_empty() {
        return Err(ModelError::shape(
            "count model has no player with positive minutes and a finite count",
        ));
    }

    let density = CountDensity {
        counts: rows.iter().map(|&r| counts[r]).collect(),
        minutes: rows.iter().map(|&r| minutes[r]).collect(),
    };
    let n = rows.len();
    info!(model = MODEL, players = n, iterations = config.iterations, "fitting");

    let mut rng = StdRng::seed_from_u64(config.seed ^ SEED_SALT);
    let (q, trace) = advi::fit(MODEL, &density, config, &mut rng)?;

    let columns = q.sample_block(HYPER, n, config.draws, &mut rng, |u| u.exp() * MINUTES_PER_90);
    let samples = SampleMatrix::from_columns(config.draws, columns)?;
    let betas = q.sample_coordinate(0, config.draws, &mut rng, f64::exp);
    let mus = q.sample_coordinate(1, config.draws, &mut rng, f64::exp);
    let population = betas
        .into_iter()
        .zip(mus)
        .map(|(beta, mu)| CountHyper { beta, mu })
        .collect::<Vec<_>>();

    if !samples.all_finite() || population.iter().any(|h| !h.beta.is_finite() || !h.mu.is_finite()) {
        return Err(ModelError::numerical(MODEL, "posterior draws overflowed"));
    }

    info!(model = MODEL, players = n, elbo = trace.final_elbo, "fit complete");
    Ok(ModelFit::Count(CountFit {
        samples,
        population,
        observed,
        trace,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finite_difference(density: &CountDensity, theta: &[f64]) -> Vec<f64> {
        let mut scratch = vec![0.0; theta.len()];
        (0..theta.len())
            .map(|i| {
                let h = 1e-6;
                let mut up = theta.to_vec();
                let mut down = theta.to_vec();
                up[i] += h;
                down[i] -= h;
                let a = density.log_density_grad(&up, &mut scratch);
                let b = density.log_density_grad(&down, &mut scratch);
                (a - b) / (2.0 * h)
            })
            .collect()
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let density = CountDensity {
            counts: vec![4.0, 0.0, 12.0],
            minutes: vec![450.0, 90.0, 1200.0],
        };
        let theta = vec![1.3, -4.0, -4.5, -6.0, -4.6];
        let mut grad = vec![0.0; theta.len()];
        density.log_density_grad(&theta, &mut grad);
        for (g, fd) in grad.iter().zip(finite_difference(&density, &theta)) {
            assert!((g - fd).abs() < 1e-3 * (1.0 + fd.abs()), "{g} vs {fd}");
        }
    }

    #[test]
    fn mismatched_columns_are_a_shape_error() {
        let err = fit_count_model(&[1.0], &[90.0, 90.0], &FitConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::InputShape(_)));
    }

    #[test]
    fn per90_rates_track_observed_rates() {
        let cfg = FitConfig::default().with_budget(4_000, 400);
        let fit = fit_count_model(&[5.0, 40.0, 20.0], &[900.0, 900.0, 900.0], &cfg).unwrap();
        let low = mean(fit.player_samples(0).unwrap());
        let high = mean(fit.player_samples(1).unwrap());
        assert!(low < high, "{low} !< {high}");
        assert_eq!(fit.population_draws(), 400);
    }
}
