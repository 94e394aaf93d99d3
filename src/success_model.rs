//! Binomial–Beta hierarchy for success rates.
//!
//! ```text
//! p(α, β) ∝ (α + β)^(-5/2)                 improper, added as a potential
//! λᵢ ~ Beta(α, β)
//! sᵢ ~ Binomial(attemptsᵢ, λᵢ)
//! ```
//!
//! Unconstrained layout: `[ln α, ln β, logit λ₁ … logit λₙ]`.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::advi::{self, LogDensity};
use crate::config::FitConfig;
use crate::error::{ModelError, Result};
use crate::fit::{BetaHyper, ModelFit, SuccessFit, observed_rows};
use crate::samples::SampleMatrix;
use crate::special::{
    beta_pair_potential, digamma, ln_gamma, ln_sigmoid_pair, logit, mean, sigmoid, variance,
};

const MODEL: &str = "success_rate";
const SEED_SALT: u64 = 0x5ecc_e55a;
const HYPER: usize = 2;
const PERCENT: f64 = 100.0;

/// Beta population over per-player probabilities observed through Binomial
/// counts. Shared with the adjusted-pass model's short-pass component.
pub(crate) struct BetaBinomialTerms<'a> {
    pub successes: &'a [f64],
    pub attempts: &'a [f64],
}

impl BetaBinomialTerms<'_> {
    /// Adds the potential, the Beta population and the Binomial likelihood.
    /// `hyper` holds `[ln α, ln β]`, `lambdas` the logit probabilities.
    pub fn accumulate(
        &self,
        hyper: &[f64],
        lambdas: &[f64],
        grad_hyper: &mut [f64],
        grad_lambdas: &mut [f64],
    ) -> f64 {
        let alpha = hyper[0].exp();
        let beta = hyper[1].exp();
        let (pot, d_pot) = beta_pair_potential(alpha, beta);
        let ln_b = ln_gamma(alpha + beta) - ln_gamma(alpha) - ln_gamma(beta);
        let dg_ab = digamma(alpha + beta);
        let dg_a = digamma(alpha);
        let dg_b = digamma(beta);

        let mut lp = pot + hyper[0] + hyper[1];
        let mut d_alpha = d_pot;
        let mut d_beta = d_pot;

        for (i, (s, n)) in self.successes.iter().zip(self.attempts).enumerate() {
            let u = lambdas[i];
            let lambda = sigmoid(u);
            let (ln_p, ln_q) = ln_sigmoid_pair(u);
            // Beta density with the logit Jacobian folded in, plus Binomial kernel
            lp += ln_b + (alpha + s) * ln_p + (beta + n - s) * ln_q;
            grad_lambdas[i] = (alpha + s) * (1.0 - lambda) - (beta + n - s) * lambda;
            d_alpha += dg_ab - dg_a + ln_p;
            d_beta += dg_ab - dg_b + ln_q;
        }

        grad_hyper[0] = alpha * d_alpha + 1.0;
        grad_hyper[1] = beta * d_beta + 1.0;
        lp
    }
}

/// Method-of-moments start `[ln α, ln β]` for a Beta population around `rates`.
pub(crate) fn beta_moment_start(rates: &[f64]) -> Vec<f64> {
    let m = mean(rates).clamp(1e-3, 1.0 - 1e-3);
    let v = variance(rates).max(1e-4);
    let common = (m * (1.0 - m) / v - 1.0).clamp(1.0, 1e3);
    vec![(m * common).ln(), ((1.0 - m) * common).ln()]
}

/// Smoothed per-player rates `(s + 0.5) / (n + 1)`.
pub(crate) fn smoothed_rates(successes: &[f64], attempts: &[f64]) -> Vec<f64> {
    successes
        .iter()
        .zip(attempts)
        .map(|(s, n)| (s.max(0.0) + 0.5) / (n.max(0.0) + 1.0))
        .collect()
}

struct SuccessDensity {
    successes: Vec<f64>,
    attempts: Vec<f64>,
}

impl LogDensity for SuccessDensity {
    fn dim(&self) -> usize {
        HYPER + self.successes.len()
    }

    fn initial_point(&self) -> Vec<f64> {
        let rates = smoothed_rates(&self.successes, &self.attempts);
        let mut theta = beta_moment_start(&rates);
        theta.extend(rates.iter().map(|r| logit(r.clamp(1e-4, 1.0 - 1e-4))));
        theta
    }

    fn log_density_grad(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        let terms = BetaBinomialTerms {
            successes: &self.successes,
            attempts: &self.attempts,
        };
        let (grad_hyper, grad_lambdas) = grad.split_at_mut(HYPER);
        terms.accumulate(&theta[..HYPER], &theta[HYPER..], grad_hyper, grad_lambdas)
    }
}

/// Fits the success-rate model. Players need positive, finite attempts and a
/// finite success count. Player draws are success percentages.
pub fn fit_success_model(successes: &[f64], attempts: &[f64], config: &FitConfig) -> Result<ModelFit> {
    if successes.len() != attempts.len() {
        return Err(ModelError::shape(format!(
            "success-rate model needs equal-length successes and attempts, got {} and {}",
            successes.len(),
            attempts.len()
        )));
    }

    let observed = successes
        .iter()
        .zip(attempts)
        .map(|(s, n)| *n > 0.0 && n.is_finite() && s.is_finite())
        .collect::<Vec<_>>();
    let rows = observed_rows(&observed);
    if rows.is_empty() {
        return Err(ModelError::shape(
            "success-rate model has no player with positive attempts",
        ));
    }

    let density = SuccessDensity {
        successes: rows.iter().map(|&r| successes[r]).collect(),
        attempts: rows.iter().map(|&r| attempts[r]).collect(),
    };
    let n = rows.len();
    info!(model = MODEL, players = n, iterations = config.iterations, "fitting");

    let mut rng = StdRng::seed_from_u64(config.seed ^ SEED_SALT);
    let (q, trace) = advi::fit(MODEL, &density, config, &mut rng)?;

    let columns = q.sample_block(HYPER, n, config.draws, &mut rng, |u| sigmoid(u) * PERCENT);
    let samples = SampleMatrix::from_columns(config.draws, columns)?;
    let alphas = q.sample_coordinate(0, config.draws, &mut rng, f64::exp);
    let betas = q.sample_coordinate(1, config.draws, &mut rng, f64::exp);
    let population = alphas
        .into_iter()
        .zip(betas)
        .map(|(alpha, beta)| BetaHyper { alpha, beta })
        .collect::<Vec<_>>();

    if population
        .iter()
        .any(|h| !h.alpha.is_finite() || !h.beta.is_finite())
    {
        return Err(ModelError::numerical(MODEL, "population draws overflowed"));
    }

    info!(model = MODEL, players = n, elbo = trace.final_elbo, "fit complete");
    Ok(ModelFit::Success(SuccessFit {
        samples,
        population,
        observed,
        trace,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_matches_finite_differences() {
        let density = SuccessDensity {
            successes: vec![30.0, 2.0, 55.0],
            attempts: vec![40.0, 10.0, 60.0],
        };
        let theta = vec![1.1, 0.4, 0.8, -0.9, 2.0];
        let mut grad = vec![0.0; theta.len()];
        density.log_density_grad(&theta, &mut grad);
        let mut scratch = vec![0.0; theta.len()];
        for i in 0..theta.len() {
            let h = 1e-6;
            let mut up = theta.clone();
            let mut down = theta.clone();
            up[i] += h;
            down[i] -= h;
            let fd = (density.log_density_grad(&up, &mut scratch)
                - density.log_density_grad(&down, &mut scratch))
                / (2.0 * h);
            assert!((grad[i] - fd).abs() < 1e-3 * (1.0 + fd.abs()), "coord {i}: {} vs {fd}", grad[i]);
        }
    }

    #[test]
    fn zero_attempt_players_are_filtered() {
        let cfg = FitConfig::default().with_budget(2_000, 200);
        let fit = fit_success_model(&[8.0, 0.0, 15.0, f64::NAN], &[10.0, 0.0, 30.0, 5.0], &cfg).unwrap();
        assert_eq!(fit.observed(), &[true, false, true, false]);
        assert_eq!(fit.samples().columns(), 2);
        assert!(fit.samples().flat().iter().all(|p| (0.0..=100.0).contains(p)));
    }
}
