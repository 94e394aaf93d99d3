//! Beta–Beta hierarchy for expected successes per action (xG per shot,
//! xA per key pass).
//!
//! ```text
//! μ      ~ Uniform(0, 1)
//! v₁, v₂ ~ HalfNormal(100)
//! λᵢ     ~ Beta(μ·v₁, (1 − μ)·v₁)
//! rᵢ     ~ Beta(λᵢ·cᵢ, (1 − λᵢ)·cᵢ),   cᵢ = attemptsᵢ·(v₂ + 1) − 1
//! ```
//!
//! `rᵢ = expectedᵢ / attemptsᵢ` is the observed rate; more attempts give a
//! larger `cᵢ` and so a tighter observation.
//!
//! Unconstrained layout: `[ln v₁, ln v₂, logit μ, logit λ₁ … logit λₙ]`.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::advi::{self, LogDensity};
use crate::config::FitConfig;
use crate::error::{ModelError, Result};
use crate::fit::{ExpectedFit, ExpectedHyper, ModelFit, observed_rows};
use crate::samples::SampleMatrix;
use crate::special::{
    digamma, half_normal_kernel, ln_gamma, ln_sigmoid_pair, logit, mean, sigmoid, variance,
};

const MODEL: &str = "xSpA";
const SEED_SALT: u64 = 0x0e8b_ec7e;
const V_SCALE: f64 = 100.0;
const HYPER: usize = 3;

struct ExpectedDensity {
    /// Observed rate per player, strictly inside (0, 1).
    rates: Vec<f64>,
    attempts: Vec<f64>,
}

impl LogDensity for ExpectedDensity {
    fn dim(&self) -> usize {
        HYPER + self.rates.len()
    }

    fn initial_point(&self) -> Vec<f64> {
        let mu = mean(&self.rates).clamp(1e-3, 1.0 - 1e-3);
        let var = variance(&self.rates).max(1e-5);
        let v_pop = (mu * (1.0 - mu) / var - 1.0).clamp(2.0, 200.0);

        let mut theta = Vec::with_capacity(self.dim());
        theta.push(v_pop.ln());
        theta.push(0.0);
        theta.push(logit(mu));
        theta.extend(self.rates.iter().map(|r| logit(r.clamp(1e-4, 1.0 - 1e-4))));
        theta
    }

    fn log_density_grad(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        let v_pop = theta[0].exp();
        let v_obs = theta[1].exp();
        let mu = sigmoid(theta[2]);
        let (ln_mu, ln_1m_mu) = ln_sigmoid_pair(theta[2]);

        let a = mu * v_pop;
        let b = (1.0 - mu) * v_pop;
        let pop_norm = ln_gamma(v_pop) - ln_gamma(a) - ln_gamma(b);
        let dg_v = digamma(v_pop);
        let dg_a = digamma(a);
        let dg_b = digamma(b);

        let (hn_pop, d_hn_pop) = half_normal_kernel(v_pop, V_SCALE);
        let (hn_obs, d_hn_obs) = half_normal_kernel(v_obs, V_SCALE);
        // log-Jacobians: exp, exp, logistic
        let mut lp = hn_pop + hn_obs + theta[0] + theta[1] + ln_mu + ln_1m_mu;
        let mut d_vpop = d_hn_pop;
        let mut d_vobs = d_hn_obs;
        let mut d_mu = 0.0;

        for (i, (r, n)) in self.rates.iter().zip(&self.attempts).enumerate() {
            let u = theta[HYPER + i];
            let lambda = sigmoid(u);
            let (ln_l, ln_1m_l) = ln_sigmoid_pair(u);
            let c = n * (v_obs + 1.0) - 1.0;
            if c <= 0.0 {
                return f64::NEG_INFINITY;
            }
            let (ln_r, ln_1m_r) = (r.ln(), (-r).ln_1p());

            // population Beta with the logit Jacobian folded in
            lp += pop_norm + a * ln_l + b * ln_1m_l;
            // observation Beta, dropping the constant -ln r - ln(1-r)
            let lc = lambda * c;
            let mc = (1.0 - lambda) * c;
            lp += ln_gamma(c) - ln_gamma(lc) - ln_gamma(mc) + lc * ln_r + mc * ln_1m_r;

            let dg_lc = digamma(lc);
            let dg_mc = digamma(mc);
            let d_obs_d_lambda = c * (dg_mc - dg_lc + ln_r - ln_1m_r);
            grad[HYPER + i] =
                a * (1.0 - lambda) - b * lambda + lambda * (1.0 - lambda) * d_obs_d_lambda;

            d_vpop += dg_v - mu * dg_a - (1.0 - mu) * dg_b + mu * ln_l + (1.0 - mu) * ln_1m_l;
            d_mu += v_pop * (dg_b - dg_a + ln_l - ln_1m_l);
            let d_c = digamma(c) - lambda * dg_lc - (1.0 - lambda) * dg_mc
                + lambda * ln_r
                + (1.0 - lambda) * ln_1m_r;
            d_vobs += n * d_c;
        }

        grad[0] = v_pop * d_vpop + 1.0;
        grad[1] = v_obs * d_vobs + 1.0;
        grad[2] = mu * (1.0 - mu) * d_mu + (1.0 - 2.0 * mu);
        lp
    }
}

/// Fits the expected-successes-per-action model from summed expected
/// successes and attempts. Players need positive attempts and a positive
/// expected sum. Player draws are per-action rates in (0, 1).
pub fn fit_expected_model(expected: &[f64], attempts: &[f64], config: &FitConfig) -> Result<ModelFit> {
    if expected.len() != attempts.len() {
        return Err(ModelError::shape(format!(
            "xSpA model needs equal-length expected sums and attempts, got {} and {}",
            expected.len(),
            attempts.len()
        )));
    }

    let observed = expected
        .iter()
        .zip(attempts)
        .map(|(x, n)| *n > 0.0 && n.is_finite() && *x > 0.0 && x.is_finite())
        .collect::<Vec<_>>();
    let rows = observed_rows(&observed);
    if rows.is_empty() {
        return Err(ModelError::shape(
            "xSpA model has no player with positive attempts and expected successes",
        ));
    }

    let rates = rows
        .iter()
        .map(|&r| expected[r] / attempts[r])
        .collect::<Vec<_>>();
    if let Some(pos) = rates.iter().position(|r| *r >= 1.0) {
        return Err(ModelError::numerical(
            MODEL,
            format!(
                "row {} has {} expected successes from {} attempts; the per-action rate must be below 1",
                rows[pos], expected[rows[pos]], attempts[rows[pos]]
            ),
        ));
    }

    let density = ExpectedDensity {
        rates,
        attempts: rows.iter().map(|&r| attempts[r]).collect(),
    };
    let n = rows.len();
    info!(model = MODEL, players = n, iterations = config.iterations, "fitting");

    let mut rng = StdRng::seed_from_u64(config.seed ^ SEED_SALT);
    let (q, trace) = advi::fit(MODEL, &density, config, &mut rng)?;

    let columns = q.sample_block(HYPER, n, config.draws, &mut rng, sigmoid);
    let samples = SampleMatrix::from_columns(config.draws, columns)?;
    let v_pop = q.sample_coordinate(0, config.draws, &mut rng, f64::exp);
    let v_obs = q.sample_coordinate(1, config.draws, &mut rng, f64::exp);
    let mus = q.sample_coordinate(2, config.draws, &mut rng, sigmoid);
    let population = v_pop
        .into_iter()
        .zip(v_obs)
        .zip(mus)
        .map(|((v_pop, v_obs), mu)| ExpectedHyper { v_pop, v_obs, mu })
        .collect::<Vec<_>>();

    if population
        .iter()
        .any(|h| !h.v_pop.is_finite() || !h.v_obs.is_finite())
    {
        return Err(ModelError::numerical(MODEL, "population draws overflowed"));
    }

    info!(model = MODEL, players = n, elbo = trace.final_elbo, "fit complete");
    Ok(ModelFit::Expected(ExpectedFit {
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
        let density = ExpectedDensity {
            rates: vec![0.08, 0.15, 0.11],
            attempts: vec![40.0, 12.0, 75.0],
        };
        let theta = vec![2.5, 0.3, -2.0, -2.4, -1.6, -2.1];
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
    fn rate_of_one_is_rejected_before_fitting() {
        let err = fit_expected_model(&[3.0, 1.0], &[3.0, 10.0], &FitConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::NumericalFit { model: "xSpA", .. }));
    }

    #[test]
    fn draws_stay_inside_unit_interval() {
        let cfg = FitConfig::default().with_budget(2_000, 200);
        let fit = fit_expected_model(&[4.2, 0.0, 1.1, 2.5], &[38.0, 5.0, 14.0, 22.0], &cfg).unwrap();
        assert_eq!(fit.observed(), &[true, false, true, true]);
        assert!(fit.samples().flat().iter().all(|p| *p > 0.0 && *p < 1.0));
    }
}
