//! Pass completion adjusted for how often a player goes long.
//!
//! ```text
//! p(αₛ, βₛ), p(αₗ, βₗ) ∝ (α + β)^(-5/2)
//! λₛᵢ ~ Beta(αₛ, βₛ)                      short-pass skill
//! λₗᵢ ~ Beta(αₗ, βₗ)                      long-specific factor
//! shortCmpᵢ ~ Binomial(shortAttᵢ, λₛᵢ)
//! longCmpᵢ  ~ Binomial(longAttᵢ,  λₛᵢ·λₗᵢ)
//! ```
//!
//! The reported rate is `t·λₗ + (1 − t)·λₛ` where `t` is the mean share of
//! long attempts across observed players, a fixed scalar taken from the
//! data.
//!
//! Unconstrained layout:
//! `[ln αₛ, ln βₛ, ln αₗ, ln βₗ, logit λₛ₁ … logit λₛₙ, logit λₗ₁ … logit λₗₙ]`.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::advi::{self, LogDensity};
use crate::config::FitConfig;
use crate::error::{ModelError, Result};
use crate::fit::{AdjPassFit, BetaHyper, ModelFit, PassHyper, observed_rows};
use crate::samples::SampleMatrix;
use crate::special::{ln_sigmoid_pair, logit, mean, sigmoid};
use crate::success_model::{BetaBinomialTerms, beta_moment_start, smoothed_rates};

const MODEL: &str = "adj_pass";
const SEED_SALT: u64 = 0x0ad7_9a55;
const HYPER: usize = 4;
const INPUT_HINT: &str = "the inputs should be [successful long passes, total successful passes] and [attempted long passes, total attempted passes]";

/// Completed and attempted passes, long and total, one value per player.
#[derive(Debug, Clone, Copy)]
pub struct PassColumns<'a> {
    pub long_completed: &'a [f64],
    pub total_completed: &'a [f64],
    pub long_attempted: &'a [f64],
    pub total_attempted: &'a [f64],
}

impl<'a> PassColumns<'a> {
    /// Builds the columns from `[long, total]` completions and
    /// `[long, total]` attempts.
    pub fn from_pairs(completed: [&'a [f64]; 2], attempted: [&'a [f64]; 2]) -> Self {
        Self {
            long_completed: completed[0],
            total_completed: completed[1],
            long_attempted: attempted[0],
            total_attempted: attempted[1],
        }
    }

    fn len(&self) -> Result<usize> {
        let n = self.long_completed.len();
        let lens = [
            self.total_completed.len(),
            self.long_attempted.len(),
            self.total_attempted.len(),
        ];
        if lens.iter().any(|l| *l != n) {
            return Err(ModelError::shape(format!(
                "{INPUT_HINT}; got columns of lengths {n}, {}, {} and {}",
                lens[0], lens[1], lens[2]
            )));
        }
        Ok(n)
    }
}

struct AdjPassDensity {
    short_completed: Vec<f64>,
    short_attempted: Vec<f64>,
    long_completed: Vec<f64>,
    long_attempted: Vec<f64>,
    zeros: Vec<f64>,
}

impl AdjPassDensity {
    fn players(&self) -> usize {
        self.long_completed.len()
    }
}

impl LogDensity for AdjPassDensity {
    fn dim(&self) -> usize {
        HYPER + 2 * self.players()
    }

    fn initial_point(&self) -> Vec<f64> {
        let short_rates = smoothed_rates(&self.short_completed, &self.short_attempted);
        let long_rates = smoothed_rates(&self.long_completed, &self.long_attempted);
        let factors = long_rates
            .iter()
            .zip(&short_rates)
            .map(|(l, s)| (l / s).clamp(1e-3, 1.0 - 1e-3))
            .collect::<Vec<_>>();

        let mut theta = Vec::with_capacity(self.dim());
        theta.extend(beta_moment_start(&short_rates));
        theta.extend(beta_moment_start(&factors));
        theta.extend(short_rates.iter().map(|r| logit(r.clamp(1e-4, 1.0 - 1e-4))));
        theta.extend(factors.iter().map(|r| logit(*r)));
        theta
    }

    fn log_density_grad(&self, theta: &[f64], grad: &mut [f64]) -> f64 {
        let n = self.players();
        let (grad_hyper, grad_players) = grad.split_at_mut(HYPER);
        let (grad_short_hyper, grad_long_hyper) = grad_hyper.split_at_mut(2);
        let (grad_short, grad_long) = grad_players.split_at_mut(n);
        let short_theta = &theta[HYPER..HYPER + n];
        let long_theta = &theta[HYPER + n..];

        let short = BetaBinomialTerms {
            successes: &self.short_completed,
            attempts: &self.short_attempted,
        };
        // the long factor is only observed through the product below
        let long = BetaBinomialTerms {
            successes: &self.zeros,
            attempts: &self.zeros,
        };
        let mut lp = short.accumulate(&theta[..2], short_theta, grad_short_hyper, grad_short);
        lp += long.accumulate(&theta[2..HYPER], long_theta, grad_long_hyper, grad_long);

        for i in 0..n {
            let (us, ul) = (short_theta[i], long_theta[i]);
            let (ps, pl) = (sigmoid(us), sigmoid(ul));
            let p = ps * pl;
            let ln_p = ln_sigmoid_pair(us).0 + ln_sigmoid_pair(ul).0;
            let ln_1m_p = (-p).ln_1p();
            let y = self.long_completed[i];
            let misses = self.long_attempted[i] - y;
            lp += y * ln_p + misses * ln_1m_p;

            let k = misses * p / (1.0 - p);
            grad_short[i] += (y - k) * (1.0 - ps);
            grad_long[i] += (y - k) * (1.0 - pl);
        }
        lp
    }
}

/// Fits the adjusted-pass model. Players need at least one completed long
/// pass and finite attempt counts; short-pass figures are `total - long`.
pub fn fit_adj_pass_model(passes: PassColumns<'_>, config: &FitConfig) -> Result<ModelFit> {
    let len = passes.len()?;
    let observed = (0..len)
        .map(|i| passes.long_completed[i] > 0.0 && passes.long_attempted[i].is_finite())
        .collect::<Vec<_>>();
    let rows = observed_rows(&observed);
    if rows.is_empty() {
        return Err(ModelError::shape(format!(
            "adj_pass model has no player with a completed long pass; {INPUT_HINT}"
        )));
    }

    let mut density = AdjPassDensity {
        short_completed: Vec::with_capacity(rows.len()),
        short_attempted: Vec::with_capacity(rows.len()),
        long_completed: Vec::with_capacity(rows.len()),
        long_attempted: Vec::with_capacity(rows.len()),
        zeros: vec![0.0; rows.len()],
    };
    let mut tendencies = Vec::with_capacity(rows.len());
    for &row in &rows {
        let long_cmp = passes.long_completed[row];
        let long_att = passes.long_attempted[row];
        let total_cmp = passes.total_completed[row];
        let total_att = passes.total_attempted[row];
        let short_cmp = total_cmp - long_cmp;
        let short_att = total_att - long_att;
        let consistent = [long_cmp, long_att, total_cmp, total_att]
            .iter()
            .all(|v| v.is_finite())
            && long_cmp <= long_att
            && short_cmp >= 0.0
            && short_att >= 0.0
            && short_cmp <= short_att;
        if !consistent {
            return Err(ModelError::shape(format!(
                "row {row} has long {long_cmp}/{long_att} and total {total_cmp}/{total_att} completed/attempted; {INPUT_HINT}"
            )));
        }
        density.short_completed.push(short_cmp);
        density.short_attempted.push(short_att);
        density.long_completed.push(long_cmp);
        density.long_attempted.push(long_att);
        tendencies.push(long_att / total_att);
    }
    let long_tendency = mean(&tendencies);

    let n = rows.len();
    info!(
        model = MODEL,
        players = n,
        long_tendency,
        iterations = config.iterations,
        "fitting"
    );

    let mut rng = StdRng::seed_from_u64(config.seed ^ SEED_SALT);
    let (q, trace) = advi::fit(MODEL, &density, config, &mut rng)?;

    let draws = config.draws;
    let short = q.sample_block(HYPER, n, draws, &mut rng, sigmoid);
    let long = q.sample_block(HYPER + n, n, draws, &mut rng, sigmoid);
    let short_means = short.iter().map(|c| mean(c)).collect::<Vec<_>>();
    let long_means = long.iter().map(|c| mean(c)).collect::<Vec<_>>();
    let blended = short
        .iter()
        .zip(&long)
        .map(|(s, l)| {
            s.iter()
                .zip(l)
                .map(|(s, l)| long_tendency * l + (1.0 - long_tendency) * s)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    let samples = SampleMatrix::from_columns(draws, blended)?;

    let hyper = (0..HYPER)
        .map(|idx| q.sample_coordinate(idx, draws, &mut rng, f64::exp))
        .collect::<Vec<_>>();
    let population = (0..draws)
        .map(|k| PassHyper {
            short: BetaHyper {
                alpha: hyper[0][k],
                beta: hyper[1][k],
            },
            long: BetaHyper {
                alpha: hyper[2][k],
                beta: hyper[3][k],
            },
        })
        .collect::<Vec<_>>();

    info!(model = MODEL, players = n, elbo = trace.final_elbo, "fit complete");
    Ok(ModelFit::AdjPass(AdjPassFit {
        samples,
        population,
        observed,
        long_tendency,
        short_means,
        long_means,
        trace,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn density() -> AdjPassDensity {
        AdjPassDensity {
            short_completed: vec![15.0, 12.0],
            short_attempted: vec![30.0, 22.0],
            long_completed: vec![5.0, 3.0],
            long_attempted: vec![10.0, 8.0],
            zeros: vec![0.0; 2],
        }
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let d = density();
        let theta = vec![0.9, 0.6, 1.4, 0.2, 0.1, 0.4, 0.7, -0.3];
        let mut grad = vec![0.0; theta.len()];
        d.log_density_grad(&theta, &mut grad);
        let mut scratch = vec![0.0; theta.len()];
        for i in 0..theta.len() {
            let h = 1e-6;
            let mut up = theta.clone();
            let mut down = theta.clone();
            up[i] += h;
            down[i] -= h;
            let fd = (d.log_density_grad(&up, &mut scratch) - d.log_density_grad(&down, &mut scratch))
                / (2.0 * h);
            assert!((grad[i] - fd).abs() < 1e-3 * (1.0 + fd.abs()), "coord {i}: {} vs {fd}", grad[i]);
        }
    }

    #[test]
    fn ragged_columns_are_a_shape_error() {
        let passes = PassColumns::from_pairs([&[5.0, 3.0], &[20.0]], [&[10.0, 8.0], &[40.0, 30.0]]);
        let err = fit_adj_pass_model(passes, &FitConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::InputShape(_)));
    }

    #[test]
    fn long_completions_above_attempts_are_a_shape_error() {
        let passes = PassColumns::from_pairs([&[12.0], &[20.0]], [&[10.0], &[40.0]]);
        let err = fit_adj_pass_model(passes, &FitConfig::default()).unwrap_err();
        assert!(err.to_string().contains("attempted long passes"));
    }
}
