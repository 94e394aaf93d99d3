//! Per-player percentile histograms and credible intervals.
//!
//! A player's draws are pushed through the population CDF of their model;
//! the histogram of those CDF values is the shading profile of one radar
//! wedge. Closed-form CDFs use posterior-mean hyperparameters. The derived
//! models (per-90 products, adjusted passing) have no closed form and use an
//! empirical CDF over a fixed-size resample of every draw of every player.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, ContinuousCDF, Gamma};

use crate::config::FitConfig;
use crate::error::{ModelError, Result};
use crate::fit::{ModelFit, ModelKind, observed_rows};
use crate::special::{mean, quantile_sorted};

const SEED_SALT: u64 = 0xec0f_5a11;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub counts: Vec<usize>,
    pub edges: Vec<f64>,
}

impl Histogram {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn intensities(&self) -> Vec<f64> {
        let max = self.counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return vec![0.0; self.counts.len()];
        }
        self.counts
            .iter()
            .map(|c| *c as f64 / max as f64)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CdfReference {
    Gamma { shape: f64, rate: f64 },
    Beta { alpha: f64, beta: f64 },
    Empirical { pool: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub player_index: usize,
    pub histogram: Histogram,
    /// Lower, central and upper quantile of the player's draws, in the
    /// model's own units.
    pub quantiles: [f64; 3],
    pub reference: CdfReference,
}

#[derive(Debug, Clone)]
pub enum PopulationCdf {
    Gamma(Gamma),
    /// `scale` maps draws back to the unit interval (success draws are
    /// percentages).
    Beta { dist: Beta, scale: f64 },
    Empirical(Vec<f64>),
}

impl PopulationCdf {
    pub fn for_fit(fit: &ModelFit, config: &FitConfig) -> Result<Self> {
        match fit {
            ModelFit::Count(f) => {
                let beta = mean(&f.population.iter().map(|h| h.beta).collect::<Vec<_>>());
                let mu = mean(&f.population.iter().map(|h| h.mu).collect::<Vec<_>>());
                // draws are per 90 minutes, the population is per minute
                let dist = Gamma::new(mu * beta, beta / 90.0).map_err(|e| {
                    ModelError::numerical("count", format!("population Gamma(shape={}, rate={}): {e}", mu * beta, beta / 90.0))
                })?;
                Ok(PopulationCdf::Gamma(dist))
            }
            ModelFit::Success(f) => {
                let alpha = mean(&f.population.iter().map(|h| h.alpha).collect::<Vec<_>>());
                let beta = mean(&f.population.iter().map(|h| h.beta).collect::<Vec<_>>());
                let dist = Beta::new(alpha, beta).map_err(|e| {
                    ModelError::numerical("success_rate", format!("population Beta({alpha}, {beta}): {e}"))
                })?;
                Ok(PopulationCdf::Beta { dist, scale: 0.01 })
            }
            ModelFit::Expected(f) => {
                let v = mean(&f.population.iter().map(|h| h.v_pop).collect::<Vec<_>>());
                let mu = mean(&f.population.iter().map(|h| h.mu).collect::<Vec<_>>());
                let (alpha, beta) = (mu * v, (1.0 - mu) * v);
                let dist = Beta::new(alpha, beta).map_err(|e| {
                    ModelError::numerical("xSpA", format!("population Beta({alpha}, {beta}): {e}"))
                })?;
                Ok(PopulationCdf::Beta { dist, scale: 1.0 })
            }
            ModelFit::ExpectedPer90(_) | ModelFit::AdjPass(_) => {
                let flat = fit.samples().flat();
                if flat.is_empty() {
                    return Err(ModelError::shape(format!(
                        "{} fit has no draws to build an empirical CDF from",
                        fit.kind()
                    )));
                }
                let salt = match fit.kind() {
                    ModelKind::AdjPass => SEED_SALT.rotate_left(7),
                    _ => SEED_SALT,
                };
                let mut rng = StdRng::seed_from_u64(config.seed ^ salt);
                let mut pool = (0..config.ecdf_pool.max(1))
                    .filter_map(|_| flat.choose(&mut rng).copied())
                    .collect::<Vec<_>>();
                pool.sort_by(|a, b| a.total_cmp(b));
                Ok(PopulationCdf::Empirical(pool))
            }
        }
    }

    pub fn cdf(&self, x: f64) -> f64 {
        match self {
            PopulationCdf::Gamma(d) => d.cdf(x),
            PopulationCdf::Beta { dist, scale } => dist.cdf(x * scale),
            PopulationCdf::Empirical(pool) => {
                pool.partition_point(|s| *s < x) as f64 / pool.len() as f64
            }
        }
    }

    pub fn reference(&self) -> CdfReference {
        match self {
            PopulationCdf::Gamma(d) => CdfReference::Gamma {
                shape: d.shape(),
                rate: d.rate(),
            },
            PopulationCdf::Beta { dist, .. } => CdfReference::Beta {
                alpha: dist.shape_a(),
                beta: dist.shape_b(),
            },
            PopulationCdf::Empirical(pool) => CdfReference::Empirical { pool: pool.len() },
        }
    }
}

pub fn quantile_levels(kind: ModelKind, config: &FitConfig) -> [f64; 3] {
    match kind {
        ModelKind::Count => config.count_quantiles,
        _ => config.interval_quantiles,
    }
}

/// Fails with `UnknownPlayer` if the model filtered that player out.
pub fn summarize(fit: &ModelFit, player_index: usize, config: &FitConfig) -> Result<PlayerSummary> {
    let draws = fit.player_samples(player_index)?;
    let cdf = PopulationCdf::for_fit(fit, config)?;
    Ok(summarize_with(fit.kind(), &cdf, player_index, draws, config))
}

pub fn summarize_all(fit: &ModelFit, config: &FitConfig) -> Result<Vec<PlayerSummary>> {
    let cdf = PopulationCdf::for_fit(fit, config)?;
    let kind = fit.kind();
    let rows = observed_rows(fit.observed());
    let out = rows
        .par_iter()
        .enumerate()
        .map(|(col, &row)| summarize_with(kind, &cdf, row, fit.samples().column(col), config))
        .collect();
    Ok(out)
}

fn summarize_with(
    kind: ModelKind,
    cdf: &PopulationCdf,
    player_index: usize,
    draws: &[f64],
    config: &FitConfig,
) -> PlayerSummary {
    let ranks = draws.iter().map(|x| cdf.cdf(*x)).collect::<Vec<_>>();
    let histogram = histogram(&ranks, config.hist_bins);

    let mut sorted = draws.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let levels = quantile_levels(kind, config);
    let quantiles = levels.map(|p| quantile_sorted(&sorted, p));

    PlayerSummary {
        player_index,
        histogram,
        quantiles,
        reference: cdf.reference(),
    }
}

/// Equal-width histogram over `[min, max]` of `values` (widened by 0.5 on
/// each side when all values coincide). The last bin is closed on the
/// right. Non-finite values are skipped.
pub fn histogram(values: &[f64], bins: usize) -> Histogram {
    let bins = bins.max(1);
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (mut lo, mut hi) = finite.clone().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if lo > hi {
        lo = 0.0;
        hi = 1.0;
    } else if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = (hi - lo) / bins as f64;
    let mut edges = (0..=bins).map(|k| lo + width * k as f64).collect::<Vec<_>>();
    edges[bins] = hi;
    let mut counts = vec![0usize; bins];
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Histogram { counts, edges }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_spans_data_range_and_keeps_every_value() {
        let h = histogram(&[0.2, 0.4, 0.4, 0.9], 5);
        assert_eq!(h.edges.len(), 6);
        assert!((h.edges[0] - 0.2).abs() < 1e-12);
        assert!((h.edges[5] - 0.9).abs() < 1e-12);
        assert_eq!(h.total(), 4);
        assert_eq!(h.counts[4], 1);
    }

    #[test]
    fn degenerate_histogram_is_widened() {
        let h = histogram(&[1.0, 1.0, 1.0], 2);
        assert_eq!(h.edges, vec![0.5, 1.0, 1.5]);
        assert_eq!(h.counts, vec![0, 3]);
    }

    #[test]
    fn intensities_are_relative_to_fullest_bin() {
        let h = Histogram {
            counts: vec![1, 4, 2],
            edges: vec![0.0, 1.0, 2.0, 3.0],
        };
        assert_eq!(h.intensities(), vec![0.25, 1.0, 0.5]);
    }
}
