use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ITERATIONS: usize = 30_000;
pub const DEFAULT_DRAWS: usize = 6_000;
pub const DEFAULT_ECDF_POOL: usize = 5_000;
pub const DEFAULT_HIST_BINS: usize = 25;
pub const DEFAULT_SEED: u64 = 20_190;

/// Knobs shared by every estimator and by the summarizer.
///
/// All models fitted into one book must use the same `draws`, otherwise the
/// wedges of a radar chart are built from histograms of different mass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FitConfig {
    pub iterations: usize,
    pub draws: usize,
    pub learning_rate: f64,
    pub gradient_draws: usize,
    pub initial_log_sd: f64,
    pub seed: u64,
    pub ecdf_pool: usize,
    pub hist_bins: usize,
    pub count_quantiles: [f64; 3],
    pub interval_quantiles: [f64; 3],
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            draws: DEFAULT_DRAWS,
            learning_rate: 0.01,
            gradient_draws: 1,
            initial_log_sd: -2.0,
            seed: DEFAULT_SEED,
            ecdf_pool: DEFAULT_ECDF_POOL,
            hist_bins: DEFAULT_HIST_BINS,
            count_quantiles: [0.125, 0.5, 0.875],
            interval_quantiles: [0.05, 0.5, 0.95],
        }
    }
}

impl FitConfig {
    /// Defaults overridden by `RADAR_*` variables from the process environment,
    /// `.env.local` and `.env` (first definition wins).
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");

        let mut cfg = Self::default();
        if let Some(v) = env_parse::<usize>("RADAR_FIT_ITERATIONS") {
            cfg.iterations = v.clamp(100, 1_000_000);
        }
        if let Some(v) = env_parse::<usize>("RADAR_FIT_DRAWS") {
            cfg.draws = v.clamp(100, 100_000);
        }
        if let Some(v) = env_parse::<u64>("RADAR_FIT_SEED") {
            cfg.seed = v;
        }
        if let Some(v) = env_parse::<f64>("RADAR_FIT_LEARNING_RATE")
            && v.is_finite()
        {
            cfg.learning_rate = v.clamp(1e-5, 0.5);
        }
        if let Some(v) = env_parse::<usize>("RADAR_ECDF_POOL") {
            cfg.ecdf_pool = v.clamp(100, 1_000_000);
        }
        if let Some(v) = env_parse::<usize>("RADAR_HIST_BINS") {
            cfg.hist_bins = v.clamp(2, 200);
        }
        cfg
    }

    /// Same settings with a smaller optimisation and sampling budget.
    pub fn with_budget(mut self, iterations: usize, draws: usize) -> Self {
        self.iterations = iterations.max(1);
        self.draws = draws.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|raw| raw.trim().parse::<T>().ok())
}
