use std::fmt;

use serde::{Deserialize, Serialize};

use crate::advi::FitTrace;
use crate::error::{ModelError, Result};
use crate::samples::SampleMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Count,
    Success,
    Expected,
    ExpectedPer90,
    AdjPass,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Count => "count",
            ModelKind::Success => "success",
            ModelKind::Expected => "expected",
            ModelKind::ExpectedPer90 => "expected_per90",
            ModelKind::AdjPass => "adj_pass",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Population draw of the count model: `λᵢ ~ Gamma(shape = μ·β, rate = β)`
/// with λ per minute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountHyper {
    pub beta: f64,
    pub mu: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaHyper {
    pub alpha: f64,
    pub beta: f64,
}

/// Population draw of the expected-success model: population mean `mu`,
/// population concentration `v_pop`, observation concentration `v_obs`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedHyper {
    pub v_pop: f64,
    pub v_obs: f64,
    pub mu: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassHyper {
    pub short: BetaHyper,
    pub long: BetaHyper,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountFit {
    pub samples: SampleMatrix,
    pub population: Vec<CountHyper>,
    pub observed: Vec<bool>,
    pub trace: FitTrace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessFit {
    pub samples: SampleMatrix,
    pub population: Vec<BetaHyper>,
    pub observed: Vec<bool>,
    pub trace: FitTrace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedFit {
    pub samples: SampleMatrix,
    pub population: Vec<ExpectedHyper>,
    pub observed: Vec<bool>,
    pub trace: FitTrace,
}

/// Expected successes per 90: the draw-wise product of an expected fit and a
/// count fit. Draw `k` of one player pairs draw `k` of both parents, which
/// treats the two separately fitted posteriors as independent. That is an
/// approximation, not a joint posterior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Per90Fit {
    pub samples: SampleMatrix,
    pub observed: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjPassFit {
    pub samples: SampleMatrix,
    pub population: Vec<PassHyper>,
    pub observed: Vec<bool>,
    /// Mean share of long attempts among observed players; the blend weight.
    pub long_tendency: f64,
    pub short_means: Vec<f64>,
    pub long_means: Vec<f64>,
    pub trace: FitTrace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelFit {
    Count(CountFit),
    Success(SuccessFit),
    Expected(ExpectedFit),
    ExpectedPer90(Per90Fit),
    AdjPass(AdjPassFit),
}

impl ModelFit {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelFit::Count(_) => ModelKind::Count,
            ModelFit::Success(_) => ModelKind::Success,
            ModelFit::Expected(_) => ModelKind::Expected,
            ModelFit::ExpectedPer90(_) => ModelKind::ExpectedPer90,
            ModelFit::AdjPass(_) => ModelKind::AdjPass,
        }
    }

    pub fn samples(&self) -> &SampleMatrix {
        match self {
            ModelFit::Count(f) => &f.samples,
            ModelFit::Success(f) => &f.samples,
            ModelFit::Expected(f) => &f.samples,
            ModelFit::ExpectedPer90(f) => &f.samples,
            ModelFit::AdjPass(f) => &f.samples,
        }
    }

    pub fn observed(&self) -> &[bool] {
        match self {
            ModelFit::Count(f) => &f.observed,
            ModelFit::Success(f) => &f.observed,
            ModelFit::Expected(f) => &f.observed,
            ModelFit::ExpectedPer90(f) => &f.observed,
            ModelFit::AdjPass(f) => &f.observed,
        }
    }

    pub fn observed_count(&self) -> usize {
        self.observed().iter().filter(|o| **o).count()
    }

    pub fn population_draws(&self) -> usize {
        match self {
            ModelFit::Count(f) => f.population.len(),
            ModelFit::Success(f) => f.population.len(),
            ModelFit::Expected(f) => f.population.len(),
            ModelFit::ExpectedPer90(_) => 0,
            ModelFit::AdjPass(f) => f.population.len(),
        }
    }

    pub fn trace(&self) -> Option<&FitTrace> {
        match self {
            ModelFit::Count(f) => Some(&f.trace),
            ModelFit::Success(f) => Some(&f.trace),
            ModelFit::Expected(f) => Some(&f.trace),
            ModelFit::ExpectedPer90(_) => None,
            ModelFit::AdjPass(f) => Some(&f.trace),
        }
    }

    /// `None` if the model filtered that player out.
    pub fn player_column(&self, player_index: usize) -> Option<usize> {
        column_for(self.observed(), player_index)
    }

    /// One sample column per observed player.
    pub fn validate(&self) -> Result<()> {
        let samples = self.samples();
        if samples.flat().len() != samples.draws() * samples.columns() {
            return Err(ModelError::shape(format!(
                "{} fit holds {} values for {} draws x {} columns",
                self.kind(),
                samples.flat().len(),
                samples.draws(),
                samples.columns()
            )));
        }
        let observed = self.observed_count();
        if samples.columns() != observed {
            return Err(ModelError::shape(format!(
                "{} fit has {} sample columns but {observed} observed players",
                self.kind(),
                samples.columns()
            )));
        }
        if let ModelFit::AdjPass(f) = self
            && (f.short_means.len() != observed || f.long_means.len() != observed)
        {
            return Err(ModelError::shape(format!(
                "adj_pass fit has {} short and {} long means for {observed} observed players",
                f.short_means.len(),
                f.long_means.len()
            )));
        }
        Ok(())
    }

    pub fn player_samples(&self, player_index: usize) -> Result<&[f64]> {
        let col = self
            .player_column(player_index)
            .ok_or(ModelError::UnknownPlayer {
                index: player_index,
            })?;
        Ok(self.samples().column(col))
    }
}

pub(crate) fn column_for(observed: &[bool], player_index: usize) -> Option<usize> {
    if !*observed.get(player_index)? {
        return None;
    }
    Some(observed[..player_index].iter().filter(|o| **o).count())
}

pub(crate) fn observed_rows(observed: &[bool]) -> Vec<usize> {
    observed
        .iter()
        .enumerate()
        .filter_map(|(idx, o)| o.then_some(idx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn per90(observed: Vec<bool>) -> ModelFit {
        let cols = observed.iter().filter(|o| **o).count();
        let columns = (0..cols).map(|c| vec![c as f64; 3]).collect();
        ModelFit::ExpectedPer90(Per90Fit {
            samples: SampleMatrix::from_columns(3, columns).unwrap(),
            observed,
        })
    }

    #[test]
    fn player_columns_skip_unobserved_rows() {
        let fit = per90(vec![true, false, true, true]);
        assert_eq!(fit.player_column(0), Some(0));
        assert_eq!(fit.player_column(1), None);
        assert_eq!(fit.player_column(3), Some(2));
        assert_eq!(fit.player_column(9), None);
        assert_eq!(fit.player_samples(2).unwrap(), &[1.0, 1.0, 1.0]);
    }

    #[test]
    fn unobserved_player_is_an_error() {
        let fit = per90(vec![true, false]);
        let err = fit.player_samples(1).unwrap_err();
        assert!(matches!(err, ModelError::UnknownPlayer { index: 1 }));
    }

    #[test]
    fn validate_rejects_column_count_mismatch() {
        assert!(per90(vec![true, false, true]).validate().is_ok());

        let fit = ModelFit::ExpectedPer90(Per90Fit {
            samples: SampleMatrix::from_columns(3, vec![vec![0.5; 3]]).unwrap(),
            observed: vec![true, true],
        });
        let err = fit.validate().unwrap_err();
        assert!(matches!(err, ModelError::InputShape(_)));
        assert!(err.to_string().contains("1 sample columns but 2 observed players"));
    }

    #[test]
    fn envelope_tags_are_read_back_through_serde() {
        for kind in [
            ModelKind::Count,
            ModelKind::Success,
            ModelKind::Expected,
            ModelKind::ExpectedPer90,
            ModelKind::AdjPass,
        ] {
            let raw = format!("\"{kind}\"");
            assert_eq!(serde_json::from_str::<ModelKind>(&raw).unwrap(), kind);
        }
        assert!(serde_json::from_str::<ModelKind>("\"success_rate\"").is_err());
    }
}
