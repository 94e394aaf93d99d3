use std::fmt;
use std::str::FromStr;

use crate::adj_pass_model::{PassColumns, fit_adj_pass_model};
use crate::config::FitConfig;
use crate::count_model::fit_count_model;
use crate::error::{ModelError, Result};
use crate::expected_model::fit_expected_model;
use crate::fit::ModelFit;
use crate::per90_model::combine_per90;
use crate::success_model::fit_success_model;

/// Estimator requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EstimatorKind {
    Count,
    SuccessRate,
    XSpA,
    XSp90,
    AdjPass,
}

impl EstimatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EstimatorKind::Count => "count",
            EstimatorKind::SuccessRate => "success_rate",
            EstimatorKind::XSpA => "xSpA",
            EstimatorKind::XSp90 => "xSp90",
            EstimatorKind::AdjPass => "adj_pass",
        }
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EstimatorKind {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim() {
            "count" => Ok(EstimatorKind::Count),
            "success_rate" => Ok(EstimatorKind::SuccessRate),
            "xSpA" => Ok(EstimatorKind::XSpA),
            "xSp90" => Ok(EstimatorKind::XSp90),
            "adj_pass" => Ok(EstimatorKind::AdjPass),
            other => Err(ModelError::UnsupportedModelKind(other.to_string())),
        }
    }
}

/// The two operands of an estimator call.
#[derive(Debug, Clone, Copy)]
pub enum ModelInput<'a> {
    /// Two parallel per-player columns.
    Columns(&'a [f64], &'a [f64]),
    /// `[long, total]` completions and `[long, total]` attempts.
    Pairs([&'a [f64]; 2], [&'a [f64]; 2]),
    /// Two previously fitted models.
    Fits(&'a ModelFit, &'a ModelFit),
}

impl ModelInput<'_> {
    fn describe(&self) -> &'static str {
        match self {
            ModelInput::Columns(..) => "two columns",
            ModelInput::Pairs(..) => "two column pairs",
            ModelInput::Fits(..) => "two fitted models",
        }
    }
}

/// Parses `kind` and runs the matching estimator. The kind is checked
/// before any input is looked at.
pub fn estimate(input: ModelInput<'_>, kind: &str, config: &FitConfig) -> Result<ModelFit> {
    let kind = kind.parse::<EstimatorKind>()?;
    estimate_kind(input, kind, config)
}

pub fn estimate_kind(input: ModelInput<'_>, kind: EstimatorKind, config: &FitConfig) -> Result<ModelFit> {
    match (kind, input) {
        (EstimatorKind::Count, ModelInput::Columns(counts, minutes)) => {
            fit_count_model(counts, minutes, config)
        }
        (EstimatorKind::SuccessRate, ModelInput::Columns(successes, attempts)) => {
            fit_success_model(successes, attempts, config)
        }
        (EstimatorKind::XSpA, ModelInput::Columns(expected, attempts)) => {
            fit_expected_model(expected, attempts, config)
        }
        (EstimatorKind::XSp90, ModelInput::Fits(expected, count)) => combine_per90(expected, count),
        (EstimatorKind::AdjPass, ModelInput::Pairs(completed, attempted)) => {
            fit_adj_pass_model(PassColumns::from_pairs(completed, attempted), config)
        }
        (EstimatorKind::XSp90, other) => Err(ModelError::shape(format!(
            "xSp90 takes two pre-estimated models, an 'xSpA' fit then a 'count' fit; got {}",
            other.describe()
        ))),
        (EstimatorKind::AdjPass, other) => Err(ModelError::shape(format!(
            "adj_pass takes [successful long passes, total successful passes] and [attempted long passes, total attempted passes]; got {}",
            other.describe()
        ))),
        (kind, other) => Err(ModelError::shape(format!(
            "{kind} takes two parallel columns; got {}",
            other.describe()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_fails_before_inputs_are_read() {
        // mismatched lengths would be a shape error if the inputs were read
        let err = estimate(ModelInput::Columns(&[1.0], &[]), "bogus", &FitConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedModelKind(ref k) if k == "bogus"));
    }

    #[test]
    fn tags_parse() {
        for tag in ["count", "success_rate", "xSpA", "xSp90", "adj_pass"] {
            assert_eq!(tag.parse::<EstimatorKind>().unwrap().as_str(), tag);
        }
    }

    #[test]
    fn per90_needs_fitted_models() {
        let err = estimate(
            ModelInput::Columns(&[1.0], &[90.0]),
            "xSp90",
            &FitConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InputShape(_)));
    }
}
