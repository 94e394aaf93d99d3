//! Expected successes per 90, derived from two fitted models without new
//! inference.

use tracing::info;

use crate::error::{ModelError, Result};
use crate::fit::{ModelFit, Per90Fit};
use crate::samples::SampleMatrix;

/// Multiplies, draw by draw, an expected-successes-per-action fit by an
/// actions-per-90 count fit.
///
/// The result covers the players observed by both parents; its columns
/// follow that intersection in table order. Draw `k` of a player is
/// `expected[k] * count[k]`, so the two posteriors are treated as
/// independent.
pub fn combine_per90(expected: &ModelFit, count: &ModelFit) -> Result<ModelFit> {
    let (ModelFit::Expected(x), ModelFit::Count(c)) = (expected, count) else {
        return Err(ModelError::shape(format!(
            "xSp90 takes an 'xSpA' fit followed by a 'count' fit, got '{}' and '{}'",
            expected.kind(),
            count.kind()
        )));
    };

    if x.observed.len() != c.observed.len() {
        return Err(ModelError::shape(format!(
            "xSp90 parents cover different tables ({} and {} rows)",
            x.observed.len(),
            c.observed.len()
        )));
    }
    let draws = x.samples.draws();
    if draws != c.samples.draws() {
        return Err(ModelError::shape(format!(
            "xSp90 parents have different draw counts ({draws} and {})",
            c.samples.draws()
        )));
    }

    let observed = x
        .observed
        .iter()
        .zip(&c.observed)
        .map(|(a, b)| *a && *b)
        .collect::<Vec<_>>();

    let mut columns = Vec::new();
    let (mut xi, mut ci) = (0usize, 0usize);
    for (in_x, in_c) in x.observed.iter().zip(&c.observed) {
        if *in_x && *in_c {
            let product = x
                .samples
                .column(xi)
                .iter()
                .zip(c.samples.column(ci))
                .map(|(p, n)| p * n)
                .collect::<Vec<_>>();
            columns.push(product);
        }
        if *in_x {
            xi += 1;
        }
        if *in_c {
            ci += 1;
        }
    }

    let samples = SampleMatrix::from_columns(draws, columns)?;
    info!(
        model = "xSp90",
        players = samples.columns(),
        "combined expected-per-action and count fits"
    );
    Ok(ModelFit::ExpectedPer90(Per90Fit { samples, observed }))
}
