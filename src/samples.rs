use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Posterior draws, one column per observed player.
///
/// Stored column-major so a single player's draws are contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSampleMatrix")]
pub struct SampleMatrix {
    draws: usize,
    columns: usize,
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct RawSampleMatrix {
    draws: usize,
    columns: usize,
    values: Vec<f64>,
}

impl TryFrom<RawSampleMatrix> for SampleMatrix {
    type Error = ModelError;

    fn try_from(raw: RawSampleMatrix) -> Result<Self> {
        let cells = raw.draws.checked_mul(raw.columns);
        if cells != Some(raw.values.len()) {
            return Err(ModelError::shape(format!(
                "sample matrix of {} draws x {} columns holds {} values",
                raw.draws,
                raw.columns,
                raw.values.len()
            )));
        }
        Ok(Self {
            draws: raw.draws,
            columns: raw.columns,
            values: raw.values,
        })
    }
}

impl SampleMatrix {
    pub fn from_columns(draws: usize, columns: Vec<Vec<f64>>) -> Result<Self> {
        let n = columns.len();
        let mut values = Vec::with_capacity(draws * n);
        for (idx, col) in columns.into_iter().enumerate() {
            if col.len() != draws {
                return Err(ModelError::shape(format!(
                    "sample column {idx} has {} draws, expected {draws}",
                    col.len()
                )));
            }
            values.extend(col);
        }
        Ok(Self {
            draws,
            columns: n,
            values,
        })
    }

    pub fn draws(&self) -> usize {
        self.draws
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns == 0
    }

    pub fn column(&self, idx: usize) -> &[f64] {
        let start = idx * self.draws;
        &self.values[start..start + self.draws]
    }

    /// Every draw of every player, in column order.
    pub fn flat(&self) -> &[f64] {
        &self.values
    }

    pub fn all_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}
