//! Labelled collection of fitted models over one player table.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::FitConfig;
use crate::dispatch::{EstimatorKind, ModelInput, estimate_kind};
use crate::error::{ModelError, Result};
use crate::fit::ModelFit;
use crate::radar::{DEFAULT_SUBTITLE, RadarChart, RadarHeader};
use crate::summarize::summarize;
use crate::table::PlayerTable;

/// One side of a model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// A table column, or for `xSp90` the label of a model already in the book.
    Name(String),
    /// Raw per-player values, one per table row.
    Values(Vec<f64>),
    /// `[long, total]` column names for `adj_pass`.
    Names(Vec<String>),
}

impl From<&str> for Operand {
    fn from(name: &str) -> Self {
        Operand::Name(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub label: String,
    pub kind: String,
    pub a: Operand,
    pub b: Operand,
}

impl ModelRequest {
    pub fn new(label: &str, kind: &str, a: impl Into<Operand>, b: impl Into<Operand>) -> Self {
        Self {
            label: label.to_string(),
            kind: kind.to_string(),
            a: a.into(),
            b: b.into(),
        }
    }

    /// `adj_pass` request from `[long, total]` completion and attempt columns.
    pub fn adj_pass(label: &str, completed: [&str; 2], attempted: [&str; 2]) -> Self {
        let names = |pair: [&str; 2]| Operand::Names(pair.iter().map(|s| s.to_string()).collect());
        Self {
            label: label.to_string(),
            kind: EstimatorKind::AdjPass.as_str().to_string(),
            a: names(completed),
            b: names(attempted),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelBook {
    table: PlayerTable,
    league_season: String,
    subtitle: String,
    /// Insertion order.
    models: Vec<(String, ModelFit)>,
    index: HashMap<String, usize>,
}

impl ModelBook {
    pub fn new(table: PlayerTable, league_season: impl Into<String>) -> Self {
        Self {
            table,
            league_season: league_season.into(),
            subtitle: DEFAULT_SUBTITLE.to_string(),
            models: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = subtitle.into();
        self
    }

    pub fn table(&self) -> &PlayerTable {
        &self.table
    }

    pub fn subtitle(&self) -> &str {
        &self.subtitle
    }

    pub fn league_season(&self) -> &str {
        &self.league_season
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.models.iter().map(|(l, _)| l.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelFit)> {
        self.models.iter().map(|(l, f)| (l.as_str(), f))
    }

    pub fn get_model(&self, label: &str) -> Result<&ModelFit> {
        self.index
            .get(label)
            .map(|pos| &self.models[*pos].1)
            .ok_or_else(|| ModelError::UnknownLabel(label.to_string()))
    }

    pub fn delete_model(&mut self, label: &str) -> Result<ModelFit> {
        let pos = self
            .index
            .remove(label)
            .ok_or_else(|| ModelError::UnknownLabel(label.to_string()))?;
        let (_, fit) = self.models.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        info!(label, remaining = self.models.len(), "model deleted");
        Ok(fit)
    }

    /// Inserts an already fitted model. The fit must cover this book's table.
    pub fn insert(&mut self, label: &str, fit: ModelFit) -> Result<()> {
        self.check_label(label)?;
        if fit.observed().len() != self.table.len() {
            return Err(ModelError::shape(format!(
                "model '{label}' covers {} rows, the table has {}",
                fit.observed().len(),
                self.table.len()
            )));
        }
        fit.validate()?;
        self.push(label.to_string(), fit);
        Ok(())
    }

    /// Fits `request` and appends it. The book is unchanged if anything
    /// fails.
    pub fn add_model(&mut self, request: &ModelRequest, config: &FitConfig) -> Result<&ModelFit> {
        self.check_label(&request.label)?;
        let kind = request.kind.parse::<EstimatorKind>()?;
        let fit = self.fit_request(request, kind, config)?;
        info!(
            label = %request.label,
            kind = %kind,
            players = fit.observed_count(),
            "model added"
        );
        self.push(request.label.clone(), fit);
        Ok(&self.models[self.models.len() - 1].1)
    }

    /// Fits every request, running the ones that read table columns in
    /// parallel. `xSp90` requests are combined afterwards so they may refer to
    /// models from the same batch. Models are appended in request order; the
    /// first failure stops the batch and nothing from it is kept.
    pub fn add_models_parallel(&mut self, requests: &[ModelRequest], config: &FitConfig) -> Result<()> {
        let mut kinds = Vec::with_capacity(requests.len());
        for (idx, request) in requests.iter().enumerate() {
            self.check_label(&request.label)?;
            if requests[..idx].iter().any(|r| r.label == request.label) {
                return Err(ModelError::DuplicateLabel(request.label.clone()));
            }
            kinds.push(request.kind.parse::<EstimatorKind>()?);
        }

        let raw = requests
            .par_iter()
            .zip(kinds.par_iter())
            .map(|(request, kind)| match kind {
                EstimatorKind::XSp90 => None,
                _ => Some(self.fit_request(request, *kind, config)),
            })
            .collect::<Vec<_>>();

        let before = self.models.len();
        for ((request, kind), fitted) in requests.iter().zip(&kinds).zip(raw) {
            let fit = match fitted {
                Some(fit) => fit,
                None => self.fit_request(request, *kind, config),
            };
            match fit {
                Ok(fit) => self.push(request.label.clone(), fit),
                Err(err) => {
                    warn!(label = %request.label, error = %err, "batch fit failed");
                    for (label, _) in self.models.drain(before..) {
                        self.index.remove(&label);
                    }
                    return Err(err);
                }
            }
        }
        info!(added = requests.len(), total = self.models.len(), "batch added");
        Ok(())
    }

    /// Radar data for the first player called `player_name`, one wedge per
    /// model in insertion order.
    pub fn radar(&self, player_name: &str, config: &FitConfig) -> Result<RadarChart> {
        if self.models.is_empty() {
            return Err(ModelError::shape("the book has no models to draw"));
        }
        let idx = self.table.player_index(player_name)?;
        let minutes = self.table.minutes()?[idx];
        let summaries = self
            .models
            .iter()
            .map(|(label, fit)| Ok((label.clone(), summarize(fit, idx, config)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(RadarChart::build(
            RadarHeader {
                player: &self.table.players()[idx],
                squad: &self.table.squads()[idx],
                player_index: idx,
                minutes,
                league_season: &self.league_season,
                subtitle: &self.subtitle,
            },
            summaries,
        ))
    }

    fn push(&mut self, label: String, fit: ModelFit) {
        self.index.insert(label.clone(), self.models.len());
        self.models.push((label, fit));
    }

    fn check_label(&self, label: &str) -> Result<()> {
        if self.index.contains_key(label) {
            return Err(ModelError::DuplicateLabel(label.to_string()));
        }
        Ok(())
    }

    fn fit_request(&self, request: &ModelRequest, kind: EstimatorKind, config: &FitConfig) -> Result<ModelFit> {
        match kind {
            EstimatorKind::XSp90 => {
                let expected = self.get_model(label_operand(&request.a)?)?;
                let count = self.get_model(label_operand(&request.b)?)?;
                estimate_kind(ModelInput::Fits(expected, count), kind, config)
            }
            EstimatorKind::AdjPass => {
                let completed = self.pair_operand(&request.a)?;
                let attempted = self.pair_operand(&request.b)?;
                estimate_kind(ModelInput::Pairs(completed, attempted), kind, config)
            }
            _ => {
                let a = self.column_operand(&request.a)?;
                let b = self.column_operand(&request.b)?;
                estimate_kind(ModelInput::Columns(a, b), kind, config)
            }
        }
    }

    fn column_operand<'a>(&'a self, op: &'a Operand) -> Result<&'a [f64]> {
        match op {
            Operand::Name(name) => self.table.column(name),
            Operand::Values(values) if values.len() == self.table.len() => Ok(values),
            Operand::Values(values) => Err(ModelError::shape(format!(
                "{} raw values for a table of {} players",
                values.len(),
                self.table.len()
            ))),
            Operand::Names(_) => Err(ModelError::shape("expected one column name, got a list")),
        }
    }

    fn pair_operand<'a>(&'a self, op: &'a Operand) -> Result<[&'a [f64]; 2]> {
        match op {
            Operand::Names(names) if names.len() == 2 => {
                Ok([self.table.column(&names[0])?, self.table.column(&names[1])?])
            }
            _ => Err(ModelError::shape(
                "adj_pass operands must each name two columns, [long, total]",
            )),
        }
    }
}

fn label_operand(op: &Operand) -> Result<&str> {
    match op {
        Operand::Name(label) => Ok(label),
        _ => Err(ModelError::shape(
            "xSp90 operands must be labels of models already in the book",
        )),
    }
}
