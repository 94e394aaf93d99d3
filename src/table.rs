//! Per-player season table: names, squads and numeric stat columns.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result as AnyResult, anyhow};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};

pub const PLAYER_COLUMN: &str = "Player";
pub const SQUAD_COLUMN: &str = "Squad";
pub const MINUTES_COLUMN: &str = "Minutes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerTable {
    players: Vec<String>,
    squads: Vec<String>,
    /// Numeric columns in first-seen order. Missing values are NaN.
    #[serde(with = "nan_as_null")]
    columns: Vec<(String, Vec<f64>)>,
}

impl PlayerTable {
    pub fn new(players: Vec<String>, squads: Vec<String>) -> Result<Self> {
        if players.len() != squads.len() {
            return Err(ModelError::shape(format!(
                "{} player names but {} squads",
                players.len(),
                squads.len()
            )));
        }
        Ok(Self {
            players,
            squads,
            columns: Vec::new(),
        })
    }

    /// Adds or replaces a numeric column.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        let name = name.into();
        if values.len() != self.players.len() {
            return Err(ModelError::shape(format!(
                "column '{name}' has {} values for {} players",
                values.len(),
                self.players.len()
            )));
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = values,
            None => self.columns.push((name, values)),
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn squads(&self) -> &[String] {
        &self.squads
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| ModelError::UnknownColumn(name.to_string()))
    }

    pub fn minutes(&self) -> Result<&[f64]> {
        self.column(MINUTES_COLUMN)
    }

    /// First row whose player name matches exactly.
    pub fn player_index(&self, name: &str) -> Result<usize> {
        self.players
            .iter()
            .position(|p| p == name)
            .ok_or_else(|| ModelError::UnknownPlayerName(name.to_string()))
    }

    /// Loads a JSON array of row objects (`[{"Player": .., "Squad": .., "Cmp": 12, ..}]`).
    /// Non-numeric columns other than player and squad are dropped.
    pub fn from_json(path: &Path) -> AnyResult<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let rows = serde_json::from_str::<Vec<serde_json::Map<String, Value>>>(&raw)
            .with_context(|| format!("parse player rows from {}", path.display()))?;

        let mut builder = TableBuilder::default();
        for (idx, row) in rows.iter().enumerate() {
            builder.start_row();
            for (name, value) in row {
                let cell = match value {
                    Value::String(s) => Cell::Text(s.clone()),
                    Value::Number(n) => Cell::Number(n.as_f64().unwrap_or(f64::NAN)),
                    Value::Null => Cell::Missing,
                    _ => Cell::Other,
                };
                builder.push(name, cell);
            }
            builder
                .finish_row()
                .with_context(|| format!("row {idx} of {}", path.display()))?;
        }
        builder.build()
    }

    /// Loads a parquet file row by row.
    pub fn from_parquet(path: &Path) -> AnyResult<Self> {
        let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
        let reader = SerializedFileReader::new(file).context("open parquet reader player table")?;
        let iter = reader.get_row_iter(None).context("iterate player table rows")?;

        let mut builder = TableBuilder::default();
        for (idx, row) in iter.enumerate() {
            let row = row.with_context(|| format!("decode row {idx} of {}", path.display()))?;
            builder.start_row();
            for (name, field) in row.get_column_iter() {
                builder.push(name, field_cell(field));
            }
            builder
                .finish_row()
                .with_context(|| format!("row {idx} of {}", path.display()))?;
        }
        builder.build()
    }

    /// Picks the loader from the file extension.
    pub fn load(path: &Path) -> AnyResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("parquet") => Self::from_parquet(path),
            Some("json") => Self::from_json(path),
            other => Err(anyhow!(
                "unsupported table format {:?} for {}; use .parquet or .json",
                other.unwrap_or(""),
                path.display()
            )),
        }
    }
}

enum Cell {
    Text(String),
    Number(f64),
    Missing,
    Other,
}

fn field_cell(field: &Field) -> Cell {
    match field {
        Field::Null => Cell::Missing,
        Field::Str(s) => Cell::Text(s.clone()),
        Field::Double(v) => Cell::Number(*v),
        Field::Float(v) => Cell::Number(*v as f64),
        Field::Long(v) => Cell::Number(*v as f64),
        Field::Int(v) => Cell::Number(*v as f64),
        Field::Short(v) => Cell::Number(*v as f64),
        Field::Byte(v) => Cell::Number(*v as f64),
        Field::ULong(v) => Cell::Number(*v as f64),
        Field::UInt(v) => Cell::Number(*v as f64),
        Field::UShort(v) => Cell::Number(*v as f64),
        Field::UByte(v) => Cell::Number(*v as f64),
        Field::Bool(v) => Cell::Number(if *v { 1.0 } else { 0.0 }),
        _ => Cell::Other,
    }
}

/// Accumulates rows whose columns may arrive in any order or be absent.
#[derive(Default)]
struct TableBuilder {
    rows: usize,
    players: Vec<String>,
    squads: Vec<String>,
    player: Option<String>,
    squad: Option<String>,
    index: HashMap<String, usize>,
    columns: Vec<(String, Vec<f64>)>,
    /// Columns that held a value other than a number or null.
    non_numeric: Vec<bool>,
}

impl TableBuilder {
    fn start_row(&mut self) {
        self.player = None;
        self.squad = None;
    }

    fn push(&mut self, name: &str, cell: Cell) {
        if name == PLAYER_COLUMN || name == SQUAD_COLUMN {
            let text = match cell {
                Cell::Text(s) => s,
                Cell::Number(v) => v.to_string(),
                Cell::Missing | Cell::Other => String::new(),
            };
            if name == PLAYER_COLUMN {
                self.player = Some(text);
            } else {
                self.squad = Some(text);
            }
            return;
        }

        let col = match self.index.get(name) {
            Some(col) => *col,
            None => {
                self.index.insert(name.to_string(), self.columns.len());
                self.columns.push((name.to_string(), vec![f64::NAN; self.rows]));
                self.non_numeric.push(false);
                self.columns.len() - 1
            }
        };
        let value = match cell {
            Cell::Number(v) => v,
            Cell::Missing => f64::NAN,
            Cell::Text(_) | Cell::Other => {
                self.non_numeric[col] = true;
                f64::NAN
            }
        };
        let values = &mut self.columns[col].1;
        values.resize(self.rows, f64::NAN);
        values.push(value);
    }

    fn finish_row(&mut self) -> AnyResult<()> {
        let player = self
            .player
            .take()
            .ok_or_else(|| anyhow!("missing '{PLAYER_COLUMN}' column"))?;
        self.players.push(player);
        self.squads.push(self.squad.take().unwrap_or_default());
        self.rows += 1;
        for (_, values) in &mut self.columns {
            values.resize(self.rows, f64::NAN);
        }
        Ok(())
    }

    fn build(self) -> AnyResult<PlayerTable> {
        let columns = self
            .columns
            .into_iter()
            .zip(self.non_numeric)
            .filter_map(|(col, text)| (!text).then_some(col))
            .collect();
        Ok(PlayerTable {
            players: self.players,
            squads: self.squads,
            columns,
        })
    }
}

/// JSON has no NaN; missing values travel as `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    type Columns = Vec<(String, Vec<f64>)>;

    pub fn serialize<S: Serializer>(columns: &Columns, s: S) -> Result<S::Ok, S::Error> {
        columns
            .iter()
            .map(|(name, values)| {
                let values = values
                    .iter()
                    .map(|v| v.is_finite().then_some(*v))
                    .collect::<Vec<_>>();
                (name, values)
            })
            .collect::<Vec<_>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Columns, D::Error> {
        let raw = Vec::<(String, Vec<Option<f64>>)>::deserialize(d)?;
        Ok(raw
            .into_iter()
            .map(|(name, values)| (name, values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PlayerTable {
        PlayerTable::new(
            vec!["Rodri".into(), "Kroos".into(), "Rodri".into()],
            vec!["Man City".into(), "Real Madrid".into(), "Atletico".into()],
        )
        .unwrap()
        .with_column("Minutes", vec![2700.0, 1800.0, 90.0])
        .unwrap()
    }

    #[test]
    fn first_matching_player_wins() {
        assert_eq!(table().player_index("Rodri").unwrap(), 0);
        assert!(matches!(
            table().player_index("Busquets"),
            Err(ModelError::UnknownPlayerName(_))
        ));
    }

    #[test]
    fn unknown_column_is_reported_by_name() {
        let err = table().column("Cmp%").unwrap_err();
        assert_eq!(err.to_string(), "unknown column 'Cmp%'");
        assert_eq!(table().minutes().unwrap(), &[2700.0, 1800.0, 90.0]);
    }

    #[test]
    fn short_column_is_rejected() {
        let err = table().with_column("Att", vec![1.0]).unwrap_err();
        assert!(matches!(err, ModelError::InputShape(_)));
    }

    #[test]
    fn builder_drops_text_columns_and_fills_gaps() {
        let mut b = TableBuilder::default();
        b.start_row();
        b.push("Player", Cell::Text("A".into()));
        b.push("Pos", Cell::Text("MF".into()));
        b.push("Cmp", Cell::Number(10.0));
        b.finish_row().unwrap();
        b.start_row();
        b.push("Player", Cell::Text("B".into()));
        b.push("Att", Cell::Number(4.0));
        b.finish_row().unwrap();
        let t = b.build().unwrap();

        assert_eq!(t.column_names().collect::<Vec<_>>(), vec!["Cmp", "Att"]);
        let cmp = t.column("Cmp").unwrap();
        assert_eq!(cmp[0], 10.0);
        assert!(cmp[1].is_nan());
        let att = t.column("Att").unwrap();
        assert!(att[0].is_nan());
        assert_eq!(att[1], 4.0);
        assert_eq!(t.squads(), &["".to_string(), "".to_string()]);
    }

    #[test]
    fn missing_values_survive_json() {
        let t = table().with_column("xA", vec![0.4, f64::NAN, 1.2]).unwrap();
        let raw = serde_json::to_string(&t).unwrap();
        let back = serde_json::from_str::<PlayerTable>(&raw).unwrap();
        assert!(back.column("xA").unwrap()[1].is_nan());
        assert_eq!(back.column("xA").unwrap()[2], 1.2);
        assert_eq!(back.players(), t.players());
    }

    #[test]
    fn row_without_player_fails() {
        let mut b = TableBuilder::default();
        b.start_row();
        b.push("Cmp", Cell::Number(1.0));
        assert!(b.finish_row().is_err());
    }
}
