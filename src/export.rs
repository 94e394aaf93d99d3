use std::fs;
use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use chrono::Utc;
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::FitConfig;
use crate::error::{ModelError, Result};
use crate::fit::ModelFit;
use crate::model_book::ModelBook;
use crate::radar::format_sig3;
use crate::summarize::summarize_all;
use crate::table::PlayerTable;

pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelledFit {
    pub label: String,
    pub fit: ModelFit,
}

/// Everything needed to rebuild a model book without refitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookArtifact {
    pub version: u32,
    pub generated_at: String,
    pub league_season: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    pub table: PlayerTable,
    #[serde(default)]
    pub models: Vec<LabelledFit>,
}

impl BookArtifact {
    pub fn from_book(book: &ModelBook) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            generated_at: Utc::now().to_rfc3339(),
            league_season: book.league_season().to_string(),
            subtitle: Some(book.subtitle().to_string()),
            table: book.table().clone(),
            models: book
                .iter()
                .map(|(label, fit)| LabelledFit {
                    label: label.to_string(),
                    fit: fit.clone(),
                })
                .collect(),
        }
    }

    pub fn into_book(self) -> Result<ModelBook> {
        let mut book = ModelBook::new(self.table, self.league_season);
        if let Some(subtitle) = self.subtitle {
            book = book.with_subtitle(subtitle);
        }
        for entry in self.models {
            book.insert(&entry.label, entry.fit)?;
        }
        Ok(book)
    }
}

pub fn save_artifact(path: &Path, book: &ModelBook) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir).map_err(|e| ModelError::io(format!("create {}", dir.display()), e))?;
    }
    let raw = serde_json::to_string(&BookArtifact::from_book(book))?;
    fs::write(path, raw).map_err(|e| ModelError::io(format!("write {}", path.display()), e))?;
    info!(path = %path.display(), models = book.len(), "artifact written");
    Ok(())
}

pub fn load_artifact(path: &Path) -> Result<ModelBook> {
    let raw = fs::read_to_string(path).map_err(|e| ModelError::io(format!("read {}", path.display()), e))?;
    let artifact = serde_json::from_str::<BookArtifact>(&raw)?;
    if artifact.version != ARTIFACT_VERSION {
        return Err(ModelError::shape(format!(
            "artifact {} has version {}, expected {ARTIFACT_VERSION}",
            path.display(),
            artifact.version
        )));
    }
    artifact.into_book()
}

#[derive(Debug, Clone, Default)]
pub struct ExportReport {
    pub sheets: usize,
    pub rows: usize,
}

/// Writes one sheet per model with every observed player's interval.
pub fn export_summaries_xlsx(path: &Path, book: &ModelBook, config: &FitConfig) -> AnyResult<ExportReport> {
    let table = book.table();
    let mut workbook = Workbook::new();
    let mut report = ExportReport::default();
    let mut used = Vec::<String>::new();

    for (label, fit) in book.iter() {
        let summaries = summarize_all(fit, config).with_context(|| format!("summarize model '{label}'"))?;
        let mut rows = vec![vec![
            "Player".to_string(),
            "Squad".to_string(),
            "Lower".to_string(),
            "Median".to_string(),
            "Upper".to_string(),
        ]];
        for s in &summaries {
            let [lo, mid, hi] = s.quantiles;
            rows.push(vec![
                table.players()[s.player_index].clone(),
                table.squads()[s.player_index].clone(),
                format_sig3(lo),
                format_sig3(mid),
                format_sig3(hi),
            ]);
        }

        let name = sheet_name(label, &used);
        let sheet = workbook.add_worksheet();
        sheet.set_name(&name)?;
        write_rows(sheet, &rows)?;
        used.push(name);
        report.sheets += 1;
        report.rows += summaries.len();
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(report)
}

/// Excel sheet names are at most 31 chars, unique and free of `[]:*?/\`.
fn sheet_name(label: &str, used: &[String]) -> String {
    let base = label
        .chars()
        .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
        .take(28)
        .collect::<String>();
    let base = if base.trim().is_empty() { "Model".to_string() } else { base };
    let mut name = base.clone();
    let mut n = 2;
    while used.iter().any(|u| u.eq_ignore_ascii_case(&name)) {
        name = format!("{base}~{n}");
        n += 1;
    }
    name
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> AnyResult<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_names_are_sanitized_and_unique() {
        let used = vec!["Cmp_".to_string()];
        assert_eq!(sheet_name("Cmp?", &used), "Cmp_~2");
        assert_eq!(sheet_name("a/b", &[]), "a_b");
        assert_eq!(sheet_name("", &[]), "Model");
        assert!(sheet_name(&"x".repeat(40), &[]).chars().count() <= 31);
    }
}
