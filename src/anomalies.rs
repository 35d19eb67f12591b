use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::info;

use crate::error::StorageError;
use crate::run_log::{RunOutcome, run_logged};
use crate::warehouse::{GOLD_PLAYER_ANOMALIES, GOLD_TEST_PREDICTIONS, table_exists};

pub const LAYER: &str = "anomalies";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyType {
    Overperform,
    Underperform,
}

impl AnomalyType {
    pub fn from_residual(residual: f64) -> Self {
        if residual > 0.0 {
            Self::Overperform
        } else {
            Self::Underperform
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Overperform => "OVERPERFORM",
            Self::Underperform => "UNDERPERFORM",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub season: String,
    pub game_id: String,
    pub player_id: i64,
    pub player_name: String,
    pub game_date: String,
    pub actual: f64,
    pub predicted: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerAnomaly {
    pub prediction: Prediction,
    pub residual: f64,
    pub abs_residual: f64,
    pub residual_zscore: f64,
    pub anomaly_type: AnomalyType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyReport {
    pub rows: usize,
    pub overperform: usize,
    pub underperform: usize,
    pub exported: Option<PathBuf>,
}

impl RunOutcome for AnomalyReport {
    fn rows_processed(&self) -> usize {
        self.rows
    }
}

/// Residual is the player's actual next-game points minus the prediction for
/// that same game, not the points of the game the features were taken from.
/// The z-score uses the population standard deviation and is 0 for every row
/// when that is 0. Output is sorted by absolute residual, largest first.
pub fn compute_anomalies(predictions: Vec<Prediction>) -> Vec<PlayerAnomaly> {
    if predictions.is_empty() {
        return Vec::new();
    }
    let residuals = predictions
        .iter()
        .map(|p| p.actual - p.predicted)
        .collect::<Vec<_>>();
    let n = residuals.len() as f64;
    let mean = residuals.iter().sum::<f64>() / n;
    let std = (residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();

    let mut out = predictions
        .into_iter()
        .zip(residuals)
        .map(|(prediction, residual)| PlayerAnomaly {
            prediction,
            residual,
            abs_residual: residual.abs(),
            residual_zscore: if std > 0.0 { (residual - mean) / std } else { 0.0 },
            anomaly_type: AnomalyType::from_residual(residual),
        })
        .collect::<Vec<_>>();
    out.sort_by(|a, b| b.abs_residual.total_cmp(&a.abs_residual));
    out
}

pub fn load_predictions(conn: &Connection) -> Result<Vec<Prediction>> {
    if !table_exists(conn, GOLD_TEST_PREDICTIONS)? {
        return Err(StorageError::MissingTable {
            table: GOLD_TEST_PREDICTIONS,
            step: "model",
        }
        .into());
    }
    let mut stmt = conn
        .prepare(&format!(
            "SELECT season, game_id, player_id, player_name, game_date, pts_next_game, pred_pts_next_game
             FROM {GOLD_TEST_PREDICTIONS}
             ORDER BY game_date, game_id, player_id"
        ))
        .context("prepare predictions query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Prediction {
                season: row.get(0)?,
                game_id: row.get(1)?,
                player_id: row.get(2)?,
                player_name: row.get(3)?,
                game_date: row.get(4)?,
                actual: row.get(5)?,
                predicted: row.get(6)?,
            })
        })
        .context("query predictions")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode prediction row")?);
    }
    Ok(out)
}

pub fn detect_anomalies(conn: &mut Connection, export: Option<&Path>) -> Result<AnomalyReport> {
    let anomalies = compute_anomalies(load_predictions(conn)?);
    store_anomalies(conn, &anomalies)?;

    let exported = match export {
        Some(path) => {
            export_workbook(path, &anomalies)?;
            info!(path = %path.display(), "anomalies exported");
            Some(path.to_path_buf())
        }
        None => None,
    };

    let overperform = anomalies
        .iter()
        .filter(|a| a.anomaly_type == AnomalyType::Overperform)
        .count();
    Ok(AnomalyReport {
        rows: anomalies.len(),
        overperform,
        underperform: anomalies.len() - overperform,
        exported,
    })
}

pub fn run_anomalies(conn: &mut Connection, export: Option<&Path>) -> Result<AnomalyReport> {
    run_logged(conn, LAYER, |conn| detect_anomalies(conn, export))
}

fn store_anomalies(conn: &mut Connection, anomalies: &[PlayerAnomaly]) -> Result<()> {
    let tx = conn.transaction().context("begin anomalies write")?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {GOLD_PLAYER_ANOMALIES};
         CREATE TABLE {GOLD_PLAYER_ANOMALIES} (
             anomaly_rank INTEGER NOT NULL,
             season TEXT NOT NULL,
             game_id TEXT NOT NULL,
             player_id INTEGER NOT NULL,
             player_name TEXT NOT NULL,
             game_date TEXT NOT NULL,
             pts_next_game REAL NOT NULL,
             pred_pts_next_game REAL NOT NULL,
             residual REAL NOT NULL,
             abs_residual REAL NOT NULL,
             residual_zscore REAL NOT NULL,
             anomaly_type TEXT NOT NULL CHECK (anomaly_type IN ('OVERPERFORM', 'UNDERPERFORM')),
             PRIMARY KEY (season, game_id, player_id)
         );"
    ))
    .context("create anomalies table")?;
    {
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {GOLD_PLAYER_ANOMALIES} VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ))
            .context("prepare anomalies insert")?;
        for (idx, a) in anomalies.iter().enumerate() {
            let p = &a.prediction;
            stmt.execute(params![
                (idx + 1) as i64,
                p.season,
                p.game_id,
                p.player_id,
                p.player_name,
                p.game_date,
                p.actual,
                p.predicted,
                a.residual,
                a.abs_residual,
                a.residual_zscore,
                a.anomaly_type.as_str(),
            ])
            .context("insert anomaly")?;
        }
    }
    tx.commit().context("commit anomalies")?;
    Ok(())
}

const EXPORT_HEADER: [&str; 11] = [
    "rank",
    "season",
    "game_date",
    "player",
    "game_id",
    "pts_next_game",
    "predicted",
    "residual",
    "abs_residual",
    "zscore",
    "type",
];

fn export_workbook(path: &Path, anomalies: &[PlayerAnomaly]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export dir {}", parent.display()))?;
    }
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Anomalies")?;
        write_anomalies(sheet, anomalies)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(())
}

fn write_anomalies(sheet: &mut Worksheet, anomalies: &[PlayerAnomaly]) -> Result<()> {
    for (col, title) in EXPORT_HEADER.iter().enumerate() {
        sheet
            .write_string(0, col as u16, *title)
            .with_context(|| format!("write header {title}"))?;
    }
    for (idx, a) in anomalies.iter().enumerate() {
        let row = idx as u32 + 1;
        let p = &a.prediction;
        sheet.write_number(row, 0, (idx + 1) as f64)?;
        sheet.write_string(row, 1, &p.season)?;
        sheet.write_string(row, 2, &p.game_date)?;
        sheet.write_string(row, 3, &p.player_name)?;
        sheet.write_string(row, 4, &p.game_id)?;
        sheet.write_number(row, 5, p.actual)?;
        sheet.write_number(row, 6, p.predicted)?;
        sheet.write_number(row, 7, a.residual)?;
        sheet.write_number(row, 8, a.abs_residual)?;
        sheet.write_number(row, 9, a.residual_zscore)?;
        sheet
            .write_string(row, 10, a.anomaly_type.as_str())
            .with_context(|| format!("write row {row}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{AnomalyType, Prediction, compute_anomalies};

    fn pred(id: &str, actual: f64, predicted: f64) -> Prediction {
        Prediction {
            season: "2024-25".to_string(),
            game_id: id.to_string(),
            player_id: 7,
            player_name: "P".to_string(),
            game_date: "2025-01-01".to_string(),
            actual,
            predicted,
        }
    }

    #[test]
    fn sorted_by_absolute_residual() {
        let out = compute_anomalies(vec![
            pred("a", 20.0, 18.0),
            pred("b", 10.0, 25.0),
            pred("c", 30.0, 22.0),
        ]);
        let ids = out.iter().map(|a| a.prediction.game_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["b", "c", "a"]);
        assert_eq!(out[0].anomaly_type, AnomalyType::Underperform);
        assert_eq!(out[1].anomaly_type, AnomalyType::Overperform);
        assert_eq!(out[0].residual, -15.0);

        let mean_z = out.iter().map(|a| a.residual_zscore).sum::<f64>() / 3.0;
        assert!(mean_z.abs() < 1e-9);
    }

    #[test]
    fn zero_residual_is_underperform_and_flat_z() {
        let out = compute_anomalies(vec![pred("a", 10.0, 10.0), pred("b", 12.0, 12.0)]);
        assert!(out.iter().all(|a| a.anomaly_type == AnomalyType::Underperform));
        assert!(out.iter().all(|a| a.residual_zscore == 0.0));
    }

    #[test]
    fn empty_input() {
        assert!(compute_anomalies(Vec::new()).is_empty());
    }
}
