use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params};
use tracing::info;

use crate::features::{FEATURE_COLUMNS, TrainingExample, load_training_examples};
use crate::forest::{ForestParams, RandomForestRegressor, Regressor};
use crate::run_log::{RunOutcome, run_logged};
use crate::warehouse::GOLD_TEST_PREDICTIONS;

pub const LAYER: &str = "model";
pub const MIN_EXAMPLES: usize = 10;
pub const MODEL_FILE: &str = "rf_pts_predictor.json";
pub const FEATURE_LIST_FILE: &str = "feature_columns.txt";
pub const TEST_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub mae: f64,
    pub r2: f64,
    pub model_path: PathBuf,
}

impl RunOutcome for TrainingReport {
    fn rows_processed(&self) -> usize {
        self.train_rows + self.test_rows
    }

    fn note(&self) -> Option<String> {
        Some(format!("MAE {:.2}, R^2 {:.3}", self.mae, self.r2))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub train_rows: usize,
    pub predictions: Vec<f64>,
    pub mae: f64,
    pub r2: f64,
}

/// Number of leading rows used for training. The test tail gets
/// `ceil(n * TEST_FRACTION)` rows.
pub fn train_len(n: usize) -> usize {
    let n_test = (n as f64 * TEST_FRACTION).ceil() as usize;
    n.saturating_sub(n_test)
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    total / actual.len() as f64
}

/// Coefficient of determination. A constant target scores 1.0 when predicted
/// exactly and 0.0 otherwise.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Fit on the chronological head and score the tail.
pub fn fit_and_evaluate<M: Regressor + ?Sized>(
    model: &mut M,
    examples: &[TrainingExample],
) -> Result<Evaluation> {
    if examples.len() < MIN_EXAMPLES {
        bail!(
            "need at least {MIN_EXAMPLES} examples with a next game to train, found {}",
            examples.len()
        );
    }
    let split = train_len(examples.len());
    let (train, test) = examples.split_at(split);

    let x_train = train.iter().map(|e| e.features.to_vec()).collect::<Vec<_>>();
    let y_train = train.iter().map(|e| e.pts_next_game).collect::<Vec<_>>();
    model.fit(&x_train, &y_train).context("fit model")?;

    let x_test = test.iter().map(|e| e.features.to_vec()).collect::<Vec<_>>();
    let y_test = test.iter().map(|e| e.pts_next_game).collect::<Vec<_>>();
    let predictions = model.predict_many(&x_test);

    Ok(Evaluation {
        train_rows: train.len(),
        mae: mean_absolute_error(&y_test, &predictions),
        r2: r2_score(&y_test, &predictions),
        predictions,
    })
}

pub fn train_model(
    conn: &mut Connection,
    model_dir: &Path,
    params: ForestParams,
) -> Result<TrainingReport> {
    let examples = load_training_examples(conn)?;
    info!(examples = examples.len(), "training next-game points model");

    let mut model = RandomForestRegressor::new(params);
    let eval = fit_and_evaluate(&mut model, &examples)?;
    let test = &examples[eval.train_rows..];
    info!(mae = eval.mae, r2 = eval.r2, test_rows = test.len(), "model evaluated");

    write_test_predictions(conn, test, &eval.predictions)?;

    let model_path = model_dir.join(MODEL_FILE);
    model.save_json(&model_path)?;
    write_feature_list(&model_dir.join(FEATURE_LIST_FILE))?;
    info!(path = %model_path.display(), "model saved");

    Ok(TrainingReport {
        train_rows: eval.train_rows,
        test_rows: test.len(),
        mae: eval.mae,
        r2: eval.r2,
        model_path,
    })
}

pub fn run_training(
    conn: &mut Connection,
    model_dir: &Path,
    params: ForestParams,
) -> Result<TrainingReport> {
    run_logged(conn, LAYER, |conn| train_model(conn, model_dir, params))
}

fn write_feature_list(path: &Path) -> Result<()> {
    let mut raw = FEATURE_COLUMNS.join("\n");
    raw.push('\n');
    fs::write(path, raw).with_context(|| format!("write {}", path.display()))
}

/// Replace the held-out predictions table.
fn write_test_predictions(
    conn: &mut Connection,
    test: &[TrainingExample],
    predictions: &[f64],
) -> Result<()> {
    let tx = conn.transaction().context("begin test predictions write")?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {GOLD_TEST_PREDICTIONS};
         CREATE TABLE {GOLD_TEST_PREDICTIONS} (
             season TEXT NOT NULL,
             game_id TEXT NOT NULL,
             player_id INTEGER NOT NULL,
             player_name TEXT NOT NULL,
             game_date TEXT NOT NULL,
             pts REAL NOT NULL,
             pts_last5 REAL NOT NULL,
             reb_last5 REAL NOT NULL,
             ast_last5 REAL NOT NULL,
             min_last5 REAL NOT NULL,
             pra_last5 REAL NOT NULL,
             opp_pts_allowed_rank REAL NOT NULL,
             opp_reb_allowed_rank REAL NOT NULL,
             opp_ast_allowed_rank REAL NOT NULL,
             pts_next_game REAL NOT NULL,
             pred_pts_next_game REAL NOT NULL,
             PRIMARY KEY (season, game_id, player_id)
         );"
    ))
    .context("create test predictions table")?;
    {
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {GOLD_TEST_PREDICTIONS} VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ))
            .context("prepare test predictions insert")?;
        for (ex, pred) in test.iter().zip(predictions) {
            let f = &ex.features;
            stmt.execute(params![
                ex.season,
                ex.game_id,
                ex.player_id,
                ex.player_name,
                ex.game_date,
                ex.pts,
                f[0],
                f[1],
                f[2],
                f[3],
                f[4],
                f[5],
                f[6],
                f[7],
                ex.pts_next_game,
                pred,
            ])
            .with_context(|| format!("insert prediction for {}/{}", ex.game_id, ex.player_id))?;
        }
    }
    tx.commit().context("commit test predictions")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{MIN_EXAMPLES, fit_and_evaluate, mean_absolute_error, r2_score, train_len};
    use crate::features::TrainingExample;
    use crate::forest::Regressor;

    struct MeanModel(f64);

    impl Regressor for MeanModel {
        fn fit(&mut self, _x: &[Vec<f64>], y: &[f64]) -> anyhow::Result<()> {
            self.0 = y.iter().sum::<f64>() / y.len() as f64;
            Ok(())
        }

        fn predict(&self, _row: &[f64]) -> f64 {
            self.0
        }
    }

    fn example(i: usize, target: f64) -> TrainingExample {
        TrainingExample {
            season: "2024-25".to_string(),
            game_id: format!("g{i:03}"),
            player_id: 1,
            player_name: "Player".to_string(),
            game_date: format!("2024-11-{:02}", i + 1),
            pts: target,
            features: [0.0; 8],
            pts_next_game: target,
        }
    }

    #[test]
    fn split_keeps_the_tail_for_testing() {
        assert_eq!(train_len(10), 8);
        assert_eq!(train_len(11), 8);
        assert_eq!(train_len(100), 80);
    }

    #[test]
    fn metrics() {
        let actual = [10.0, 20.0, 30.0];
        assert_eq!(mean_absolute_error(&actual, &[12.0, 18.0, 30.0]), 4.0 / 3.0);
        assert_eq!(r2_score(&actual, &actual), 1.0);
        assert_eq!(r2_score(&actual, &[20.0, 20.0, 20.0]), 0.0);
        assert_eq!(r2_score(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
    }

    #[test]
    fn trains_on_the_past_only() {
        let examples = (0..10)
            .map(|i| example(i, if i < 8 { 10.0 } else { 40.0 }))
            .collect::<Vec<_>>();
        let mut model = MeanModel(0.0);
        let eval = fit_and_evaluate(&mut model, &examples).unwrap();
        assert_eq!(eval.train_rows, 8);
        assert_eq!(eval.predictions, vec![10.0, 10.0]);
        assert_eq!(eval.mae, 30.0);
    }

    #[test]
    fn too_few_examples_is_an_error() {
        let examples = (0..MIN_EXAMPLES - 1)
            .map(|i| example(i, 1.0))
            .collect::<Vec<_>>();
        assert!(fit_and_evaluate(&mut MeanModel(0.0), &examples).is_err());
    }
}
