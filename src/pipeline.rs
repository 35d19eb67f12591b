use anyhow::{Context, Result};
use chrono::NaiveDate;
use rand::Rng;
use rusqlite::Connection;
use tracing::info;

use crate::anomalies::{AnomalyReport, run_anomalies};
use crate::bronze_ingest::{IngestSummary, ingest_bronze};
use crate::config::PipelineConfig;
use crate::forest::ForestParams;
use crate::gold::run_gold;
use crate::quality::{CheckResult, check_quality};
use crate::retry::Sleeper;
use crate::season_fetch::SeasonSource;
use crate::silver::{LayerBuild, run_silver};
use crate::train::{TrainingReport, run_training};

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub bronze: IngestSummary,
    pub silver: LayerBuild,
    pub gold: LayerBuild,
    pub model: TrainingReport,
    pub anomalies: AnomalyReport,
    pub checks: Vec<CheckResult>,
}

pub fn run_pipeline<S, Z, R>(
    conn: &mut Connection,
    config: &PipelineConfig,
    source: &S,
    sleeper: &mut Z,
    rng: &mut R,
    today: NaiveDate,
) -> Result<PipelineReport>
where
    S: SeasonSource + ?Sized,
    Z: Sleeper + ?Sized,
    R: Rng,
{
    info!(step = "bronze", "pipeline step");
    let bronze = ingest_bronze(conn, config, source, sleeper, rng, today)
        .context("bronze ingestion")?;

    info!(step = "silver", "pipeline step");
    let silver = run_silver(conn).context("silver build")?;

    info!(step = "gold", "pipeline step");
    let gold = run_gold(conn).context("gold build")?;

    info!(step = "model", "pipeline step");
    let model = run_training(conn, &config.model_dir, ForestParams::default())
        .context("model training")?;

    info!(step = "anomalies", "pipeline step");
    let anomalies = run_anomalies(conn, config.anomaly_export_path.as_deref())
        .context("anomaly detection")?;

    info!(step = "quality", "pipeline step");
    let checks = check_quality(conn).context("quality checks")?;

    Ok(PipelineReport {
        bronze,
        silver,
        gold,
        model,
        anomalies,
        checks,
    })
}
