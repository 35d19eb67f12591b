use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

use crate::config::PipelineConfig;
use crate::logging::init_logging;
use crate::warehouse::open_db;

/// Common entry for every binary: load `.env.local` then `.env`, build the
/// config (command-line overrides first), start logging, open the warehouse.
pub fn start(args: &[String]) -> Result<(PipelineConfig, Connection)> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let config = PipelineConfig::load(args).context("load configuration")?;
    init_logging(&config.logging);
    info!(
        db = %config.database_path.display(),
        seasons = ?config.seasons,
        full_refresh = config.full_refresh,
        "configuration loaded"
    );

    let conn = open_db(&config.database_path)?;
    Ok((config, conn))
}
