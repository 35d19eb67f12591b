//! SQLite warehouse: connection setup and schema bootstrap.
//!
//! Layers are expressed as table-name prefixes, so `bronze.player_game_logs`
//! lives in `bronze_player_game_logs`.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::error::{StorageContext, StorageError};

pub const BRONZE_GAME_LOGS: &str = "bronze_player_game_logs";
pub const BRONZE_STAGING: &str = "bronze_player_game_logs_tmp";
pub const BRONZE_UNIQUE_INDEX: &str = "bronze_game_logs_unique";
pub const SILVER_GAME_LOGS: &str = "silver_player_game_logs";
pub const GOLD_OPPONENT_RANKS: &str = "gold_opponent_ranks";
pub const GOLD_PLAYER_FEATURES: &str = "gold_player_features";
pub const GOLD_TEST_PREDICTIONS: &str = "gold_test_predictions";
pub const GOLD_PLAYER_ANOMALIES: &str = "gold_player_anomalies";
pub const GOLD_RUN_LOG: &str = "gold_pipeline_run_log";

/// Bronze columns in insert order; matches `PlayerGameLog::sql_values`.
pub const BRONZE_COLUMNS: [&str; 35] = [
    "season",
    "game_id",
    "player_id",
    "season_id",
    "player_name",
    "team_id",
    "team_abbreviation",
    "team_name",
    "game_date",
    "matchup",
    "wl",
    "min",
    "fgm",
    "fga",
    "fg_pct",
    "fg3m",
    "fg3a",
    "fg3_pct",
    "ftm",
    "fta",
    "ft_pct",
    "oreb",
    "dreb",
    "reb",
    "ast",
    "stl",
    "blk",
    "tov",
    "pf",
    "pts",
    "plus_minus",
    "fantasy_pts",
    "video_available",
    "extra_json",
    "ingested_at",
];

const BRONZE_COLUMN_DEFS: &str = r#"
    season TEXT NOT NULL,
    game_id TEXT NOT NULL,
    player_id INTEGER NOT NULL,
    season_id TEXT NULL,
    player_name TEXT NOT NULL,
    team_id INTEGER NULL,
    team_abbreviation TEXT NULL,
    team_name TEXT NULL,
    game_date TEXT NOT NULL,
    matchup TEXT NOT NULL,
    wl TEXT NULL,
    min REAL NULL,
    fgm REAL NULL,
    fga REAL NULL,
    fg_pct REAL NULL,
    fg3m REAL NULL,
    fg3a REAL NULL,
    fg3_pct REAL NULL,
    ftm REAL NULL,
    fta REAL NULL,
    ft_pct REAL NULL,
    oreb REAL NULL,
    dreb REAL NULL,
    reb REAL NULL,
    ast REAL NULL,
    stl REAL NULL,
    blk REAL NULL,
    tov REAL NULL,
    pf REAL NULL,
    pts REAL NULL,
    plus_minus REAL NULL,
    fantasy_pts REAL NULL,
    video_available INTEGER NULL,
    extra_json TEXT NULL,
    ingested_at TEXT NOT NULL
"#;

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create warehouse dir {}", parent.display()))?;
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .context("enable WAL journal")?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Create every permanent object that exists before the first ingest.
/// Idempotent.
pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    ensure_bronze_table(conn)?;
    ensure_run_log_table(conn)?;
    Ok(())
}

/// The bronze table plus the unique index the upsert conflicts on.
pub fn ensure_bronze_table(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {BRONZE_GAME_LOGS} ({BRONZE_COLUMN_DEFS});
         CREATE UNIQUE INDEX IF NOT EXISTS {BRONZE_UNIQUE_INDEX}
             ON {BRONZE_GAME_LOGS}(season, game_id, player_id);"
    ))
    .storage("create bronze table")
}

/// Staging copy of the bronze layout without the key constraint. Lives in
/// the connection's temp schema.
pub fn create_staging_table(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS temp.{BRONZE_STAGING};
         CREATE TEMP TABLE {BRONZE_STAGING} ({BRONZE_COLUMN_DEFS});"
    ))
    .storage("create staging table")
}

pub fn ensure_run_log_table(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {GOLD_RUN_LOG} (
            run_id TEXT NOT NULL UNIQUE,
            layer TEXT NOT NULL,
            rows_processed INTEGER NULL,
            status TEXT NOT NULL CHECK (status IN ('success', 'failure')),
            runtime_seconds REAL NOT NULL,
            error_message TEXT NULL,
            executed_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_run_log_executed_at ON {GOLD_RUN_LOG}(executed_at);"
    ))
    .storage("create run log table")
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, StorageError> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
    .storage("check table exists")
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64, StorageError> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get::<_, i64>(0)
    })
    .storage("count rows")
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::{BRONZE_GAME_LOGS, GOLD_RUN_LOG, init_schema, table_exists};

    #[test]
    fn schema_bootstrap_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert!(table_exists(&conn, BRONZE_GAME_LOGS).unwrap());
        assert!(table_exists(&conn, GOLD_RUN_LOG).unwrap());
        assert!(!table_exists(&conn, "silver_player_game_logs").unwrap());
    }

    #[test]
    fn bronze_key_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let insert = format!(
            "INSERT INTO {BRONZE_GAME_LOGS} (season, game_id, player_id, player_name, game_date, matchup, ingested_at)
             VALUES ('2024-25', '0022400001', 1, 'A', '2024-10-22', 'LAL vs. MIN', 'now')"
        );
        conn.execute(&insert, []).unwrap();
        assert!(conn.execute(&insert, []).is_err());
    }
}
