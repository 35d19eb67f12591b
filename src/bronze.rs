use rusqlite::{Connection, params_from_iter};
use tracing::info;

use crate::error::{StorageContext, StorageError};
use crate::game_log::PlayerGameLog;
use crate::warehouse::{
    BRONZE_COLUMNS, BRONZE_GAME_LOGS, BRONZE_STAGING, count_rows, create_staging_table,
    ensure_bronze_table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Rows written to staging (the batch size).
    pub staged: usize,
    /// Keys that did not exist before the merge.
    pub inserted: usize,
    /// Keys that existed and were overwritten.
    pub updated: usize,
    /// Bronze row count after the merge.
    pub total_rows: usize,
}

/// Merge `batch` into bronze. Rows whose `(season, game_id, player_id)` is
/// new are inserted; existing keys take every column from the batch
/// (last write wins). Nothing is visible unless the whole merge commits.
///
/// Returns `None` without touching the database when the batch is empty.
pub fn load_batch(
    conn: &mut Connection,
    batch: &[PlayerGameLog],
) -> Result<Option<MergeReport>, StorageError> {
    if batch.is_empty() {
        return Ok(None);
    }

    let tx = conn.transaction().storage("begin bronze merge")?;

    create_staging_table(&tx)?;
    stage_rows(&tx, batch)?;
    ensure_bronze_table(&tx)?;

    let before = count_rows(&tx, BRONZE_GAME_LOGS)?;
    let distinct_keys: i64 = tx
        .query_row(
            &format!(
                "SELECT COUNT(*) FROM (SELECT DISTINCT season, game_id, player_id FROM temp.{BRONZE_STAGING})"
            ),
            [],
            |row| row.get(0),
        )
        .storage("count staged keys")?;

    tx.execute(&merge_sql(), []).storage("upsert bronze rows")?;

    let after = count_rows(&tx, BRONZE_GAME_LOGS)?;
    tx.execute_batch(&format!("DROP TABLE temp.{BRONZE_STAGING};"))
        .storage("drop staging table")?;
    tx.commit().storage("commit bronze merge")?;

    let inserted = (after - before).max(0) as usize;
    let report = MergeReport {
        staged: batch.len(),
        inserted,
        updated: (distinct_keys as usize).saturating_sub(inserted),
        total_rows: after.max(0) as usize,
    };
    info!(
        staged = report.staged,
        inserted = report.inserted,
        updated = report.updated,
        total = report.total_rows,
        "bronze merge committed"
    );
    Ok(Some(report))
}

fn stage_rows(conn: &Connection, batch: &[PlayerGameLog]) -> Result<(), StorageError> {
    let placeholders = (1..=BRONZE_COLUMNS.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO temp.{BRONZE_STAGING} ({}) VALUES ({placeholders})",
        BRONZE_COLUMNS.join(", ")
    );
    let mut stmt = conn.prepare(&sql).storage("prepare staging insert")?;
    for row in batch {
        stmt.execute(params_from_iter(row.sql_values()))
            .storage("stage bronze row")?;
    }
    Ok(())
}

/// `INSERT ... SELECT` needs a WHERE clause before `ON CONFLICT` so SQLite
/// doesn't read the conflict clause as a join constraint.
fn merge_sql() -> String {
    let columns = BRONZE_COLUMNS.join(", ");
    let updates = BRONZE_COLUMNS
        .iter()
        .filter(|c| !matches!(**c, "season" | "game_id" | "player_id"))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(",\n            ");
    format!(
        "INSERT INTO {BRONZE_GAME_LOGS} ({columns})
         SELECT {columns} FROM temp.{BRONZE_STAGING} WHERE true
         ON CONFLICT(season, game_id, player_id) DO UPDATE SET
            {updates}"
    )
}

#[cfg(test)]
mod tests {
    use super::merge_sql;

    #[test]
    fn merge_never_rewrites_the_key() {
        let sql = merge_sql();
        assert!(sql.contains("ingested_at = excluded.ingested_at"));
        assert!(sql.contains("pts = excluded.pts"));
        assert!(!sql.contains("game_id = excluded.game_id"));
        assert!(!sql.contains("player_id = excluded.player_id"));
    }
}
