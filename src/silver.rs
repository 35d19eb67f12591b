use rusqlite::Connection;

use crate::error::{StorageContext, StorageError};
use crate::run_log::{RunOutcome, run_logged};
use crate::warehouse::{SILVER_GAME_LOGS, count_rows, ensure_bronze_table};

pub const LAYER: &str = "silver";

/// `MATCHUP` reads `LAL vs. BOS` at home and `LAL @ BOS` away.
const SILVER_SQL: &str = r#"
DROP TABLE IF EXISTS silver_player_game_logs;
CREATE TABLE silver_player_game_logs AS
SELECT
    season,
    game_id,
    player_id,
    player_name,
    team_id,
    team_abbreviation AS team,
    CASE
        WHEN instr(matchup, ' vs. ') > 0 THEN trim(substr(matchup, instr(matchup, ' vs. ') + 5))
        WHEN instr(matchup, ' @ ') > 0 THEN trim(substr(matchup, instr(matchup, ' @ ') + 3))
        ELSE NULL
    END AS opponent_team,
    CASE WHEN instr(matchup, ' vs. ') > 0 THEN 1 ELSE 0 END AS is_home,
    date(game_date) AS game_date,
    wl,
    min AS minutes,
    pts,
    reb,
    ast,
    stl,
    blk,
    tov,
    fgm,
    fga,
    fg3m,
    fg3a,
    ftm,
    fta,
    plus_minus,
    ingested_at
FROM bronze_player_game_logs
WHERE season IS NOT NULL
  AND game_id IS NOT NULL
  AND player_id IS NOT NULL
  AND date(game_date) IS NOT NULL;
CREATE UNIQUE INDEX idx_silver_key ON silver_player_game_logs(season, game_id, player_id);
CREATE INDEX idx_silver_player_date ON silver_player_game_logs(player_id, game_date);
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerBuild {
    pub rows: usize,
}

impl RunOutcome for LayerBuild {
    fn rows_processed(&self) -> usize {
        self.rows
    }
}

/// Rebuild silver from bronze in one transaction.
pub fn build_silver(conn: &mut Connection) -> Result<LayerBuild, StorageError> {
    let tx = conn.transaction().storage("begin silver build")?;
    ensure_bronze_table(&tx)?;
    tx.execute_batch(SILVER_SQL).storage("build silver layer")?;
    let rows = count_rows(&tx, SILVER_GAME_LOGS)?;
    tx.commit().storage("commit silver build")?;
    Ok(LayerBuild {
        rows: rows.max(0) as usize,
    })
}

pub fn run_silver(conn: &mut Connection) -> Result<LayerBuild, StorageError> {
    run_logged(conn, LAYER, build_silver)
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::build_silver;
    use crate::warehouse::{BRONZE_GAME_LOGS, init_schema};

    #[test]
    fn opponent_and_venue_come_from_matchup() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute_batch(&format!(
            "INSERT INTO {BRONZE_GAME_LOGS} (season, game_id, player_id, player_name, team_abbreviation, game_date, matchup, pts, ingested_at)
             VALUES ('2024-25', 'g1', 1, 'Home Guy', 'LAL', '2024-10-22', 'LAL vs. MIN', 20, 't'),
                    ('2024-25', 'g1', 2, 'Road Guy', 'MIN', '2024-10-22', 'MIN @ LAL', 18, 't');"
        ))
        .unwrap();

        let build = build_silver(&mut conn).unwrap();
        assert_eq!(build.rows, 2);

        let (opp, home): (String, i64) = conn
            .query_row(
                "SELECT opponent_team, is_home FROM silver_player_game_logs WHERE player_id = 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((opp.as_str(), home), ("MIN", 1));

        let (opp, home): (String, i64) = conn
            .query_row(
                "SELECT opponent_team, is_home FROM silver_player_game_logs WHERE player_id = 2",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((opp.as_str(), home), ("LAL", 0));
    }
}
