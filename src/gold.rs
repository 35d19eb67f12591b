use rusqlite::Connection;

use crate::error::{StorageContext, StorageError};
use crate::run_log::run_logged;
use crate::silver::LayerBuild;
use crate::warehouse::{GOLD_PLAYER_FEATURES, SILVER_GAME_LOGS, count_rows, table_exists};

pub const LAYER: &str = "gold";

/// Rank 1 is the team that allows the most per game.
const OPPONENT_RANKS_SQL: &str = r#"
DROP TABLE IF EXISTS gold_opponent_ranks;
CREATE TABLE gold_opponent_ranks AS
WITH per_game AS (
    SELECT season, opponent_team, game_id,
           SUM(pts) AS pts, SUM(reb) AS reb, SUM(ast) AS ast
    FROM silver_player_game_logs
    WHERE opponent_team IS NOT NULL
    GROUP BY season, opponent_team, game_id
),
allowed AS (
    SELECT season, opponent_team,
           COUNT(*) AS games,
           AVG(pts) AS pts_allowed,
           AVG(reb) AS reb_allowed,
           AVG(ast) AS ast_allowed
    FROM per_game
    GROUP BY season, opponent_team
)
SELECT season, opponent_team, games, pts_allowed, reb_allowed, ast_allowed,
       DENSE_RANK() OVER (PARTITION BY season ORDER BY pts_allowed DESC) AS opp_pts_allowed_rank,
       DENSE_RANK() OVER (PARTITION BY season ORDER BY reb_allowed DESC) AS opp_reb_allowed_rank,
       DENSE_RANK() OVER (PARTITION BY season ORDER BY ast_allowed DESC) AS opp_ast_allowed_rank
FROM allowed;
CREATE UNIQUE INDEX idx_gold_opponent_ranks ON gold_opponent_ranks(season, opponent_team);
"#;

/// Rolling windows include the current game. `pts_next_game` is the target
/// and is NULL on a player's last game of the season.
const PLAYER_FEATURES_SQL: &str = r#"
DROP TABLE IF EXISTS gold_player_features;
CREATE TABLE gold_player_features AS
SELECT
    s.season,
    s.game_id,
    s.player_id,
    s.player_name,
    s.team,
    s.opponent_team,
    s.is_home,
    s.game_date,
    s.minutes,
    s.pts,
    s.reb,
    s.ast,
    AVG(s.pts) OVER w3 AS pts_last3,
    AVG(s.reb) OVER w3 AS reb_last3,
    AVG(s.ast) OVER w3 AS ast_last3,
    AVG(s.minutes) OVER w3 AS min_last3,
    AVG(s.pts) OVER w5 AS pts_last5,
    AVG(s.reb) OVER w5 AS reb_last5,
    AVG(s.ast) OVER w5 AS ast_last5,
    AVG(s.minutes) OVER w5 AS min_last5,
    (AVG(s.pts) OVER w5) + (AVG(s.reb) OVER w5) + (AVG(s.ast) OVER w5) AS pra_last5,
    r.opp_pts_allowed_rank,
    r.opp_reb_allowed_rank,
    r.opp_ast_allowed_rank,
    LEAD(s.pts) OVER by_player AS pts_next_game
FROM silver_player_game_logs s
LEFT JOIN gold_opponent_ranks r
    ON r.season = s.season AND r.opponent_team = s.opponent_team
WINDOW
    by_player AS (PARTITION BY s.season, s.player_id ORDER BY s.game_date, s.game_id),
    w3 AS (PARTITION BY s.season, s.player_id ORDER BY s.game_date, s.game_id
           ROWS BETWEEN 2 PRECEDING AND CURRENT ROW),
    w5 AS (PARTITION BY s.season, s.player_id ORDER BY s.game_date, s.game_id
           ROWS BETWEEN 4 PRECEDING AND CURRENT ROW);
CREATE UNIQUE INDEX idx_gold_features_key ON gold_player_features(season, game_id, player_id);
CREATE INDEX idx_gold_features_player ON gold_player_features(player_name, game_date);
"#;

/// Rebuild both gold tables from silver in one transaction.
pub fn build_gold(conn: &mut Connection) -> Result<LayerBuild, StorageError> {
    let tx = conn.transaction().storage("begin gold build")?;
    if !table_exists(&tx, SILVER_GAME_LOGS)? {
        return Err(StorageError::MissingTable {
            table: SILVER_GAME_LOGS,
            step: "silver",
        });
    }
    tx.execute_batch(OPPONENT_RANKS_SQL)
        .storage("build gold opponent ranks")?;
    tx.execute_batch(PLAYER_FEATURES_SQL)
        .storage("build gold player features")?;
    let rows = count_rows(&tx, GOLD_PLAYER_FEATURES)?;
    tx.commit().storage("commit gold build")?;
    Ok(LayerBuild {
        rows: rows.max(0) as usize,
    })
}

pub fn run_gold(conn: &mut Connection) -> Result<LayerBuild, StorageError> {
    run_logged(conn, LAYER, build_gold)
}
