use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::error::StorageError;
use crate::warehouse::{GOLD_PLAYER_FEATURES, table_exists};

pub const FEATURE_COLUMNS: [&str; 8] = [
    "pts_last5",
    "reb_last5",
    "ast_last5",
    "min_last5",
    "pra_last5",
    "opp_pts_allowed_rank",
    "opp_reb_allowed_rank",
    "opp_ast_allowed_rank",
];

/// Stand-in for an unknown opponent rank: the middle of a 30-team league.
pub const MISSING_RANK: f64 = 15.5;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub season: String,
    pub game_id: String,
    pub player_id: i64,
    pub player_name: String,
    pub game_date: String,
    pub pts: f64,
    pub features: [f64; 8],
    pub pts_next_game: f64,
}

/// Every gold feature row that has a next game, in chronological order so a
/// head/tail split never trains on the future.
pub fn load_training_examples(conn: &Connection) -> Result<Vec<TrainingExample>> {
    if !table_exists(conn, GOLD_PLAYER_FEATURES)? {
        return Err(StorageError::MissingTable {
            table: GOLD_PLAYER_FEATURES,
            step: "gold",
        }
        .into());
    }

    let mut stmt = conn
        .prepare(&format!(
            r#"
            SELECT
                season, game_id, player_id, player_name, game_date, pts,
                pts_last5, reb_last5, ast_last5, min_last5, pra_last5,
                opp_pts_allowed_rank, opp_reb_allowed_rank, opp_ast_allowed_rank,
                pts_next_game
            FROM {GOLD_PLAYER_FEATURES}
            WHERE pts_next_game IS NOT NULL
              AND pts IS NOT NULL
              AND pts_last5 IS NOT NULL
              AND reb_last5 IS NOT NULL
              AND ast_last5 IS NOT NULL
              AND min_last5 IS NOT NULL
            ORDER BY game_date ASC, game_id ASC, player_id ASC
            "#
        ))
        .context("prepare feature query")?;

    let rows = stmt
        .query_map([], |row| {
            let rank = |idx: usize| -> rusqlite::Result<f64> {
                Ok(row.get::<_, Option<f64>>(idx)?.unwrap_or(MISSING_RANK))
            };
            Ok(TrainingExample {
                season: row.get(0)?,
                game_id: row.get(1)?,
                player_id: row.get(2)?,
                player_name: row.get(3)?,
                game_date: row.get(4)?,
                pts: row.get(5)?,
                features: [
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                    row.get(9)?,
                    row.get(10)?,
                    rank(11)?,
                    rank(12)?,
                    rank(13)?,
                ],
                pts_next_game: row.get(14)?,
            })
        })
        .context("query gold features")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode feature row")?);
    }
    Ok(out)
}
