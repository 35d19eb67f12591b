use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use crate::error::FetchError;

const RESULT_SET_NAME: &str = "LeagueGameLog";

/// Box-score statistics, in the column order the bronze table stores them.
pub const STAT_COLUMNS: [&str; 21] = [
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
];

/// Source headers the record models explicitly. Everything else lands in
/// `extra`.
const KNOWN_HEADERS: [&str; 12] = [
    "SEASON_ID",
    "PLAYER_ID",
    "PLAYER_NAME",
    "TEAM_ID",
    "TEAM_ABBREVIATION",
    "TEAM_NAME",
    "GAME_ID",
    "GAME_DATE",
    "MATCHUP",
    "WL",
    "VIDEO_AVAILABLE",
    "SEASON",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoxScore {
    pub min: Option<f64>,
    pub fgm: Option<f64>,
    pub fga: Option<f64>,
    pub fg_pct: Option<f64>,
    pub fg3m: Option<f64>,
    pub fg3a: Option<f64>,
    pub fg3_pct: Option<f64>,
    pub ftm: Option<f64>,
    pub fta: Option<f64>,
    pub ft_pct: Option<f64>,
    pub oreb: Option<f64>,
    pub dreb: Option<f64>,
    pub reb: Option<f64>,
    pub ast: Option<f64>,
    pub stl: Option<f64>,
    pub blk: Option<f64>,
    pub tov: Option<f64>,
    pub pf: Option<f64>,
    pub pts: Option<f64>,
    pub plus_minus: Option<f64>,
    pub fantasy_pts: Option<f64>,
}

impl BoxScore {
    pub fn values(&self) -> [Option<f64>; 21] {
        [
            self.min,
            self.fgm,
            self.fga,
            self.fg_pct,
            self.fg3m,
            self.fg3a,
            self.fg3_pct,
            self.ftm,
            self.fta,
            self.ft_pct,
            self.oreb,
            self.dreb,
            self.reb,
            self.ast,
            self.stl,
            self.blk,
            self.tov,
            self.pf,
            self.pts,
            self.plus_minus,
            self.fantasy_pts,
        ]
    }

    fn slot_mut(&mut self, column: &str) -> Option<&mut Option<f64>> {
        Some(match column {
            "min" => &mut self.min,
            "fgm" => &mut self.fgm,
            "fga" => &mut self.fga,
            "fg_pct" => &mut self.fg_pct,
            "fg3m" => &mut self.fg3m,
            "fg3a" => &mut self.fg3a,
            "fg3_pct" => &mut self.fg3_pct,
            "ftm" => &mut self.ftm,
            "fta" => &mut self.fta,
            "ft_pct" => &mut self.ft_pct,
            "oreb" => &mut self.oreb,
            "dreb" => &mut self.dreb,
            "reb" => &mut self.reb,
            "ast" => &mut self.ast,
            "stl" => &mut self.stl,
            "blk" => &mut self.blk,
            "tov" => &mut self.tov,
            "pf" => &mut self.pf,
            "pts" => &mut self.pts,
            "plus_minus" => &mut self.plus_minus,
            "fantasy_pts" => &mut self.fantasy_pts,
            _ => return None,
        })
    }
}

/// One player's line in one game, as fetched. Natural key is
/// `(season, game_id, player_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerGameLog {
    pub season: String,
    pub game_id: String,
    pub player_id: i64,
    pub season_id: Option<String>,
    pub player_name: String,
    pub team_id: Option<i64>,
    pub team_abbreviation: Option<String>,
    pub team_name: Option<String>,
    /// ISO `YYYY-MM-DD`.
    pub game_date: String,
    pub matchup: String,
    pub wl: Option<String>,
    pub stats: BoxScore,
    pub video_available: Option<i64>,
    pub extra: Map<String, Value>,
    pub ingested_at: DateTime<Utc>,
}

impl PlayerGameLog {
    pub fn key(&self) -> (&str, &str, i64) {
        (&self.season, &self.game_id, self.player_id)
    }

    /// Column values in `BRONZE_COLUMNS` order.
    pub fn sql_values(&self) -> Vec<SqlValue> {
        let mut out = Vec::with_capacity(35);
        out.push(SqlValue::from(self.season.clone()));
        out.push(SqlValue::from(self.game_id.clone()));
        out.push(SqlValue::from(self.player_id));
        out.push(SqlValue::from(self.season_id.clone()));
        out.push(SqlValue::from(self.player_name.clone()));
        out.push(SqlValue::from(self.team_id));
        out.push(SqlValue::from(self.team_abbreviation.clone()));
        out.push(SqlValue::from(self.team_name.clone()));
        out.push(SqlValue::from(self.game_date.clone()));
        out.push(SqlValue::from(self.matchup.clone()));
        out.push(SqlValue::from(self.wl.clone()));
        for stat in self.stats.values() {
            out.push(SqlValue::from(stat));
        }
        out.push(SqlValue::from(self.video_available));
        let extra = if self.extra.is_empty() {
            None
        } else {
            serde_json::to_string(&self.extra).ok()
        };
        out.push(SqlValue::from(extra));
        out.push(SqlValue::from(self.ingested_at.to_rfc3339()));
        out
    }
}

/// Parse a `leaguegamelog` response body into rows stamped with `season` and
/// `ingested_at`. A `null` body is an empty result.
pub fn parse_league_game_log(
    raw: &str,
    season: &str,
    ingested_at: DateTime<Utc>,
) -> Result<Vec<PlayerGameLog>, FetchError> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|err| FetchError::Payload(format!("invalid json: {err}")))?;
    if value.is_null() {
        return Ok(Vec::new());
    }

    let sets = value
        .get("resultSets")
        .and_then(|v| v.as_array())
        .ok_or_else(|| FetchError::Payload("missing resultSets".to_string()))?;
    let set = sets
        .iter()
        .find(|s| s.get("name").and_then(|n| n.as_str()) == Some(RESULT_SET_NAME))
        .or_else(|| sets.first())
        .ok_or_else(|| FetchError::Payload("empty resultSets".to_string()))?;

    let headers = set
        .get("headers")
        .and_then(|v| v.as_array())
        .ok_or_else(|| FetchError::Payload("missing headers".to_string()))?
        .iter()
        .map(|h| h.as_str().unwrap_or_default().to_ascii_uppercase())
        .collect::<Vec<_>>();
    let rows = set
        .get("rowSet")
        .and_then(|v| v.as_array())
        .ok_or_else(|| FetchError::Payload("missing rowSet".to_string()))?;

    let idx = |name: &str| headers.iter().position(|h| h == name);
    let (Some(game_idx), Some(player_idx)) = (idx("GAME_ID"), idx("PLAYER_ID")) else {
        return Err(FetchError::Payload(
            "rowSet lacks GAME_ID/PLAYER_ID columns".to_string(),
        ));
    };

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(cells) = row.as_array() else {
            continue;
        };
        let cell = |i: Option<usize>| i.and_then(|i| cells.get(i)).filter(|v| !v.is_null());

        let Some(game_id) = cell(Some(game_idx)).and_then(as_string_any) else {
            continue;
        };
        let Some(player_id) = cell(Some(player_idx)).and_then(as_i64_any) else {
            continue;
        };

        let mut stats = BoxScore::default();
        let mut extra = Map::new();
        for (i, header) in headers.iter().enumerate() {
            let Some(v) = cells.get(i) else {
                continue;
            };
            let lower = header.to_ascii_lowercase();
            if let Some(slot) = stats.slot_mut(&lower) {
                *slot = as_f64_any(v);
            } else if !KNOWN_HEADERS.contains(&header.as_str()) {
                extra.insert(header.clone(), v.clone());
            }
        }

        let game_date = cell(idx("GAME_DATE"))
            .and_then(|v| v.as_str())
            .map(normalize_game_date)
            .unwrap_or_default();

        out.push(PlayerGameLog {
            season: season.to_string(),
            game_id,
            player_id,
            season_id: cell(idx("SEASON_ID")).and_then(as_string_any),
            player_name: cell(idx("PLAYER_NAME"))
                .and_then(as_string_any)
                .unwrap_or_default(),
            team_id: cell(idx("TEAM_ID")).and_then(as_i64_any),
            team_abbreviation: cell(idx("TEAM_ABBREVIATION")).and_then(as_string_any),
            team_name: cell(idx("TEAM_NAME")).and_then(as_string_any),
            game_date,
            matchup: cell(idx("MATCHUP"))
                .and_then(as_string_any)
                .unwrap_or_default(),
            wl: cell(idx("WL")).and_then(as_string_any),
            stats,
            video_available: cell(idx("VIDEO_AVAILABLE")).and_then(as_i64_any),
            extra,
            ingested_at,
        });
    }
    Ok(out)
}

/// The API returns ISO dates for this endpoint but `MAR 08, 2025` elsewhere;
/// both normalize to `2025-03-08`. Unrecognized input is kept verbatim.
pub fn normalize_game_date(raw: &str) -> String {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    if let Ok(d) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
        return d.format("%Y-%m-%d").to_string();
    }
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%b %d, %Y") {
        return d.format("%Y-%m-%d").to_string();
    }
    trimmed.to_string()
}

fn as_string_any(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    if let Some(f) = v.as_f64() {
        return (f.fract() == 0.0).then_some(f as i64);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

fn as_f64_any(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    let s = v.as_str()?.trim();
    // Minutes sometimes arrive as "34:12".
    if let Some((m, sec)) = s.split_once(':') {
        let m = m.parse::<f64>().ok()?;
        let sec = sec.parse::<f64>().ok()?;
        return Some(m + sec / 60.0);
    }
    s.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{as_f64_any, normalize_game_date};

    #[test]
    fn game_dates_normalize() {
        assert_eq!(normalize_game_date("2025-03-08"), "2025-03-08");
        assert_eq!(normalize_game_date("2025-03-08T00:00:00"), "2025-03-08");
        assert_eq!(normalize_game_date("MAR 08, 2025"), "2025-03-08");
        assert_eq!(normalize_game_date("soon"), "soon");
    }

    #[test]
    fn minutes_accept_clock_format() {
        assert_eq!(as_f64_any(&json!("34:30")), Some(34.5));
        assert_eq!(as_f64_any(&json!(31)), Some(31.0));
        assert_eq!(as_f64_any(&json!(null)), None);
    }
}
