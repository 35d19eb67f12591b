use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use reqwest::blocking::Client;
use tracing::debug;

use crate::error::FetchError;
use crate::game_log::{PlayerGameLog, parse_league_game_log};
use crate::http_client::stats_http_client;
use crate::season::SeasonWindow;

/// Anything that can produce one season window's player game logs.
pub trait SeasonSource {
    fn fetch_season(&self, window: &SeasonWindow) -> Result<Vec<PlayerGameLog>, FetchError>;
}

pub struct NbaStatsSource {
    client: Client,
    base_url: String,
}

impl NbaStatsSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: stats_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/leaguegamelog", self.base_url)
    }
}

/// Query parameters for a regular-season, player-level game log request.
pub fn league_game_log_query(window: &SeasonWindow) -> Vec<(&'static str, String)> {
    vec![
        ("Counter", "1000".to_string()),
        ("DateFrom", window.date_from_param().unwrap_or_default()),
        ("DateTo", window.date_to_param().unwrap_or_default()),
        ("Direction", "DESC".to_string()),
        ("LeagueID", "00".to_string()),
        ("PlayerOrTeam", "P".to_string()),
        ("Season", window.season().to_string()),
        ("SeasonType", "Regular Season".to_string()),
        ("Sorter", "DATE".to_string()),
    ]
}

impl SeasonSource for NbaStatsSource {
    fn fetch_season(&self, window: &SeasonWindow) -> Result<Vec<PlayerGameLog>, FetchError> {
        let url = self.url();
        debug!(url = %url, window = %window.describe(), "requesting league game log");
        let resp = self
            .client
            .get(&url)
            .query(&league_game_log_query(window))
            .send()
            .map_err(FetchError::from_reqwest)?;

        let status = resp.status();
        let body = resp.text().map_err(FetchError::from_reqwest)?;
        if !status.is_success() {
            let snippet = body
                .trim()
                .replace(['\n', '\r'], " ")
                .chars()
                .take(220)
                .collect::<String>();
            return Err(FetchError::from_status(status.as_u16(), snippet));
        }

        parse_league_game_log(&body, window.season(), Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::league_game_log_query;
    use crate::season::SeasonWindow;

    #[test]
    fn query_carries_fixed_filters_and_window() {
        let from = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        let q = league_game_log_query(&SeasonWindow::incremental("2024-25", from, to));
        let get = |k: &str| q.iter().find(|(key, _)| *key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("Season"), Some("2024-25"));
        assert_eq!(get("SeasonType"), Some("Regular Season"));
        assert_eq!(get("PlayerOrTeam"), Some("P"));
        assert_eq!(get("DateFrom"), Some("01/02/2025"));
        assert_eq!(get("DateTo"), Some("01/05/2025"));
    }

    #[test]
    fn full_season_leaves_dates_blank() {
        let q = league_game_log_query(&SeasonWindow::full("2023-24"));
        assert!(q.iter().any(|(k, v)| *k == "DateFrom" && v.is_empty()));
    }
}
