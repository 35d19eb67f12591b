use std::fs;
use std::path::PathBuf;

use chrono::{TimeZone, Utc};

use nba_medallion::error::FetchError;
use nba_medallion::game_log::parse_league_game_log;

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

#[test]
fn parses_league_game_log_fixture() {
    let raw = read_fixture("leaguegamelog.json");
    let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
    let rows = parse_league_game_log(&raw, "2024-25", at).expect("fixture should parse");

    // The row without PLAYER_ID is dropped.
    assert_eq!(rows.len(), 2);

    let lebron = &rows[0];
    assert_eq!(lebron.season, "2024-25");
    assert_eq!(lebron.key(), ("2024-25", "0022400061", 2544));
    assert_eq!(lebron.player_name, "LeBron James");
    assert_eq!(lebron.team_abbreviation.as_deref(), Some("LAL"));
    assert_eq!(lebron.game_date, "2024-10-22");
    assert_eq!(lebron.matchup, "LAL vs. MIN");
    assert_eq!(lebron.stats.pts, Some(16.0));
    assert_eq!(lebron.stats.fg_pct, Some(0.462));
    assert_eq!(lebron.ingested_at, at);
    assert_eq!(
        lebron.extra.get("NICKNAME").and_then(|v| v.as_str()),
        Some("LeBron")
    );

    let ant = &rows[1];
    assert_eq!(ant.player_id, 1630162);
    assert_eq!(ant.stats.min, Some(36.5));
    assert_eq!(ant.stats.plus_minus, Some(-7.0));
    assert_eq!(ant.wl.as_deref(), Some("L"));
}

#[test]
fn sql_values_follow_bronze_column_order() {
    let raw = read_fixture("leaguegamelog.json");
    let rows = parse_league_game_log(&raw, "2024-25", Utc::now()).unwrap();
    let values = rows[0].sql_values();
    assert_eq!(values.len(), nba_medallion::warehouse::BRONZE_COLUMNS.len());
}

#[test]
fn null_body_is_empty() {
    let rows = parse_league_game_log("null", "2024-25", Utc::now()).expect("null should parse");
    assert!(rows.is_empty());
}

#[test]
fn empty_row_set_is_empty() {
    let raw = r#"{"resultSets":[{"name":"LeagueGameLog","headers":["GAME_ID","PLAYER_ID"],"rowSet":[]}]}"#;
    let rows = parse_league_game_log(raw, "2023-24", Utc::now()).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn malformed_payloads_are_fatal() {
    for raw in [
        "<html>blocked</html>",
        r#"{"resource":"leaguegamelog"}"#,
        r#"{"resultSets":[{"name":"LeagueGameLog","headers":["PLAYER_NAME"],"rowSet":[]}]}"#,
    ] {
        let err = parse_league_game_log(raw, "2024-25", Utc::now()).unwrap_err();
        assert!(matches!(err, FetchError::Payload(_)), "{raw}: {err}");
        assert!(!err.is_transient());
    }
}
