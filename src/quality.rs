use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use tracing::{info, warn};

struct Check {
    name: &'static str,
    sql: &'static str,
    passes: fn(i64) -> bool,
}

const CHECKS: [Check; 3] = [
    Check {
        name: "gold_player_features has rows",
        sql: "SELECT COUNT(*) FROM gold_player_features",
        passes: |n| n > 0,
    },
    Check {
        name: "silver keys not null",
        sql: "SELECT COUNT(*) FROM silver_player_game_logs
              WHERE season IS NULL OR game_id IS NULL OR player_id IS NULL",
        passes: |n| n == 0,
    },
    Check {
        name: "opponent ranks within 0..=32",
        sql: "SELECT COUNT(*) FROM gold_player_features
              WHERE opp_pts_allowed_rank IS NOT NULL
                AND (opp_pts_allowed_rank < 0 OR opp_pts_allowed_rank > 32)",
        passes: |n| n == 0,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: &'static str,
    pub value: i64,
    pub passed: bool,
}

/// Evaluate every check. A check whose query cannot run (missing table) is
/// an error, not a failed check.
pub fn run_checks(conn: &Connection) -> Result<Vec<CheckResult>> {
    CHECKS
        .iter()
        .map(|check| {
            let value: i64 = conn
                .query_row(check.sql, [], |row| row.get(0))
                .with_context(|| format!("quality check {:?}", check.name))?;
            let passed = (check.passes)(value);
            if passed {
                info!(check = check.name, value, "quality check passed");
            } else {
                warn!(check = check.name, value, "quality check failed");
            }
            Ok(CheckResult {
                name: check.name,
                value,
                passed,
            })
        })
        .collect()
}

/// Run every check and fail if any did not pass.
pub fn check_quality(conn: &Connection) -> Result<Vec<CheckResult>> {
    let results = run_checks(conn)?;
    let failures = results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| format!("{} ({})", r.name, r.value))
        .collect::<Vec<_>>();
    if !failures.is_empty() {
        bail!("quality checks failed: {}", failures.join(", "));
    }
    Ok(results)
}
