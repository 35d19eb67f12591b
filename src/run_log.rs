use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{StorageContext, StorageError};
use crate::warehouse::{GOLD_RUN_LOG, ensure_run_log_table};

pub const MAX_ERROR_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failure,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunLogEntry {
    pub run_id: String,
    pub layer: String,
    pub rows_processed: Option<i64>,
    pub status: RunStatus,
    pub runtime_seconds: f64,
    /// Error text on failure; an explanatory note on some successes.
    pub error_message: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// What a logged step reports back on success.
pub trait RunOutcome {
    fn rows_processed(&self) -> usize;

    fn note(&self) -> Option<String> {
        None
    }
}

pub fn append_entry(conn: &Connection, entry: &RunLogEntry) -> Result<(), StorageError> {
    ensure_run_log_table(conn)?;
    conn.execute(
        &format!(
            "INSERT INTO {GOLD_RUN_LOG}
                (run_id, layer, rows_processed, status, runtime_seconds, error_message, executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        params![
            entry.run_id,
            entry.layer,
            entry.rows_processed,
            entry.status.as_str(),
            entry.runtime_seconds,
            entry.error_message,
            entry.executed_at.to_rfc3339(),
        ],
    )
    .storage("insert run log entry")?;
    Ok(())
}

/// Most recent entries first.
pub fn recent_runs(conn: &Connection, limit: usize) -> Result<Vec<RunLogEntry>, StorageError> {
    ensure_run_log_table(conn)?;
    let mut stmt = conn
        .prepare(&format!(
            "SELECT run_id, layer, rows_processed, status, runtime_seconds, error_message, executed_at
             FROM {GOLD_RUN_LOG}
             ORDER BY executed_at DESC, rowid DESC
             LIMIT ?1"
        ))
        .storage("prepare run log query")?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            let status: String = row.get(3)?;
            let executed_at: String = row.get(6)?;
            Ok(RunLogEntry {
                run_id: row.get(0)?,
                layer: row.get(1)?,
                rows_processed: row.get(2)?,
                status: RunStatus::parse(&status).unwrap_or(RunStatus::Failure),
                runtime_seconds: row.get(4)?,
                error_message: row.get(5)?,
                executed_at: DateTime::parse_from_rfc3339(&executed_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_default(),
            })
        })
        .storage("query run log")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.storage("decode run log row")?);
    }
    Ok(out)
}

pub fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_CHARS).collect()
}

/// Run `work` inside a measured span and record exactly one run log entry
/// for it, whichever way it ends.
///
/// On success the entry carries the outcome's row count and note. On failure
/// it carries a NULL row count and the truncated error, and the original
/// error is returned unchanged. If writing the failure entry itself fails,
/// that is logged and the original error still wins. If the success entry
/// cannot be written, one failure entry describing that is attempted before
/// the storage error is returned.
pub fn run_logged<T, E, F>(conn: &mut Connection, layer: &str, work: F) -> Result<T, E>
where
    T: RunOutcome,
    E: fmt::Display + From<StorageError>,
    F: FnOnce(&mut Connection) -> Result<T, E>,
{
    let run_id = Uuid::new_v4().to_string();
    let started = Instant::now();
    info!(run_id = %run_id, layer, "run started");

    let result = work(conn);
    let runtime_seconds = started.elapsed().as_secs_f64();

    match result {
        Ok(outcome) => {
            let entry = RunLogEntry {
                run_id,
                layer: layer.to_string(),
                rows_processed: Some(outcome.rows_processed() as i64),
                status: RunStatus::Success,
                runtime_seconds,
                error_message: outcome.note().map(|n| truncate_error(&n)),
                executed_at: Utc::now(),
            };
            if let Err(log_err) = append_entry(conn, &entry) {
                let fallback = RunLogEntry {
                    rows_processed: None,
                    status: RunStatus::Failure,
                    error_message: Some(truncate_error(&format!(
                        "step finished but its run entry was not recorded: {log_err}"
                    ))),
                    executed_at: Utc::now(),
                    ..entry
                };
                if let Err(fallback_err) = append_entry(conn, &fallback) {
                    warn!(error = %fallback_err, "could not record run outcome");
                }
                return Err(log_err.into());
            }
            info!(
                run_id = %entry.run_id,
                layer,
                rows = outcome.rows_processed(),
                runtime_seconds,
                "run succeeded"
            );
            Ok(outcome)
        }
        Err(err) => {
            let message = truncate_error(&format!("{err:#}"));
            error!(run_id = %run_id, layer, runtime_seconds, error = %message, "run failed");
            let entry = RunLogEntry {
                run_id,
                layer: layer.to_string(),
                rows_processed: None,
                status: RunStatus::Failure,
                runtime_seconds,
                error_message: Some(message),
                executed_at: Utc::now(),
            };
            if let Err(log_err) = append_entry(conn, &entry) {
                warn!(error = %log_err, "could not record failed run");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;

    use super::{MAX_ERROR_CHARS, RunOutcome, RunStatus, recent_runs, run_logged, truncate_error};
    use crate::error::StorageError;

    struct Rows(usize);

    impl RunOutcome for Rows {
        fn rows_processed(&self) -> usize {
            self.0
        }
    }

    #[derive(Debug, thiserror::Error)]
    enum StepError {
        #[error("boom: {0}")]
        Boom(String),
        #[error(transparent)]
        Storage(#[from] StorageError),
    }

    #[test]
    fn truncates_on_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_CHARS + 10);
        let out = truncate_error(&long);
        assert_eq!(out.chars().count(), MAX_ERROR_CHARS);
    }

    #[test]
    fn success_and_failure_each_write_one_entry() {
        let mut conn = Connection::open_in_memory().unwrap();

        let ok: Result<Rows, StepError> = run_logged(&mut conn, "silver", |_| Ok(Rows(12)));
        assert!(ok.is_ok());

        let failed: Result<Rows, StepError> =
            run_logged(&mut conn, "gold", |_| Err(StepError::Boom("x".repeat(5000))));
        assert!(matches!(failed, Err(StepError::Boom(_))));

        let runs = recent_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 2);

        let silver = runs.iter().find(|r| r.layer == "silver").unwrap();
        assert_eq!(silver.status, RunStatus::Success);
        assert_eq!(silver.rows_processed, Some(12));
        assert!(silver.error_message.is_none());

        let gold = runs.iter().find(|r| r.layer == "gold").unwrap();
        assert_eq!(gold.status, RunStatus::Failure);
        assert_eq!(gold.rows_processed, None);
        let msg = gold.error_message.as_deref().unwrap();
        assert!(msg.starts_with("boom: "));
        assert_eq!(msg.chars().count(), MAX_ERROR_CHARS);
        assert_ne!(silver.run_id, gold.run_id);
    }

    #[test]
    fn unrecordable_success_falls_back_to_a_failure_entry() {
        let mut conn = Connection::open_in_memory().unwrap();
        crate::warehouse::ensure_run_log_table(&conn).unwrap();
        conn.execute_batch(&format!(
            "CREATE TRIGGER reject_success BEFORE INSERT ON {}
             WHEN NEW.status = 'success'
             BEGIN SELECT RAISE(ABORT, 'log rejected'); END;",
            crate::warehouse::GOLD_RUN_LOG
        ))
        .unwrap();

        let out: Result<Rows, StepError> = run_logged(&mut conn, "silver", |_| Ok(Rows(3)));
        assert!(matches!(out, Err(StepError::Storage(_))));

        let runs = recent_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failure);
        assert_eq!(runs[0].rows_processed, None);
        assert!(runs[0].error_message.as_deref().unwrap().contains("log rejected"));
    }
}
