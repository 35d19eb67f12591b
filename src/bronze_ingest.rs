use chrono::NaiveDate;
use rand::Rng;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::bronze::{MergeReport, load_batch};
use crate::config::PipelineConfig;
use crate::error::{FetchError, PipelineError};
use crate::game_log::PlayerGameLog;
use crate::retry::{Attempted, Sleeper, retry_with_backoff};
use crate::run_log::{RunOutcome, run_logged};
use crate::season::SeasonWindow;
use crate::season_fetch::SeasonSource;

pub const LAYER: &str = "bronze";

#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub windows: Vec<SeasonWindow>,
    pub seasons_fetched: usize,
    /// Seasons whose retries ran out and were skipped.
    pub unavailable: Vec<String>,
    pub rows_fetched: usize,
    /// `None` when nothing was fetched and the write was skipped.
    pub merge: Option<MergeReport>,
}

impl RunOutcome for IngestSummary {
    fn rows_processed(&self) -> usize {
        self.merge.map(|m| m.staged).unwrap_or(0)
    }

    fn note(&self) -> Option<String> {
        let skipped = (!self.unavailable.is_empty())
            .then(|| format!("skipped unavailable seasons: {}", self.unavailable.join(", ")));
        if self.merge.is_none() {
            let windows = self
                .windows
                .iter()
                .map(SeasonWindow::describe)
                .collect::<Vec<_>>()
                .join(", ");
            let mut note = format!("no data fetched for {windows}; bronze write skipped");
            if let Some(skipped) = skipped {
                note.push_str("; ");
                note.push_str(&skipped);
            }
            return Some(note);
        }
        skipped
    }
}

/// One logged bronze run. `today` anchors the incremental lookback window.
pub fn ingest_bronze<S, Z, R>(
    conn: &mut Connection,
    config: &PipelineConfig,
    source: &S,
    sleeper: &mut Z,
    rng: &mut R,
    today: NaiveDate,
) -> Result<IngestSummary, PipelineError>
where
    S: SeasonSource + ?Sized,
    Z: Sleeper + ?Sized,
    R: Rng,
{
    run_logged(conn, LAYER, |conn| {
        let windows = config
            .seasons
            .iter()
            .map(|s| SeasonWindow::for_run(s, config.full_refresh, config.lookback_days, today))
            .collect::<Vec<_>>();

        let fetched = fetch_windows(config, &windows, source, sleeper, rng)?;
        info!(
            seasons = fetched.seasons_fetched,
            unavailable = fetched.unavailable.len(),
            rows = fetched.rows.len(),
            "bronze fetch finished"
        );

        let merge = load_batch(conn, &fetched.rows)?;
        if merge.is_none() {
            info!("no rows fetched; skipping bronze write");
        }

        Ok(IngestSummary {
            windows,
            seasons_fetched: fetched.seasons_fetched,
            unavailable: fetched.unavailable,
            rows_fetched: fetched.rows.len(),
            merge,
        })
    })
}

struct Fetched {
    rows: Vec<PlayerGameLog>,
    seasons_fetched: usize,
    unavailable: Vec<String>,
}

fn fetch_windows<S, Z, R>(
    config: &PipelineConfig,
    windows: &[SeasonWindow],
    source: &S,
    sleeper: &mut Z,
    rng: &mut R,
) -> Result<Fetched, PipelineError>
where
    S: SeasonSource + ?Sized,
    Z: Sleeper + ?Sized,
    R: Rng,
{
    let mut out = Fetched {
        rows: Vec::new(),
        seasons_fetched: 0,
        unavailable: Vec::new(),
    };

    for (idx, window) in windows.iter().enumerate() {
        if idx > 0 && !config.season_throttle.is_zero() {
            sleeper.sleep(config.season_throttle);
        }

        let attempted = retry_with_backoff(
            &config.retry,
            &mut *sleeper,
            &mut *rng,
            FetchError::is_transient,
            |attempt| {
                info!(window = %window.describe(), attempt, "fetching season");
                source.fetch_season(window)
            },
        );

        match attempted {
            Attempted::Ready(rows) => {
                info!(window = %window.describe(), rows = rows.len(), "season fetched");
                out.seasons_fetched += 1;
                out.rows.extend(rows);
            }
            Attempted::Unavailable {
                attempts,
                last_error,
            } => {
                if !config.skip_unavailable {
                    return Err(PipelineError::ExhaustedRetries {
                        season: window.season().to_string(),
                        attempts,
                        last_error,
                    });
                }
                warn!(
                    window = %window.describe(),
                    attempts,
                    error = %last_error,
                    "season unavailable, skipping"
                );
                out.unavailable.push(window.season().to_string());
            }
            Attempted::Fatal(source_err) => {
                return Err(PipelineError::Fetch {
                    season: window.season().to_string(),
                    source: source_err,
                });
            }
        }
    }

    Ok(out)
}
