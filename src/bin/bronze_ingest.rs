use anyhow::Result;
use chrono::Utc;

use nba_medallion::bronze_ingest::ingest_bronze;
use nba_medallion::retry::ThreadSleeper;
use nba_medallion::run_log::RunOutcome;
use nba_medallion::season_fetch::NbaStatsSource;
use nba_medallion::startup::start;

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (config, mut conn) = start(&args)?;

    let source = NbaStatsSource::new(&config.stats_base_url, config.request_timeout)?;
    let summary = ingest_bronze(
        &mut conn,
        &config,
        &source,
        &mut ThreadSleeper,
        &mut rand::thread_rng(),
        Utc::now().date_naive(),
    )?;

    println!("Bronze ingest complete");
    for window in &summary.windows {
        println!("  window: {}", window.describe());
    }
    println!(
        "Seasons fetched: {}/{}",
        summary.seasons_fetched,
        summary.windows.len()
    );
    println!("Rows fetched: {}", summary.rows_fetched);
    if let Some(merge) = summary.merge {
        println!(
            "Rows merged: {} ({} new, {} updated), bronze total {}",
            merge.staged, merge.inserted, merge.updated, merge.total_rows
        );
    }
    if let Some(note) = summary.note() {
        println!("Note: {note}");
    }
    Ok(())
}
