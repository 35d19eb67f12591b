use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;

use nba_medallion::pipeline::run_pipeline;
use nba_medallion::retry::ThreadSleeper;
use nba_medallion::run_log::recent_runs;
use nba_medallion::season_fetch::NbaStatsSource;
use nba_medallion::startup::start;

const RECENT_RUNS: usize = 10;

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (config, mut conn) = start(&args)?;

    let source = NbaStatsSource::new(&config.stats_base_url, config.request_timeout)?;
    let mut rng = rand::thread_rng();
    let result = run_pipeline(
        &mut conn,
        &config,
        &source,
        &mut ThreadSleeper,
        &mut rng,
        Utc::now().date_naive(),
    );

    print_recent_runs(&conn);
    let report = result?;

    println!();
    println!("Pipeline complete");
    match report.bronze.merge {
        Some(merge) => println!(
            "bronze: {} staged ({} new, {} updated), {} total",
            merge.staged, merge.inserted, merge.updated, merge.total_rows
        ),
        None => println!("bronze: no new data"),
    }
    if !report.bronze.unavailable.is_empty() {
        println!("  skipped seasons: {}", report.bronze.unavailable.join(", "));
    }
    println!("silver: {} rows", report.silver.rows);
    println!("gold: {} feature rows", report.gold.rows);
    println!(
        "model: MAE {:.2}, R^2 {:.3} ({} train / {} test) -> {}",
        report.model.mae,
        report.model.r2,
        report.model.train_rows,
        report.model.test_rows,
        report.model.model_path.display()
    );
    println!(
        "anomalies: {} ({} over, {} under)",
        report.anomalies.rows, report.anomalies.overperform, report.anomalies.underperform
    );
    println!("quality checks passed: {}", report.checks.len());
    Ok(())
}

fn print_recent_runs(conn: &Connection) {
    let runs = match recent_runs(conn, RECENT_RUNS) {
        Ok(runs) => runs,
        Err(err) => {
            eprintln!("could not read run log: {err}");
            return;
        }
    };
    println!();
    println!("Recent runs:");
    for run in runs {
        println!(
            "  {} {:<9} {:<7} rows={:<6} {:>7.2}s {}",
            run.executed_at.format("%Y-%m-%d %H:%M:%S"),
            run.layer,
            run.status,
            run.rows_processed
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            run.runtime_seconds,
            run.error_message.as_deref().unwrap_or("")
        );
    }
}
