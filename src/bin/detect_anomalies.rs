use anyhow::Result;

use nba_medallion::anomalies::run_anomalies;
use nba_medallion::startup::start;

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (config, mut conn) = start(&args)?;

    let report = run_anomalies(&mut conn, config.anomaly_export_path.as_deref())?;
    println!(
        "Anomalies: {} rows ({} over, {} under)",
        report.rows, report.overperform, report.underperform
    );
    if let Some(path) = report.exported {
        println!("Exported to {}", path.display());
    }
    Ok(())
}
