use anyhow::{Context, Result};

use nba_medallion::cli_args::value_arg;
use nba_medallion::forest::ForestParams;
use nba_medallion::startup::start;
use nba_medallion::train::run_training;

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (config, mut conn) = start(&args)?;

    let mut params = ForestParams::default();
    if let Some(raw) = value_arg(&args, "--trees") {
        params.n_estimators = raw.parse().context("--trees must be a positive integer")?;
    }
    if let Some(raw) = value_arg(&args, "--seed") {
        params.seed = raw.parse().context("--seed must be an integer")?;
    }

    let report = run_training(&mut conn, &config.model_dir, params)?;
    println!(
        "Trained on {} rows, tested on {}",
        report.train_rows, report.test_rows
    );
    println!("MAE: {:.2}", report.mae);
    println!("R^2: {:.3}", report.r2);
    println!("Model: {}", report.model_path.display());
    Ok(())
}
