use anyhow::{Result, bail};

use nba_medallion::quality::run_checks;
use nba_medallion::startup::start;

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (_config, conn) = start(&args)?;

    let results = run_checks(&conn)?;
    for result in &results {
        let mark = if result.passed { "ok  " } else { "FAIL" };
        println!("{mark} {}: {}", result.name, result.value);
    }
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        bail!("{failed} quality check(s) failed");
    }
    println!("All quality checks passed.");
    Ok(())
}
