use anyhow::Result;

use nba_medallion::silver::run_silver;
use nba_medallion::startup::start;

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (_config, mut conn) = start(&args)?;

    let build = run_silver(&mut conn)?;
    println!("Silver layer rebuilt: {} rows", build.rows);
    Ok(())
}
