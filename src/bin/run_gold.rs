use anyhow::Result;

use nba_medallion::gold::run_gold;
use nba_medallion::startup::start;

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (_config, mut conn) = start(&args)?;

    let build = run_gold(&mut conn)?;
    println!("Gold layer rebuilt: {} feature rows", build.rows);
    Ok(())
}
