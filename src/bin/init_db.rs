use anyhow::Result;

use nba_medallion::startup::start;
use nba_medallion::warehouse::{BRONZE_GAME_LOGS, GOLD_RUN_LOG, count_rows};

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (config, conn) = start(&args)?;

    println!("Warehouse ready: {}", config.database_path.display());
    println!("{BRONZE_GAME_LOGS}: {} rows", count_rows(&conn, BRONZE_GAME_LOGS)?);
    println!("{GOLD_RUN_LOG}: {} rows", count_rows(&conn, GOLD_RUN_LOG)?);
    Ok(())
}
