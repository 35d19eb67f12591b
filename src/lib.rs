pub mod anomalies;
pub mod bronze;
pub mod bronze_ingest;
pub mod cli_args;
pub mod config;
pub mod error;
pub mod features;
pub mod forest;
pub mod game_log;
pub mod gold;
pub mod http_client;
pub mod logging;
pub mod pipeline;
pub mod quality;
pub mod retry;
pub mod run_log;
pub mod season;
pub mod season_fetch;
pub mod silver;
pub mod startup;
pub mod train;
pub mod warehouse;
