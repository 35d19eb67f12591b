use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::season::parse_season;

pub const DEFAULT_SEASONS: &[&str] = &["2024-25", "2023-24"];
pub const DEFAULT_STATS_BASE_URL: &str = "https://stats.nba.com/stats";
const DEFAULT_LOOKBACK_DAYS: u32 = 3;
const MAX_LOOKBACK_DAYS: u32 = 366;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_TIMEOUT_SECS: u64 = 180;
const DEFAULT_THROTTLE_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_path: PathBuf,
    pub seasons: Vec<String>,
    pub full_refresh: bool,
    pub lookback_days: u32,
    pub stats_base_url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Pause between consecutive season requests.
    pub season_throttle: Duration,
    /// Skip a season whose retries ran out instead of failing the run.
    pub skip_unavailable: bool,
    pub model_dir: PathBuf,
    pub anomaly_export_path: Option<PathBuf>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl PipelineConfig {
    /// Read configuration from the process environment, with command-line
    /// overrides taking precedence.
    pub fn load(args: &[String]) -> Result<Self, ConfigError> {
        let overrides = crate::cli_args::env_overrides(args);
        Self::from_lookup(|key| {
            overrides
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        })
    }

    pub fn from_map(vars: &HashMap<&str, &str>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let database_path = database_path(&database_url)?;

        let seasons = match get("NBA_SEASONS") {
            Some(raw) => parse_season_list(&raw)?,
            None => DEFAULT_SEASONS.iter().map(|s| s.to_string()).collect(),
        };

        let full_refresh = parse_bool("FULL_REFRESH", get("FULL_REFRESH"), false)?;
        let lookback_days = parse_num("LOOKBACK_DAYS", get("LOOKBACK_DAYS"), DEFAULT_LOOKBACK_DAYS)?;
        if lookback_days > MAX_LOOKBACK_DAYS {
            return Err(ConfigError::Invalid {
                key: "LOOKBACK_DAYS",
                value: lookback_days.to_string(),
                reason: format!("at most {MAX_LOOKBACK_DAYS} days; use FULL_REFRESH for a whole season"),
            });
        }
        let timeout_secs = parse_num(
            "NBA_REQUEST_TIMEOUT_SECS",
            get("NBA_REQUEST_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS,
        )?
        .clamp(1, MAX_TIMEOUT_SECS);

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_num(
                "RETRY_MAX_ATTEMPTS",
                get("RETRY_MAX_ATTEMPTS"),
                defaults.max_attempts,
            )?
            .max(1),
            base_delay: parse_secs(
                "RETRY_BASE_DELAY_SECS",
                get("RETRY_BASE_DELAY_SECS"),
                defaults.base_delay,
            )?,
            jitter: parse_secs("RETRY_JITTER_SECS", get("RETRY_JITTER_SECS"), defaults.jitter)?,
        };

        let throttle_ms = parse_num(
            "SEASON_THROTTLE_MS",
            get("SEASON_THROTTLE_MS"),
            DEFAULT_THROTTLE_MS,
        )?;

        Ok(Self {
            database_path,
            seasons,
            full_refresh,
            lookback_days,
            stats_base_url: get("NBA_STATS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_STATS_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            request_timeout: Duration::from_secs(timeout_secs),
            retry,
            season_throttle: Duration::from_millis(throttle_ms),
            skip_unavailable: parse_bool(
                "BRONZE_SKIP_UNAVAILABLE",
                get("BRONZE_SKIP_UNAVAILABLE"),
                true,
            )?,
            model_dir: get("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models")),
            anomaly_export_path: get("ANOMALY_EXPORT_PATH").map(PathBuf::from),
            logging: LoggingConfig {
                level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                json: parse_bool("LOG_JSON", get("LOG_JSON"), false)?,
            },
        })
    }
}

/// Accepts `sqlite://path`, `sqlite:path` or a bare filesystem path.
pub fn database_path(url: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = url.trim();
    let path = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    if path.contains("://") {
        return Err(ConfigError::Invalid {
            key: "DATABASE_URL",
            value: trimmed.to_string(),
            reason: "only sqlite warehouses are supported".to_string(),
        });
    }
    if path.is_empty() {
        return Err(ConfigError::Missing("DATABASE_URL"));
    }
    Ok(PathBuf::from(path))
}

fn parse_season_list(raw: &str) -> Result<Vec<String>, ConfigError> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let season = parse_season(part)?;
        if !out.contains(&season) {
            out.push(season);
        }
    }
    if out.is_empty() {
        return Err(ConfigError::Invalid {
            key: "NBA_SEASONS",
            value: raw.to_string(),
            reason: "no seasons listed".to_string(),
        });
    }
    Ok(out)
}

fn parse_bool(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    raw.parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        value: raw,
        reason: "expected a non-negative integer".to_string(),
    })
}

fn parse_secs(
    key: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.parse::<f64>().ok().map(Duration::try_from_secs_f64) {
        Some(Ok(duration)) => Ok(duration),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "expected seconds as a non-negative number".to_string(),
        }),
    }
}
