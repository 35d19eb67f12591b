use std::collections::HashMap;

/// `--db`, `--seasons`, `--lookback-days` accept both `--flag=value` and
/// `--flag value`; `--full-refresh` is a bare switch.
pub fn env_overrides(args: &[String]) -> HashMap<&'static str, String> {
    let mut out = HashMap::new();
    if let Some(db) = value_arg(args, "--db") {
        out.insert("DATABASE_URL", db);
    }
    if let Some(seasons) = value_arg(args, "--seasons") {
        out.insert("NBA_SEASONS", seasons);
    }
    if let Some(days) = value_arg(args, "--lookback-days") {
        out.insert("LOOKBACK_DAYS", days);
    }
    if let Some(path) = value_arg(args, "--export") {
        out.insert("ANOMALY_EXPORT_PATH", path);
    }
    if has_flag(args, "--full-refresh") {
        out.insert("FULL_REFRESH", "true".to_string());
    }
    out
}

pub fn value_arg(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|arg| arg == name)
}

#[cfg(test)]
mod tests {
    use super::{env_overrides, value_arg};

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn both_flag_forms_work() {
        assert_eq!(
            value_arg(&args(&["--db=nba.db"]), "--db").as_deref(),
            Some("nba.db")
        );
        assert_eq!(
            value_arg(&args(&["--db", "nba.db"]), "--db").as_deref(),
            Some("nba.db")
        );
        assert_eq!(value_arg(&args(&["--db", "--full-refresh"]), "--db"), None);
    }

    #[test]
    fn overrides_map_to_env_keys() {
        let map = env_overrides(&args(&["--seasons=2024-25", "--full-refresh", "--db", "x.db"]));
        assert_eq!(map.get("NBA_SEASONS").map(String::as_str), Some("2024-25"));
        assert_eq!(map.get("FULL_REFRESH").map(String::as_str), Some("true"));
        assert_eq!(map.get("DATABASE_URL").map(String::as_str), Some("x.db"));
        assert!(!map.contains_key("LOOKBACK_DAYS"));
    }
}
