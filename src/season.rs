use chrono::{Duration, NaiveDate};

use crate::error::ConfigError;

/// One unit of extraction work: a season, optionally narrowed to a date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonWindow {
    season: String,
    range: Option<DateRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl SeasonWindow {
    pub fn full(season: impl Into<String>) -> Self {
        Self {
            season: season.into(),
            range: None,
        }
    }

    pub fn incremental(season: impl Into<String>, from: NaiveDate, to: NaiveDate) -> Self {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        Self {
            season: season.into(),
            range: Some(DateRange { from, to }),
        }
    }

    /// Full season on a refresh run, otherwise the last `lookback_days` up to
    /// and including `today`. A lookback reaching past the calendar starts at
    /// the earliest representable date.
    pub fn for_run(season: &str, full_refresh: bool, lookback_days: u32, today: NaiveDate) -> Self {
        if full_refresh {
            return Self::full(season);
        }
        let from = today
            .checked_sub_signed(Duration::days(i64::from(lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        Self::incremental(season, from, today)
    }

    pub fn season(&self) -> &str {
        &self.season
    }

    pub fn range(&self) -> Option<DateRange> {
        self.range
    }

    pub fn is_incremental(&self) -> bool {
        self.range.is_some()
    }

    /// `MM/DD/YYYY`, the format the stats API expects for `DateFrom`/`DateTo`.
    pub fn date_from_param(&self) -> Option<String> {
        self.range.map(|r| r.from.format("%m/%d/%Y").to_string())
    }

    pub fn date_to_param(&self) -> Option<String> {
        self.range.map(|r| r.to.format("%m/%d/%Y").to_string())
    }

    pub fn describe(&self) -> String {
        match self.range {
            Some(r) => format!("{} ({}..{})", self.season, r.from, r.to),
            None => format!("{} (full season)", self.season),
        }
    }
}

/// Validate a season label like `2024-25`: four-digit start year followed by
/// the two-digit following year.
pub fn parse_season(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| ConfigError::Invalid {
        key: "NBA_SEASONS",
        value: trimmed.to_string(),
        reason: reason.to_string(),
    };

    let (start, end) = trimmed
        .split_once('-')
        .ok_or_else(|| invalid("expected YYYY-YY"))?;
    if start.len() != 4 || end.len() != 2 {
        return Err(invalid("expected YYYY-YY"));
    }
    let start_year = start
        .parse::<i32>()
        .map_err(|_| invalid("start year is not a number"))?;
    let end_year = end
        .parse::<i32>()
        .map_err(|_| invalid("end year is not a number"))?;
    if (start_year + 1).rem_euclid(100) != end_year {
        return Err(invalid("end year must follow start year"));
    }
    Ok(trimmed.to_string())
}
