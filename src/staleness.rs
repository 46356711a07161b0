use chrono::NaiveDate;
use serde::Serialize;

pub const DEFAULT_STALENESS_DAYS: i64 = 7;

/// Date assumed for a folder whose name is not a date, or for a dataset
/// with no folder at all. Old enough to always be stale.
pub fn sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Freshness {
    pub age_days: i64,
    pub stale: bool,
    pub today: NaiveDate,
}

pub fn parse_folder_date(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
}

/// Compares a folder date with `today`. Never reads the clock.
pub fn evaluate(folder_date: Option<NaiveDate>, today: NaiveDate, threshold_days: i64) -> Freshness {
    let date = folder_date.unwrap_or_else(sentinel_date);
    let age_days = (today - date).num_days();
    Freshness {
        age_days,
        stale: age_days > threshold_days,
        today,
    }
}
