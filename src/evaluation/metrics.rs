//! KPI aggregation over prediction outcomes (day / week / month, UTC).
//!
//! N/A outcomes never reach storage, so every row is a HIT or a MISS and
//! `hit_rate + miss_rate = 1` whenever the denominator is non-zero (enforced
//! by deriving the miss rate from the hit rate).

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Repository, StorageError};

/// KPI aggregation period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KpiPeriod {
    Day,
    Week,
    Month,
}

/// Aggregated KPIs for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiReport {
    pub period: KpiPeriod,
    pub reference_date_utc: String,
    pub total_predictions: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
}

fn start_of_day(reference: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(reference.year(), reference.month(), reference.day(), 0, 0, 0)
        .single()
        .unwrap_or(reference)
}

/// UTC bounds for the day containing the reference instant.
pub fn day_bounds(reference: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = start_of_day(reference);
    (start, start + Duration::days(1))
}

/// UTC bounds for the ISO week (Monday 00:00) containing the reference.
pub fn week_bounds(reference: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_back = reference.weekday().num_days_from_monday() as i64;
    let start = start_of_day(reference) - Duration::days(days_back);
    (start, start + Duration::days(7))
}

/// UTC bounds for the calendar month containing the reference.
pub fn month_bounds(reference: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(reference.year(), reference.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(reference);
    let end = if reference.month() == 12 {
        Utc.with_ymd_and_hms(reference.year() + 1, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(start)
    } else {
        Utc.with_ymd_and_hms(reference.year(), reference.month() + 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(start)
    };
    (start, end)
}

/// Compute KPIs for the period containing `reference_date_utc`.
pub fn get_kpis(
    repo: &dyn Repository,
    period: KpiPeriod,
    reference_date_utc: DateTime<Utc>,
) -> Result<KpiReport, StorageError> {
    let (start, end) = match period {
        KpiPeriod::Day => day_bounds(reference_date_utc),
        KpiPeriod::Week => week_bounds(reference_date_utc),
        KpiPeriod::Month => month_bounds(reference_date_utc),
    };

    let outcomes = repo.outcomes_between(start, end)?;
    let total = outcomes.len() as u64;
    let hits = outcomes.iter().filter(|o| o.hit_bool).count() as u64;
    let misses = total - hits;

    let (hit_rate, miss_rate) = if total == 0 {
        (0.0, 0.0)
    } else {
        let hit_rate = hits as f64 / total as f64;
        (hit_rate, 1.0 - hit_rate)
    };

    Ok(KpiReport {
        period,
        reference_date_utc: crate::engine::canonical::iso_utc(reference_date_utc),
        total_predictions: total,
        hits,
        misses,
        hit_rate,
        miss_rate,
    })
}
