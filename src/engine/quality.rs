//! Per-domain quality scoring: freshness and completeness.
//!
//! `score = mean(freshness, completeness)`; the gate passes at score >= 0.5
//! with no critical flag set. Critical flags are the no-source conditions;
//! STALE_DATA and INCOMPLETE_DATA degrade the score without blocking alone.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::engine::canonical::parse_iso_utc;
use crate::engine::evidence::{
    QualityReport, FLAG_INCOMPLETE_DATA, FLAG_INSUFFICIENT_SOURCES, FLAG_NO_SOURCES_AVAILABLE,
    FLAG_STALE_DATA,
};

/// Quality gate pass threshold.
pub const QUALITY_PASS_THRESHOLD: f64 = 0.5;

/// A normalized payload from one source, pre-consensus. Raw `data` is still
/// untyped here; the typed boundary is the consensus output.
#[derive(Debug, Clone)]
pub struct NormalizedPayload {
    pub source_name: String,
    pub domain: String,
    pub data: Value,
    pub fetched_at_utc: String,
    pub source_confidence: f64,
}

/// Freshness within the window: linear decay from 1.0 at age zero to 0.0 at
/// `window_hours`. Unparseable timestamps score 0 and count as stale.
pub fn check_freshness(fetched_at_utc: &str, window_hours: u32, now: DateTime<Utc>) -> (bool, f64) {
    let Some(fetched) = parse_iso_utc(fetched_at_utc) else {
        return (false, 0.0);
    };
    let age_hours = (now - fetched).num_seconds() as f64 / 3600.0;
    let is_fresh = age_hours <= window_hours as f64;
    let score = (1.0 - age_hours / window_hours as f64).max(0.0);
    (is_fresh, score)
}

/// Completeness: fraction of required fields present in the payload data.
pub fn check_completeness(data: &Value, required_fields: &[&str]) -> (bool, f64) {
    let Some(map) = data.as_object() else {
        return (false, 0.0);
    };
    if map.is_empty() {
        return (false, 0.0);
    }
    if required_fields.is_empty() {
        return (false, 0.0);
    }
    let present = required_fields.iter().filter(|f| map.contains_key(**f)).count();
    let score = present as f64 / required_fields.len() as f64;
    (present == required_fields.len(), score)
}

/// Assess quality of the payloads collected for one domain.
pub fn assess_quality(
    payloads: &[NormalizedPayload],
    window_hours: u32,
    required_fields: &[&str],
    now: DateTime<Utc>,
) -> QualityReport {
    if payloads.is_empty() {
        return QualityReport::failed(vec![FLAG_NO_SOURCES_AVAILABLE.to_string()]);
    }

    let mut flags: Vec<String> = Vec::new();
    let mut freshness_scores = Vec::with_capacity(payloads.len());
    let mut completeness_scores = Vec::with_capacity(payloads.len());

    for payload in payloads {
        let (is_fresh, freshness) = check_freshness(&payload.fetched_at_utc, window_hours, now);
        freshness_scores.push(freshness);
        if !is_fresh {
            push_unique(&mut flags, FLAG_STALE_DATA);
        }

        let (is_complete, completeness) = check_completeness(&payload.data, required_fields);
        completeness_scores.push(completeness);
        if !is_complete {
            push_unique(&mut flags, FLAG_INCOMPLETE_DATA);
        }
    }

    let avg_freshness = mean(&freshness_scores);
    let avg_completeness = mean(&completeness_scores);
    let score = (avg_freshness + avg_completeness) / 2.0;

    let critical = [FLAG_NO_SOURCES_AVAILABLE, FLAG_INSUFFICIENT_SOURCES];
    let has_critical = flags.iter().any(|f| critical.contains(&f.as_str()));
    let passed = score >= QUALITY_PASS_THRESHOLD && !has_critical;

    QualityReport {
        passed,
        score,
        flags,
    }
}

/// Required fields per domain (consensus merge uses the same lists).
pub fn required_fields_for_domain(domain: &str) -> &'static [&'static str] {
    match domain {
        "fixtures" => &["match_id", "home_team", "away_team"],
        "stats" => &["match_id"],
        _ => &[],
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn push_unique(flags: &mut Vec<String>, flag: &str) {
    if !flags.iter().any(|f| f == flag) {
        flags.push(flag.to_string());
    }
}
