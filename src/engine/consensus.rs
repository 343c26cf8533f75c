//! Deterministic consensus merge across sources for one domain.
//!
//! Field values are taken from the highest-confidence, then freshest payload.
//! Numeric disagreement beyond the tolerance, or any non-numeric
//! disagreement, sets LOW_AGREEMENT on the merged quality report.

use serde_json::Value;

use crate::engine::canonical::parse_iso_utc;
use crate::engine::evidence::{QualityReport, FLAG_LOW_AGREEMENT};
use crate::engine::quality::NormalizedPayload;

/// Numeric disagreement tolerance for merged fields.
pub const CONSENSUS_NUMERIC_TOLERANCE: f64 = 0.1;

/// Fields merged per domain. Unknown domains merge the first payload's
/// top-level keys.
fn fields_to_merge(domain: &str, payloads: &[NormalizedPayload]) -> Vec<String> {
    match domain {
        "fixtures" => vec![
            "match_id",
            "home_team",
            "away_team",
            "kickoff_utc",
            "venue",
            "competition",
            "status",
        ]
        .into_iter()
        .map(str::to_string)
        .collect(),
        "stats" => vec!["match_id", "home_team_stats", "away_team_stats", "head_to_head"]
            .into_iter()
            .map(str::to_string)
            .collect(),
        _ => payloads
            .first()
            .and_then(|p| p.data.as_object())
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default(),
    }
}

/// Raw consensus for a domain: merged data plus the quality report with any
/// agreement flags appended. The typed parse happens after this step.
#[derive(Debug, Clone)]
pub struct ConsensusOutput {
    pub data: Value,
    pub quality: QualityReport,
    pub sources: Vec<String>,
}

/// Merge one field from all payloads. Returns `(value, has_disagreement)`.
fn merge_field(field: &str, sorted: &[&NormalizedPayload], tolerance: f64) -> (Option<Value>, bool) {
    let values: Vec<&Value> = sorted
        .iter()
        .filter_map(|p| p.data.as_object().and_then(|m| m.get(field)))
        .collect();
    let Some(first) = values.first() else {
        return (None, false);
    };

    let disagreement = if values.len() > 1 {
        if let Some(base) = first.as_f64() {
            values[1..]
                .iter()
                .filter_map(|v| v.as_f64())
                .any(|v| (v - base).abs() > tolerance)
        } else {
            values[1..].iter().any(|v| *v != *first)
        }
    } else {
        false
    };

    (Some((*first).clone()), disagreement)
}

/// Build consensus from normalized payloads for one domain.
pub fn build_consensus(
    payloads: &[NormalizedPayload],
    quality: QualityReport,
    domain: &str,
) -> ConsensusOutput {
    if payloads.is_empty() {
        return ConsensusOutput {
            data: Value::Object(serde_json::Map::new()),
            quality,
            sources: Vec::new(),
        };
    }

    let sources: Vec<String> = payloads.iter().map(|p| p.source_name.clone()).collect();

    // Highest confidence first, freshest first within equal confidence.
    let mut sorted: Vec<&NormalizedPayload> = payloads.iter().collect();
    sorted.sort_by(|a, b| {
        b.source_confidence
            .partial_cmp(&a.source_confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ta = parse_iso_utc(&a.fetched_at_utc);
                let tb = parse_iso_utc(&b.fetched_at_utc);
                tb.cmp(&ta)
            })
    });

    let mut merged = serde_json::Map::new();
    let mut has_disagreement = false;
    for field in fields_to_merge(domain, payloads) {
        let (value, disagreement) = merge_field(&field, &sorted, CONSENSUS_NUMERIC_TOLERANCE);
        if let Some(v) = value {
            merged.insert(field, v);
        }
        has_disagreement |= disagreement;
    }

    let mut flags = quality.flags.clone();
    if has_disagreement && !flags.iter().any(|f| f == FLAG_LOW_AGREEMENT) {
        flags.push(FLAG_LOW_AGREEMENT.to_string());
    }

    ConsensusOutput {
        data: Value::Object(merged),
        quality: QualityReport {
            passed: quality.passed,
            score: quality.score,
            flags,
        },
        sources,
    }
}
