//! Live vs recorded ingestion diff engine.
//!
//! Deterministic comparison over sorted snapshot lists: identity parity,
//! odds presence, odds value drift, schema drift, plus threshold-based
//! guardrail alerts. Comparison never writes anything.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ingestion::connector::IngestedMatchData;
use crate::reports::Alert;

const ODDS_KEYS: [&str; 3] = ["home", "draw", "away"];
const IDENTITY_KEYS: [&str; 4] = ["match_id", "home_team", "away_team", "kickoff_utc"];
const SCHEMA_KEYS: [&str; 7] = [
    "match_id",
    "home_team",
    "away_team",
    "competition",
    "kickoff_utc",
    "odds_1x2",
    "status",
];

/// Drift thresholds. An odds value is an outlier when its percent delta
/// exceeds 5% or its absolute delta exceeds 0.1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparePolicy {
    pub max_missing_markets_pct: f64,
    pub max_schema_drift_count: u64,
    pub max_odds_outlier_count: u64,
    pub max_identity_mismatch_count: u64,
}

impl Default for ComparePolicy {
    fn default() -> Self {
        Self {
            max_missing_markets_pct: 10.0,
            max_schema_drift_count: 5,
            max_odds_outlier_count: 10,
            max_identity_mismatch_count: 0,
        }
    }
}

/// One snapshot entry: a match id and its payload (absent on fetch miss).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub match_id: String,
    pub data: Option<Value>,
}

/// Build a deterministic snapshot list (sorted by match id).
pub fn build_snapshot_list(items: Vec<(String, Option<IngestedMatchData>)>) -> Vec<SnapshotEntry> {
    let mut entries: Vec<SnapshotEntry> = items
        .into_iter()
        .map(|(match_id, data)| SnapshotEntry {
            match_id,
            data: data.and_then(|d| serde_json::to_value(d).ok()),
        })
        .collect();
    entries.sort_by(|a, b| a.match_id.cmp(&b.match_id));
    entries
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityParity {
    pub parity: bool,
    pub live: BTreeMap<String, Value>,
    pub recorded: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsPresence {
    pub live_keys: Vec<String>,
    pub recorded_keys: Vec<String>,
    pub missing_in_live: Vec<String>,
    pub missing_in_recorded: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsDelta {
    pub abs_delta: f64,
    pub pct_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDrift {
    pub missing_in_live: Vec<String>,
    pub missing_in_recorded: Vec<String>,
    pub type_mismatches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareSummary {
    pub match_count: usize,
    pub identity_mismatch_count: u64,
    pub schema_drift_count: u64,
    pub odds_outlier_count: u64,
    pub missing_markets_pct: f64,
}

/// Full comparison report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareReport {
    pub identity_parity: BTreeMap<String, IdentityParity>,
    pub odds_presence_parity: BTreeMap<String, OddsPresence>,
    pub odds_value_drift: BTreeMap<String, BTreeMap<String, OddsDelta>>,
    pub schema_drift: BTreeMap<String, SchemaDrift>,
    pub summary: CompareSummary,
    pub alerts: Vec<Alert>,
}

fn identity_fields(data: Option<&Value>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Some(Value::Object(map)) = data {
        for key in IDENTITY_KEYS {
            if let Some(v) = map.get(key) {
                if !v.is_null() {
                    out.insert(key.to_string(), v.clone());
                }
            }
        }
    }
    out
}

fn odds_map(data: Option<&Value>) -> Option<&serde_json::Map<String, Value>> {
    data?.as_object()?.get("odds_1x2")?.as_object()
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Compare live vs recorded snapshots. Both lists must be sorted by match id.
pub fn compare_snapshots(
    live_snapshots: &[SnapshotEntry],
    recorded_snapshots: &[SnapshotEntry],
    policy: &ComparePolicy,
) -> CompareReport {
    let live_by_id: BTreeMap<&str, Option<&Value>> = live_snapshots
        .iter()
        .map(|s| (s.match_id.as_str(), s.data.as_ref()))
        .collect();
    let rec_by_id: BTreeMap<&str, Option<&Value>> = recorded_snapshots
        .iter()
        .map(|s| (s.match_id.as_str(), s.data.as_ref()))
        .collect();
    let all_ids: BTreeSet<&str> = live_by_id.keys().chain(rec_by_id.keys()).copied().collect();

    let mut identity_parity = BTreeMap::new();
    let mut odds_presence_parity = BTreeMap::new();
    let mut odds_value_drift = BTreeMap::new();
    let mut schema_drift = BTreeMap::new();
    let mut identity_mismatch_count = 0u64;
    let mut schema_drift_count = 0u64;
    let mut odds_outlier_count = 0u64;
    let mut missing_markets_total = 0u64;
    let mut markets_denom = 0u64;

    for match_id in &all_ids {
        let live_data = live_by_id.get(match_id).copied().flatten();
        let rec_data = rec_by_id.get(match_id).copied().flatten();

        let live_id = identity_fields(live_data);
        let rec_id = identity_fields(rec_data);
        let parity = live_id == rec_id;
        if !parity && (live_data.is_some() || rec_data.is_some()) {
            identity_mismatch_count += 1;
        }
        identity_parity.insert(
            match_id.to_string(),
            IdentityParity {
                parity,
                live: live_id,
                recorded: rec_id,
            },
        );

        let live_odds = odds_map(live_data);
        let rec_odds = odds_map(rec_data);
        let live_keys: BTreeSet<String> = live_odds
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        let rec_keys: BTreeSet<String> = rec_odds
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        odds_presence_parity.insert(
            match_id.to_string(),
            OddsPresence {
                live_keys: live_keys.iter().cloned().collect(),
                recorded_keys: rec_keys.iter().cloned().collect(),
                missing_in_live: rec_keys.difference(&live_keys).cloned().collect(),
                missing_in_recorded: live_keys.difference(&rec_keys).cloned().collect(),
            },
        );
        markets_denom += ODDS_KEYS.len() as u64;
        if let Some(rec) = rec_odds {
            for key in ODDS_KEYS {
                if rec.contains_key(key) && !live_keys.contains(key) {
                    missing_markets_total += 1;
                }
            }
        }

        let mut deltas = BTreeMap::new();
        if let (Some(live), Some(rec)) = (live_odds, rec_odds) {
            for key in ODDS_KEYS {
                if let (Some(lv), Some(rv)) = (
                    live.get(key).and_then(Value::as_f64),
                    rec.get(key).and_then(Value::as_f64),
                ) {
                    let abs_delta = (lv - rv).abs();
                    let pct_delta = if rv != 0.0 { abs_delta / rv * 100.0 } else { 0.0 };
                    deltas.insert(
                        key.to_string(),
                        OddsDelta {
                            abs_delta: round4(abs_delta),
                            pct_delta: round2(pct_delta),
                        },
                    );
                    if pct_delta > 5.0 || abs_delta > 0.1 {
                        odds_outlier_count += 1;
                    }
                }
            }
        }
        odds_value_drift.insert(match_id.to_string(), deltas);

        let missing_live = missing_schema_fields(live_data);
        let missing_rec = missing_schema_fields(rec_data);
        let mut type_mismatches = Vec::new();
        if let (Some(Value::Object(live)), Some(Value::Object(rec))) = (live_data, rec_data) {
            for key in SCHEMA_KEYS {
                if let (Some(lv), Some(rv)) = (live.get(key), rec.get(key)) {
                    if value_kind(lv) != value_kind(rv) {
                        type_mismatches.push(key.to_string());
                    }
                }
            }
        }
        if !missing_live.is_empty() || !missing_rec.is_empty() || !type_mismatches.is_empty() {
            schema_drift_count += 1;
        }
        schema_drift.insert(
            match_id.to_string(),
            SchemaDrift {
                missing_in_live: missing_live,
                missing_in_recorded: missing_rec,
                type_mismatches,
            },
        );
    }

    let missing_markets_pct = if markets_denom > 0 {
        missing_markets_total as f64 / markets_denom as f64 * 100.0
    } else {
        0.0
    };

    let mut alerts = Vec::new();
    if missing_markets_pct > policy.max_missing_markets_pct {
        alerts.push(Alert::warn(
            "LIVE_SHADOW_MISSING_MARKETS_PCT",
            format!(
                "Missing markets pct {missing_markets_pct:.1}% exceeds threshold {}%.",
                policy.max_missing_markets_pct
            ),
        ));
    }
    if schema_drift_count > policy.max_schema_drift_count {
        alerts.push(Alert::warn(
            "LIVE_SHADOW_SCHEMA_DRIFT",
            format!(
                "Schema drift count {schema_drift_count} exceeds threshold {}.",
                policy.max_schema_drift_count
            ),
        ));
    }
    if odds_outlier_count > policy.max_odds_outlier_count {
        alerts.push(Alert::warn(
            "LIVE_SHADOW_ODDS_OUTLIERS",
            format!(
                "Odds outlier count {odds_outlier_count} exceeds threshold {}.",
                policy.max_odds_outlier_count
            ),
        ));
    }
    if identity_mismatch_count > policy.max_identity_mismatch_count {
        alerts.push(Alert::warn(
            "LIVE_SHADOW_IDENTITY_MISMATCH",
            format!(
                "Identity mismatch count {identity_mismatch_count} exceeds threshold {}.",
                policy.max_identity_mismatch_count
            ),
        ));
    }

    CompareReport {
        identity_parity,
        odds_presence_parity,
        odds_value_drift,
        schema_drift,
        summary: CompareSummary {
            match_count: all_ids.len(),
            identity_mismatch_count,
            schema_drift_count,
            odds_outlier_count,
            missing_markets_pct: round2(missing_markets_pct),
        },
        alerts,
    }
}

fn missing_schema_fields(data: Option<&Value>) -> Vec<String> {
    match data {
        Some(Value::Object(map)) => SCHEMA_KEYS
            .iter()
            .filter(|k| !map.contains_key(**k))
            .map(|k| k.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
