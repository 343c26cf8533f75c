//! Guardrails for live-shadow analyze: compare live vs recorded analyzer
//! output. Alerts only; a shadow run is never blocked.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::engine::contracts::Decision;
use crate::reports::Alert;

/// Guardrail thresholds for analysis comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeGuardrailPolicy {
    pub max_pick_change_rate: f64,
    pub max_confidence_delta_p95: f64,
    pub max_coverage_drop_pct: f64,
    pub max_reason_churn_rate: f64,
}

impl Default for AnalyzeGuardrailPolicy {
    fn default() -> Self {
        Self {
            max_pick_change_rate: 0.3,
            max_confidence_delta_p95: 0.15,
            max_coverage_drop_pct: 20.0,
            max_reason_churn_rate: 0.4,
        }
    }
}

/// Per-market view of one side's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionView {
    pub pick: String,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

/// Extract per-market views from analyzer decisions. The pick is the
/// selection when present, otherwise the decision kind.
pub fn decision_views(decisions: &[Decision]) -> BTreeMap<String, DecisionView> {
    let mut out = BTreeMap::new();
    for decision in decisions {
        let pick = decision
            .selection
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| decision.decision.as_str().to_string());
        out.insert(
            decision.market.clone(),
            DecisionView {
                pick,
                confidence: decision.confidence.unwrap_or(0.0),
                reasons: decision.reasons.clone(),
            },
        );
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickParity {
    pub parity: bool,
    pub live_pick: Option<String>,
    pub recorded_pick: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonsDiff {
    pub live_reasons: Vec<String>,
    pub recorded_reasons: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageDiff {
    pub live_markets: Vec<String>,
    pub recorded_markets: Vec<String>,
    pub missing_in_live: Vec<String>,
    pub missing_in_recorded: Vec<String>,
}

/// Side-by-side comparison of live vs recorded analysis for one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisComparison {
    pub pick_parity: BTreeMap<String, PickParity>,
    pub confidence_deltas: BTreeMap<String, f64>,
    pub reasons_diff: BTreeMap<String, ReasonsDiff>,
    pub coverage_diff: CoverageDiff,
}

/// Build the side-by-side comparison.
pub fn compare_analysis(
    live: &BTreeMap<String, DecisionView>,
    recorded: &BTreeMap<String, DecisionView>,
) -> AnalysisComparison {
    let all_markets: BTreeSet<&String> = live.keys().chain(recorded.keys()).collect();

    let mut pick_parity = BTreeMap::new();
    let mut confidence_deltas = BTreeMap::new();
    let mut reasons_diff = BTreeMap::new();

    for market in &all_markets {
        let live_view = live.get(*market);
        let rec_view = recorded.get(*market);
        let live_pick = live_view.map(|v| v.pick.clone());
        let rec_pick = rec_view.map(|v| v.pick.clone());
        pick_parity.insert(
            (*market).clone(),
            PickParity {
                parity: live_pick == rec_pick,
                live_pick,
                recorded_pick: rec_pick.clone(),
            },
        );
        let live_conf = live_view.map(|v| v.confidence).unwrap_or(0.0);
        let rec_conf = rec_view.map(|v| v.confidence).unwrap_or(0.0);
        confidence_deltas.insert((*market).clone(), round4(live_conf - rec_conf));

        let live_reasons: BTreeSet<String> = live_view
            .map(|v| v.reasons.iter().cloned().collect())
            .unwrap_or_default();
        let rec_reasons: BTreeSet<String> = rec_view
            .map(|v| v.reasons.iter().cloned().collect())
            .unwrap_or_default();
        reasons_diff.insert(
            (*market).clone(),
            ReasonsDiff {
                live_reasons: live_reasons.iter().cloned().collect(),
                recorded_reasons: rec_reasons.iter().cloned().collect(),
                added: live_reasons.difference(&rec_reasons).cloned().collect(),
                removed: rec_reasons.difference(&live_reasons).cloned().collect(),
            },
        );
    }

    AnalysisComparison {
        pick_parity,
        confidence_deltas,
        reasons_diff,
        coverage_diff: CoverageDiff {
            live_markets: live.keys().cloned().collect(),
            recorded_markets: recorded.keys().cloned().collect(),
            missing_in_live: recorded
                .keys()
                .filter(|m| !live.contains_key(*m))
                .cloned()
                .collect(),
            missing_in_recorded: live
                .keys()
                .filter(|m| !recorded.contains_key(*m))
                .cloned()
                .collect(),
        },
    }
}

/// Evaluate the guardrails over one match's comparison inputs.
pub fn evaluate_analysis_guardrails(
    live: &BTreeMap<String, DecisionView>,
    recorded: &BTreeMap<String, DecisionView>,
    policy: &AnalyzeGuardrailPolicy,
) -> Vec<Alert> {
    let all_markets: BTreeSet<&String> = live.keys().chain(recorded.keys()).collect();
    let total = all_markets.len();

    let pick_changes = all_markets
        .iter()
        .filter(|m| {
            live.get(**m).map(|v| &v.pick) != recorded.get(**m).map(|v| &v.pick)
        })
        .count();
    let pick_change_rate = if total > 0 {
        pick_changes as f64 / total as f64
    } else {
        0.0
    };

    let mut deltas: Vec<f64> = all_markets
        .iter()
        .map(|m| {
            let live_conf = live.get(*m).map(|v| v.confidence).unwrap_or(0.0);
            let rec_conf = recorded.get(*m).map(|v| v.confidence).unwrap_or(0.0);
            (live_conf - rec_conf).abs()
        })
        .collect();
    deltas.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let confidence_delta_p95 = if deltas.is_empty() {
        0.0
    } else {
        deltas[((deltas.len() as f64 * 0.95) as usize).min(deltas.len() - 1)]
    };

    let coverage_drop_pct = if recorded.is_empty() {
        0.0
    } else {
        let missing = recorded.keys().filter(|m| !live.contains_key(*m)).count();
        missing as f64 / recorded.len() as f64 * 100.0
    };

    let common: Vec<&String> = live.keys().filter(|m| recorded.contains_key(*m)).collect();
    let churned = common
        .iter()
        .filter(|m| {
            let live_set: BTreeSet<&String> =
                live.get(**m).map(|v| v.reasons.iter().collect()).unwrap_or_default();
            let rec_set: BTreeSet<&String> = recorded
                .get(**m)
                .map(|v| v.reasons.iter().collect())
                .unwrap_or_default();
            live_set != rec_set
        })
        .count();
    let reason_churn_rate = if common.is_empty() {
        0.0
    } else {
        churned as f64 / common.len() as f64
    };

    let mut alerts = Vec::new();
    if pick_change_rate > policy.max_pick_change_rate {
        alerts.push(Alert::warn(
            "LIVE_SHADOW_PICK_CHANGE_RATE",
            format!(
                "Pick change rate {:.1}% exceeds threshold {:.1}%.",
                pick_change_rate * 100.0,
                policy.max_pick_change_rate * 100.0
            ),
        ));
    }
    if confidence_delta_p95 > policy.max_confidence_delta_p95 {
        alerts.push(Alert::warn(
            "LIVE_SHADOW_CONFIDENCE_DELTA",
            format!(
                "Confidence delta p95 {confidence_delta_p95:.3} exceeds threshold {:.3}.",
                policy.max_confidence_delta_p95
            ),
        ));
    }
    if coverage_drop_pct > policy.max_coverage_drop_pct {
        alerts.push(Alert::warn(
            "LIVE_SHADOW_COVERAGE_DROP",
            format!(
                "Coverage drop {coverage_drop_pct:.1}% exceeds threshold {:.1}%.",
                policy.max_coverage_drop_pct
            ),
        ));
    }
    if reason_churn_rate > policy.max_reason_churn_rate {
        alerts.push(Alert::warn(
            "LIVE_SHADOW_REASON_CHURN",
            format!(
                "Reason churn rate {:.1}% exceeds threshold {:.1}%.",
                reason_churn_rate * 100.0,
                policy.max_reason_churn_rate * 100.0
            ),
        ));
    }
    alerts
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
