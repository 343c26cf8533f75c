//! Market-specific deterministic scoring (1X2, OU_2.5, BTTS).

pub mod market_1x2;
pub mod market_btts;
pub mod market_ou25;

use crate::engine::contracts::{
    Decision, DecisionKind, GateResult, Market, Selection, MAX_DECISION_REASONS,
    POLICY_VERSION_V2,
};
use crate::engine::features::Features;
use crate::engine::reason_codes::codes_for_reasons;

pub use market_1x2::score_1x2;
pub use market_btts::score_btts;
pub use market_ou25::score_ou_25;

/// Dispatch to the market scorer.
pub fn score_market(
    market: Market,
    features: &Features,
    gate_results: &mut Vec<GateResult>,
    consensus_quality: f64,
    min_confidence: f64,
) -> Decision {
    match market {
        Market::OneXTwo => score_1x2(features, gate_results, consensus_quality, min_confidence),
        Market::Ou25 => score_ou_25(features, gate_results, consensus_quality, min_confidence),
        Market::Btts => score_btts(features, gate_results, consensus_quality, min_confidence),
    }
}

/// Shared decision constructor: truncates reasons, derives codes when the
/// scorer did not supply them, and keeps selection/confidence rules intact.
#[allow(clippy::too_many_arguments)]
pub(crate) fn build_decision(
    market: Market,
    kind: DecisionKind,
    selection: Option<Selection>,
    confidence: Option<f64>,
    reasons: Vec<String>,
    reason_codes: Option<Vec<String>>,
    decision_flags: Vec<String>,
    evidence_refs: Vec<String>,
) -> Decision {
    let mut reasons = reasons;
    reasons.truncate(MAX_DECISION_REASONS);
    let mut codes = reason_codes.unwrap_or_else(|| codes_for_reasons(&reasons));
    codes.truncate(MAX_DECISION_REASONS);
    Decision {
        market: market.as_str().to_string(),
        decision: kind,
        selection,
        confidence: confidence.map(round4),
        reasons,
        reason_codes: codes,
        flags: decision_flags,
        evidence_refs,
        policy_version: POLICY_VERSION_V2.to_string(),
        meta: Default::default(),
    }
}

pub(crate) fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Shared confidence formula: `clamp(0.5 + separation * 2, 0, 1)`.
pub(crate) fn confidence_from_separation(separation: f64) -> f64 {
    (0.5 + separation * 2.0).clamp(0.0, 1.0)
}
