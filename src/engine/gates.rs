//! Analyzer quality gates.
//!
//! Hard gates block a market with NO_PREDICTION. Soft gates run after scoring
//! and downgrade to NO_BET. Gates are evaluated in a fixed order and the
//! first hard failure terminates the market.

use crate::engine::contracts::{
    flags, GateId, GateResult, CONFLICT_T1_BLOCK, CONFLICT_T2_DOWNGRADE,
    MAX_MINOR_FLAGS_BEFORE_NO_BET, OVERRIDE_CONFIDENCE_WHEN_BELOW_T2,
    THRESHOLD_EVIDENCE_QUALITY,
};
use crate::engine::contracts::Market;
use crate::engine::evidence::Domain;
use crate::engine::features::{consensus_quality, evidence_quality_score, Features};
use crate::engine::resolver::ResolutionStatus;

/// Output of the hard-gate chain for one market.
#[derive(Debug, Clone)]
pub struct HardGateOutcome {
    pub blocked: bool,
    pub gate_results: Vec<GateResult>,
    pub flags: Vec<String>,
}

/// Domains required before a market can be scored.
pub fn required_domains_for_market(_market: Market) -> &'static [Domain] {
    // All currently supported markets score off the stats domain.
    &[Domain::Stats]
}

/// Run hard gates for one market, in order: resolver, market support,
/// required domains, evidence quality, conflict.
pub fn run_hard_gates(
    resolver_status: ResolutionStatus,
    market: Option<Market>,
    market_label: &str,
    features: &Features,
) -> HardGateOutcome {
    let mut gate_results: Vec<GateResult> = Vec::new();
    let mut out_flags: Vec<String> = Vec::new();

    if resolver_status != ResolutionStatus::Resolved {
        gate_results.push(GateResult::failed(
            GateId::Resolver,
            format!("resolver status {resolver_status}"),
        ));
        out_flags.push(
            if resolver_status == ResolutionStatus::Ambiguous {
                flags::AMBIGUOUS
            } else {
                flags::NOT_FOUND
            }
            .to_string(),
        );
        return HardGateOutcome {
            blocked: true,
            gate_results,
            flags: out_flags,
        };
    }
    gate_results.push(GateResult::passed(GateId::Resolver, "RESOLVED"));

    let Some(market) = market else {
        gate_results.push(GateResult::failed(
            GateId::MarketSupported,
            format!("market {market_label} not supported in v2"),
        ));
        out_flags.push(flags::MARKET_NOT_SUPPORTED.to_string());
        return HardGateOutcome {
            blocked: true,
            gate_results,
            flags: out_flags,
        };
    };
    gate_results.push(GateResult::passed(GateId::MarketSupported, "supported"));

    let required = required_domains_for_market(market);
    let missing: Vec<Domain> = required
        .iter()
        .copied()
        .filter(|d| features.missing.contains(d))
        .collect();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|d| d.as_str()).collect();
        gate_results.push(GateResult::failed(
            GateId::MissingKeyFeatures,
            format!("missing domains: {names:?}"),
        ));
        out_flags.push(flags::MISSING_KEY_FEATURES.to_string());
        return HardGateOutcome {
            blocked: true,
            gate_results,
            flags: out_flags,
        };
    }
    gate_results.push(GateResult::passed(GateId::MissingKeyFeatures, "present"));

    let eq_score = evidence_quality_score(features);
    if eq_score < THRESHOLD_EVIDENCE_QUALITY {
        gate_results.push(GateResult::failed(
            GateId::EvidenceQuality,
            format!("quality {eq_score:.2} < {THRESHOLD_EVIDENCE_QUALITY}"),
        ));
        out_flags.push(flags::LOW_QUALITY_EVIDENCE.to_string());
        return HardGateOutcome {
            blocked: true,
            gate_results,
            flags: out_flags,
        };
    }
    gate_results.push(GateResult::passed(
        GateId::EvidenceQuality,
        format!("quality {eq_score:.2}"),
    ));

    let cq = consensus_quality(features);
    if cq < CONFLICT_T1_BLOCK {
        gate_results.push(GateResult::failed(
            GateId::SourceConflict,
            format!("consensus_quality {cq:.2} < T1 {CONFLICT_T1_BLOCK}"),
        ));
        out_flags.push(flags::SOURCE_CONFLICT.to_string());
        return HardGateOutcome {
            blocked: true,
            gate_results,
            flags: out_flags,
        };
    }
    if cq < CONFLICT_T2_DOWNGRADE {
        gate_results.push(GateResult::passed(
            GateId::SourceConflict,
            format!("consensus_quality {cq:.2} in [T1,T2); soft downgrade possible"),
        ));
        out_flags.push(flags::CONSENSUS_WEAK.to_string());
    } else {
        gate_results.push(GateResult::passed(
            GateId::SourceConflict,
            format!("consensus_quality {cq:.2}"),
        ));
    }

    HardGateOutcome {
        blocked: false,
        gate_results,
        flags: out_flags,
    }
}

/// Soft gates: borderline confidence or too many minor flags downgrade PLAY
/// to NO_BET. When consensus quality sits in [T1, T2), PLAY survives only
/// above the override confidence.
pub fn should_downgrade_to_no_bet(
    confidence: f64,
    minor_flags_count: usize,
    consensus_quality_value: f64,
    min_confidence: f64,
) -> (bool, Vec<GateResult>) {
    let mut gate_results: Vec<GateResult> = Vec::new();

    if confidence < min_confidence {
        gate_results.push(GateResult::failed(
            GateId::SoftBorderlineConfidence,
            format!("confidence {confidence:.2} < min {min_confidence}"),
        ));
        return (true, gate_results);
    }

    if consensus_quality_value < CONFLICT_T2_DOWNGRADE
        && confidence < OVERRIDE_CONFIDENCE_WHEN_BELOW_T2
    {
        gate_results.push(GateResult::failed(
            GateId::SoftBorderlineConfidence,
            format!("consensus below T2 and confidence {confidence:.2} < override"),
        ));
        return (true, gate_results);
    }

    gate_results.push(GateResult::passed(
        GateId::SoftBorderlineConfidence,
        "confidence above threshold",
    ));

    if minor_flags_count >= MAX_MINOR_FLAGS_BEFORE_NO_BET {
        gate_results.push(GateResult::failed(
            GateId::SoftMinorFlags,
            format!("minor flags count {minor_flags_count} >= {MAX_MINOR_FLAGS_BEFORE_NO_BET}"),
        ));
        return (true, gate_results);
    }

    gate_results.push(GateResult::passed(
        GateId::SoftMinorFlags,
        "minor flags within limit",
    ));

    (false, gate_results)
}
