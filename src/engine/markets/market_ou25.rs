//! Over/Under 2.5 market scoring (deterministic, rule-based).

use crate::engine::contracts::{Decision, DecisionKind, GateResult, Market, Selection};
use crate::engine::features::Features;
use crate::engine::gates::should_downgrade_to_no_bet;
use crate::engine::markets::{build_decision, confidence_from_separation};
use crate::engine::reason_codes;

/// Goal line for the market.
pub const EXPECTED_GOALS_THRESHOLD: f64 = 2.5;
/// Minimum |p_over - p_under| for PLAY.
pub const MIN_SEP_OU: f64 = 0.08;

/// Compute the Over/Under 2.5 decision from features.
pub fn score_ou_25(
    features: &Features,
    gate_results: &mut Vec<GateResult>,
    consensus_quality: f64,
    min_confidence: f64,
) -> Decision {
    let mut reasons: Vec<String> = Vec::new();
    let mut codes: Vec<String> = Vec::new();
    let decision_flags: Vec<String> = Vec::new();
    let mut evidence_refs: Vec<String> = Vec::new();

    let Some(goals) = features.goals_trend.filter(|_| features.has_stats) else {
        return build_decision(
            Market::Ou25,
            DecisionKind::NoPrediction,
            None,
            None,
            vec!["Missing stats for OU_2.5".to_string()],
            Some(vec![reason_codes::MISSING_STATS.to_string()]),
            decision_flags,
            evidence_refs,
        );
    };

    let expected_goals = (goals.home_avg + goals.away_conceded_avg) / 2.0
        + (goals.away_avg + goals.home_conceded_avg) / 2.0;
    reasons.push(format!("xG proxy={expected_goals:.2}"));
    codes.push(reason_codes::XG_PROXY.to_string());
    codes.push(reason_codes::GOALS_TREND.to_string());
    evidence_refs.push("stats.goals_trend".to_string());

    let diff = expected_goals - EXPECTED_GOALS_THRESHOLD;
    let p_over = 0.5 + 0.5 * (diff * 0.5).tanh();
    let p_under = 1.0 - p_over;
    let separation = (p_over - p_under).abs();
    let confidence = confidence_from_separation(separation);

    if separation < MIN_SEP_OU {
        return build_decision(
            Market::Ou25,
            DecisionKind::NoBet,
            None,
            Some(confidence),
            reasons,
            Some(codes),
            decision_flags,
            evidence_refs,
        );
    }

    let (downgrade, soft_gates) = should_downgrade_to_no_bet(
        confidence,
        decision_flags.len(),
        consensus_quality,
        min_confidence,
    );
    gate_results.extend(soft_gates);
    if downgrade {
        return build_decision(
            Market::Ou25,
            DecisionKind::NoBet,
            None,
            Some(confidence),
            reasons,
            Some(codes),
            decision_flags,
            evidence_refs,
        );
    }

    let selection = if p_over >= p_under {
        reasons.push("expected goals above threshold".to_string());
        codes.push(reason_codes::EXPECTED_GOALS_ABOVE.to_string());
        Selection::Over
    } else {
        reasons.push("expected goals below threshold".to_string());
        codes.push(reason_codes::EXPECTED_GOALS_BELOW.to_string());
        Selection::Under
    };

    build_decision(
        Market::Ou25,
        DecisionKind::Play,
        Some(selection),
        Some(confidence),
        reasons,
        Some(codes),
        decision_flags,
        evidence_refs,
    )
}
