//! Both-teams-to-score market scoring (deterministic, rule-based).

use crate::engine::contracts::{Decision, DecisionKind, GateResult, Market, Selection};
use crate::engine::features::Features;
use crate::engine::gates::should_downgrade_to_no_bet;
use crate::engine::markets::{build_decision, confidence_from_separation};
use crate::engine::reason_codes;

/// Minimum |p_yes - p_no| for PLAY.
pub const MIN_SEP_BTTS: f64 = 0.08;

/// Compute the BTTS (YES/NO) decision from features.
pub fn score_btts(
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
            Market::Btts,
            DecisionKind::NoPrediction,
            None,
            None,
            vec!["Missing stats for BTTS".to_string()],
            Some(vec![reason_codes::MISSING_STATS.to_string()]),
            decision_flags,
            evidence_refs,
        );
    };

    let clip = |v: f64| (v / 3.0).clamp(0.0, 1.0);
    let home_scoring = clip(goals.home_avg);
    let away_scoring = clip(goals.away_avg);
    let home_conceding = clip(goals.home_conceded_avg);
    let away_conceding = clip(goals.away_conceded_avg);

    let p_home_scores = home_scoring * away_conceding;
    let p_away_scores = away_scoring * home_conceding;
    let p_yes = p_home_scores * p_away_scores;
    let p_no = 1.0 - p_yes;
    let separation = (p_yes - p_no).abs();
    let confidence = confidence_from_separation(separation);

    reasons.push(format!("P(GG) proxy={p_yes:.2}"));
    codes.push(reason_codes::BTTS_TREND.to_string());
    evidence_refs.push("stats.goals_trend".to_string());

    if separation < MIN_SEP_BTTS {
        return build_decision(
            Market::Btts,
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
            Market::Btts,
            DecisionKind::NoBet,
            None,
            Some(confidence),
            reasons,
            Some(codes),
            decision_flags,
            evidence_refs,
        );
    }

    let selection = if p_yes >= p_no {
        reasons.push("both teams scoring trend".to_string());
        Selection::Yes
    } else {
        reasons.push("defensive strength present".to_string());
        codes.push(reason_codes::DEFENSIVE_STRENGTH.to_string());
        Selection::No
    };

    build_decision(
        Market::Btts,
        DecisionKind::Play,
        Some(selection),
        Some(confidence),
        reasons,
        Some(codes),
        decision_flags,
        evidence_refs,
    )
}
