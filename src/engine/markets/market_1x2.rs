//! 1X2 market scoring (deterministic, rule-based).

use crate::engine::contracts::{Decision, DecisionKind, GateResult, Market, Selection};
use crate::engine::features::Features;
use crate::engine::gates::should_downgrade_to_no_bet;
use crate::engine::markets::{build_decision, confidence_from_separation};
use crate::engine::reason_codes;

/// Constant home advantage added to HOME and subtracted from AWAY.
pub const HOME_ADVANTAGE: f64 = 0.15;
/// Minimum separation between top and second pseudo-probabilities for PLAY.
pub const MIN_SEP_1X2: f64 = 0.10;

/// Compute the 1X2 decision from features. Hard gates have already run.
pub fn score_1x2(
    features: &Features,
    gate_results: &mut Vec<GateResult>,
    consensus_quality: f64,
    min_confidence: f64,
) -> Decision {
    let mut reasons: Vec<String> = Vec::new();
    let mut codes: Vec<String> = Vec::new();
    let decision_flags: Vec<String> = Vec::new();
    let mut evidence_refs: Vec<String> = Vec::new();

    let Some(strength) = features.team_strength.filter(|_| features.has_stats) else {
        return build_decision(
            Market::OneXTwo,
            DecisionKind::NoPrediction,
            None,
            None,
            vec!["Missing stats for 1X2".to_string()],
            Some(vec![reason_codes::MISSING_STATS.to_string()]),
            decision_flags,
            evidence_refs,
        );
    };

    let mut home_net = strength.home.goals_scored - strength.away.goals_conceded;
    let mut away_net = strength.away.goals_scored - strength.home.goals_conceded;

    if let Some(h2h) = features.h2h.filter(|h| h.matches_played > 0) {
        let total = f64::from(h2h.matches_played);
        let home_share = (f64::from(h2h.home_wins) + f64::from(h2h.draws) * 0.5) / total;
        let away_share = (f64::from(h2h.away_wins) + f64::from(h2h.draws) * 0.5) / total;
        home_net += (home_share - 0.5) * 0.1;
        away_net += (away_share - 0.5) * 0.1;
        reasons.push("H2H used".to_string());
        codes.push(reason_codes::H2H_USED.to_string());
        evidence_refs.push("stats.head_to_head".to_string());
    }

    // Pseudo-probabilities via 2^score normalization; stable order breaks ties
    // HOME > DRAW > AWAY.
    let scored = [
        (Selection::Home, home_net + HOME_ADVANTAGE),
        (Selection::Draw, 0.0),
        (Selection::Away, away_net - HOME_ADVANTAGE),
    ];
    let exp_sum: f64 = scored.iter().map(|(_, s)| 2f64.powf(*s)).sum();
    let mut probs: Vec<(Selection, f64)> = scored
        .iter()
        .map(|(sel, s)| (*sel, 2f64.powf(*s) / exp_sum))
        .collect();
    probs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (top_sel, top_prob) = probs[0];
    let second_prob = probs.get(1).map_or(0.0, |p| p.1);
    let separation = top_prob - second_prob;
    let confidence = confidence_from_separation(separation);

    reasons.push(format!("top={} sep={:.2}", top_sel.as_str(), separation));
    codes.push(reason_codes::TOP_SEP.to_string());

    if separation < MIN_SEP_1X2 {
        return build_decision(
            Market::OneXTwo,
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
            Market::OneXTwo,
            DecisionKind::NoBet,
            None,
            Some(confidence),
            reasons,
            Some(codes),
            decision_flags,
            evidence_refs,
        );
    }

    build_decision(
        Market::OneXTwo,
        DecisionKind::Play,
        Some(top_sel),
        Some(confidence),
        reasons,
        Some(codes),
        decision_flags,
        evidence_refs,
    )
}
