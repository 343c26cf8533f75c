//! Analyzer v2 entry point: deterministic, gates-first, short-circuiting.
//!
//! Resolver failure is a global gate: zero decisions, NO_PREDICTION overall.
//! Otherwise each requested market runs the hard-gate chain and, when clear,
//! its scorer. Decisions preserve the request's market order.

use crate::engine::contracts::{
    flags as market_flags, AnalysisRunSummary, AnalyzerResult, AnalyzerStatus, ConflictSummary,
    Decision, DecisionCounts, DecisionKind, GateResult, Market, MAX_DECISION_REASONS,
    POLICY_VERSION_V2, ANALYZER_VERSION_V2,
};
use crate::engine::evidence::EvidencePack;
use crate::engine::features::{consensus_quality, evidence_quality_score, extract_features};
use crate::engine::gates::run_hard_gates;
use crate::engine::markets::score_market;
use crate::engine::reason_codes;
use crate::engine::resolver::ResolutionStatus;

/// Default minimum confidence when no policy supplies one.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.62;

/// A market request: parsed market or the raw label for unsupported names.
#[derive(Debug, Clone)]
pub struct MarketRequest {
    pub market: Option<Market>,
    pub label: String,
}

impl MarketRequest {
    pub fn parse(label: &str) -> Self {
        Self {
            market: Market::parse(label),
            label: label.to_string(),
        }
    }

    pub fn supported(market: Market) -> Self {
        Self {
            market: Some(market),
            label: market.as_str().to_string(),
        }
    }
}

/// All v2 markets, in canonical request order.
pub fn default_market_requests() -> Vec<MarketRequest> {
    Market::ALL.iter().copied().map(MarketRequest::supported).collect()
}

/// Run analyzer v2 over an evidence pack.
pub fn analyze_v2(
    resolver_status: ResolutionStatus,
    evidence_pack: Option<&EvidencePack>,
    markets: &[MarketRequest],
    min_confidence: f64,
) -> AnalyzerResult {
    let mut all_gate_results: Vec<GateResult> = Vec::new();
    let mut global_flags: Vec<String> = Vec::new();
    let mut decisions: Vec<Decision> = Vec::new();

    if resolver_status != ResolutionStatus::Resolved {
        all_gate_results.push(GateResult::failed(
            crate::engine::contracts::GateId::Resolver,
            format!("resolver status {resolver_status}"),
        ));
        global_flags.push(
            if resolver_status == ResolutionStatus::Ambiguous {
                market_flags::AMBIGUOUS
            } else {
                market_flags::NOT_FOUND
            }
            .to_string(),
        );
        return build_result(
            AnalyzerStatus::NoPrediction,
            Vec::new(),
            all_gate_results,
            global_flags,
            None,
        );
    }

    let features = extract_features(evidence_pack);
    let eq_score = evidence_quality_score(&features);
    let cq = consensus_quality(&features);
    let conflict_summary = ConflictSummary {
        evidence_quality: round4(eq_score),
        consensus_quality: round4(cq),
    };

    for request in markets {
        let outcome = run_hard_gates(resolver_status, request.market, &request.label, &features);
        all_gate_results.extend(outcome.gate_results.clone());

        if outcome.blocked {
            decisions.push(no_prediction_decision(request, &outcome.flags));
            for flag in outcome.flags {
                push_unique(&mut global_flags, flag);
            }
            continue;
        }

        // Hard gates passed implies a supported market.
        let Some(market) = request.market else {
            continue;
        };
        let mut decision = score_market(
            market,
            &features,
            &mut all_gate_results,
            cq,
            min_confidence,
        );
        // Markets scored under weak consensus carry the flag on the decision.
        for flag in &outcome.flags {
            if !decision.flags.contains(flag) {
                decision.flags.push(flag.clone());
            }
        }
        for flag in &decision.flags {
            push_unique(&mut global_flags, flag.clone());
        }
        decisions.push(decision);
    }

    let mut counts = DecisionCounts::default();
    for d in &decisions {
        match d.decision {
            DecisionKind::Play => counts.play += 1,
            DecisionKind::NoBet => counts.no_bet += 1,
            DecisionKind::NoPrediction => counts.no_prediction += 1,
        }
    }

    let status = if counts.play > 0 {
        AnalyzerStatus::Ok
    } else {
        AnalyzerStatus::NoPrediction
    };

    build_result(
        status,
        decisions,
        all_gate_results,
        global_flags,
        Some(conflict_summary),
    )
    .with_counts(counts)
}

impl AnalyzerResult {
    fn with_counts(mut self, counts: DecisionCounts) -> Self {
        self.analysis_run.counts = counts;
        self
    }
}

fn no_prediction_decision(request: &MarketRequest, gate_flags: &[String]) -> Decision {
    let mut reasons = vec![format!("Gate blocked: {}", gate_flags.join(", "))];
    reasons.truncate(MAX_DECISION_REASONS);
    Decision {
        market: request.label.clone(),
        decision: DecisionKind::NoPrediction,
        selection: None,
        confidence: None,
        reasons,
        reason_codes: vec![reason_codes::GATE_BLOCKED.to_string()],
        flags: gate_flags.to_vec(),
        evidence_refs: Vec::new(),
        policy_version: POLICY_VERSION_V2.to_string(),
        meta: Default::default(),
    }
}

fn build_result(
    status: AnalyzerStatus,
    decisions: Vec<Decision>,
    gate_results: Vec<GateResult>,
    global_flags: Vec<String>,
    conflict_summary: Option<ConflictSummary>,
) -> AnalyzerResult {
    AnalyzerResult {
        status,
        version: ANALYZER_VERSION_V2.to_string(),
        policy_version: POLICY_VERSION_V2.to_string(),
        analysis_run: AnalysisRunSummary {
            flags: global_flags,
            gate_results,
            conflict_summary,
            counts: DecisionCounts::default(),
        },
        decisions,
    }
}

fn push_unique(flags: &mut Vec<String>, flag: String) {
    if !flags.contains(&flag) {
        flags.push(flag);
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}
