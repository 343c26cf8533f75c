//! Evaluation: result attachment, per-prediction outcomes, KPIs, and the
//! offline evaluation snapshot.

pub mod attach_result;
pub mod evaluator;
pub mod metrics;
pub mod offline_eval;

pub use attach_result::{
    attach_result, attach_result_for_decisions, final_result_1x2, final_result_ggng,
    final_result_ou25, picks_from_decisions, picks_from_rows, reason_codes_by_market,
    resolve_markets, AttachResult, FinalScore, MarketOutcome, MarketOutcomes, SnapshotPicks,
};
pub use evaluator::{evaluate_prediction, EvaluationResult, OUTCOME_HIT, OUTCOME_MISS, OUTCOME_NA};
pub use metrics::{get_kpis, KpiPeriod, KpiReport};
pub use offline_eval::{
    build_evaluation_report, evaluation_report_checksum, EvaluationReport, MarketAccuracy,
};
