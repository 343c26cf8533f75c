//! Evaluate persisted predictions against final match results.
//!
//! NO_BET decisions produce no outcome row; their market result reports N/A.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evaluation::attach_result::{
    final_result_1x2, final_result_ggng, final_result_ou25, FinalScore,
};
use crate::models::PredictionOutcomeRow;
use crate::storage::{Repository, StorageError};

pub const OUTCOME_HIT: &str = "HIT";
pub const OUTCOME_MISS: &str = "MISS";
pub const OUTCOME_NA: &str = "N/A";

/// Result of evaluating one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// "EVALUATED" when an outcome row was written, "PENDING" for N/A.
    pub status: String,
    pub market_results: BTreeMap<String, String>,
}

fn decision_to_1x2(decision: &str) -> Option<&'static str> {
    match decision {
        "HOME" => Some("1"),
        "AWAY" => Some("2"),
        "DRAW" => Some("X"),
        _ => None,
    }
}

/// HIT / MISS / N/A for one market given the derived finals.
fn evaluate_market(
    market: &str,
    decision: &str,
    actual_1x2: &str,
    actual_ou25: &str,
    actual_ggng: &str,
) -> &'static str {
    if decision == "NO_BET" {
        return OUTCOME_NA;
    }
    match market {
        "1X2" => match decision_to_1x2(decision) {
            Some(expected) if expected == actual_1x2 => OUTCOME_HIT,
            Some(_) => OUTCOME_MISS,
            None => OUTCOME_NA,
        },
        "OU25" | "OU_2.5" => match decision {
            "OVER" | "UNDER" => {
                if decision == actual_ou25 {
                    OUTCOME_HIT
                } else {
                    OUTCOME_MISS
                }
            }
            _ => OUTCOME_NA,
        },
        "GGNG" | "BTTS" => {
            let normalized = match decision {
                "YES" => "GG",
                "NO" => "NG",
                other => other,
            };
            match normalized {
                "GG" | "NG" => {
                    if normalized == actual_ggng {
                        OUTCOME_HIT
                    } else {
                        OUTCOME_MISS
                    }
                }
                _ => OUTCOME_NA,
            }
        }
        _ => OUTCOME_NA,
    }
}

/// Evaluate one prediction against the final score and persist the outcome
/// row when it lands HIT or MISS.
pub fn evaluate_prediction(
    repo: &dyn Repository,
    prediction: &crate::models::PredictionRow,
    final_home_score: i32,
    final_away_score: i32,
    evaluated_at_utc: DateTime<Utc>,
) -> Result<EvaluationResult, StorageError> {
    let score = FinalScore {
        home: final_home_score,
        away: final_away_score,
    };
    let actual_1x2 = final_result_1x2(score);
    let actual_ou25 = final_result_ou25(score);
    let actual_ggng = final_result_ggng(score);

    // The effective call is the pick when present, else the decision kind.
    let call = prediction
        .pick
        .clone()
        .unwrap_or_else(|| prediction.decision.clone())
        .to_ascii_uppercase();
    let outcome = evaluate_market(&prediction.market, &call, actual_1x2, actual_ou25, actual_ggng);

    let mut market_results: BTreeMap<String, String> = [
        ("1X2".to_string(), OUTCOME_NA.to_string()),
        ("OU25".to_string(), OUTCOME_NA.to_string()),
        ("GGNG".to_string(), OUTCOME_NA.to_string()),
    ]
    .into_iter()
    .collect();
    let result_key = match prediction.market.as_str() {
        "OU_2.5" => "OU25".to_string(),
        "BTTS" => "GGNG".to_string(),
        other => other.to_string(),
    };
    market_results.insert(result_key, outcome.to_string());

    if outcome == OUTCOME_NA {
        return Ok(EvaluationResult {
            status: "PENDING".to_string(),
            market_results,
        });
    }

    repo.create_prediction_outcome(&PredictionOutcomeRow {
        id: 0,
        prediction_id: prediction.id,
        match_id: prediction.match_id.clone(),
        evaluated_at_utc,
        final_home_score,
        final_away_score,
        final_result_1x2: actual_1x2.to_string(),
        final_ou25: actual_ou25.to_string(),
        final_ggng: actual_ggng.to_string(),
        hit_bool: outcome == OUTCOME_HIT,
    })?;

    Ok(EvaluationResult {
        status: "EVALUATED".to_string(),
        market_results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PredictionRow;
    use crate::storage::SqliteRepository;
    use chrono::TimeZone;

    fn prediction(market: &str, decision: &str, pick: Option<&str>) -> PredictionRow {
        PredictionRow {
            id: 1,
            created_at_utc: Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap(),
            analysis_run_id: 1,
            match_id: "m1".to_string(),
            market: market.to_string(),
            decision: decision.to_string(),
            pick: pick.map(str::to_string),
            confidence: 0.7,
            risk: 0.3,
            reasons_json: "[]".to_string(),
            evidence_pack_json: "{}".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 2, 0, 0, 0).unwrap()
    }

    #[test]
    fn hit_is_persisted_with_derived_finals() {
        let repo = SqliteRepository::in_memory().unwrap();
        let result = evaluate_prediction(
            &repo,
            &prediction("1X2", "PLAY", Some("HOME")),
            2,
            0,
            now(),
        )
        .unwrap();
        assert_eq!(result.status, "EVALUATED");
        assert_eq!(result.market_results["1X2"], OUTCOME_HIT);

        let rows = repo
            .outcomes_between(now() - chrono::Duration::hours(1), now() + chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].hit_bool);
        assert_eq!(rows[0].final_result_1x2, "1");
        assert_eq!(rows[0].final_ou25, "UNDER");
        assert_eq!(rows[0].final_ggng, "NG");
    }

    #[test]
    fn miss_is_persisted_as_not_hit() {
        let repo = SqliteRepository::in_memory().unwrap();
        let result = evaluate_prediction(
            &repo,
            &prediction("OU_2.5", "PLAY", Some("OVER")),
            1,
            0,
            now(),
        )
        .unwrap();
        assert_eq!(result.status, "EVALUATED");
        assert_eq!(result.market_results["OU25"], OUTCOME_MISS);
    }

    #[test]
    fn no_bet_produces_no_outcome_row() {
        let repo = SqliteRepository::in_memory().unwrap();
        let result =
            evaluate_prediction(&repo, &prediction("1X2", "NO_BET", None), 1, 0, now()).unwrap();
        assert_eq!(result.status, "PENDING");
        assert_eq!(result.market_results["1X2"], OUTCOME_NA);
        let rows = repo
            .outcomes_between(now() - chrono::Duration::days(1), now() + chrono::Duration::days(1))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn btts_yes_maps_onto_gg() {
        let repo = SqliteRepository::in_memory().unwrap();
        let result =
            evaluate_prediction(&repo, &prediction("BTTS", "PLAY", Some("YES")), 2, 1, now())
                .unwrap();
        assert_eq!(result.market_results["GGNG"], OUTCOME_HIT);
    }
}
