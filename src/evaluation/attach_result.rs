//! Attach a final score to an analysis run and resolve market outcomes.
//!
//! The derivation is fixed: 1X2 from score comparison, OU 2.5 OVER at three
//! or more total goals, GG when both sides score. NO_BET and unknown picks
//! normalize to NO_PREDICTION for resolution purposes and resolve NEUTRAL.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::contracts::{Decision, DecisionKind, Market};
use crate::models::SnapshotResolutionRow;
use crate::storage::{Repository, StorageError};

/// Market keys used in resolution documents.
pub const KEY_1X2: &str = "one_x_two";
pub const KEY_OU25: &str = "over_under_25";
pub const KEY_GGNG: &str = "gg_ng";

/// Per-market resolution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketOutcome {
    Success,
    Failure,
    Neutral,
}

/// Final score plus match status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    pub home: i32,
    pub away: i32,
}

/// Normalized picks per market for resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPicks {
    pub one_x_two: String,
    pub over_under_25: String,
    pub gg_ng: String,
}

impl Default for SnapshotPicks {
    fn default() -> Self {
        Self {
            one_x_two: "NO_PREDICTION".to_string(),
            over_under_25: "NO_PREDICTION".to_string(),
            gg_ng: "NO_PREDICTION".to_string(),
        }
    }
}

/// Resolved outcomes per market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketOutcomes {
    pub one_x_two: MarketOutcome,
    pub over_under_25: MarketOutcome,
    pub gg_ng: MarketOutcome,
}

impl MarketOutcomes {
    pub fn to_map(&self) -> BTreeMap<String, MarketOutcome> {
        [
            (KEY_1X2.to_string(), self.one_x_two),
            (KEY_OU25.to_string(), self.over_under_25),
            (KEY_GGNG.to_string(), self.gg_ng),
        ]
        .into_iter()
        .collect()
    }
}

/// Derived 1X2 result: "1", "X", or "2".
pub fn final_result_1x2(score: FinalScore) -> &'static str {
    if score.home > score.away {
        "1"
    } else if score.away > score.home {
        "2"
    } else {
        "X"
    }
}

/// Derived OU 2.5 result: OVER iff total goals >= 3.
pub fn final_result_ou25(score: FinalScore) -> &'static str {
    if score.home + score.away >= 3 {
        "OVER"
    } else {
        "UNDER"
    }
}

/// Derived GG/NG result: GG iff both sides scored.
pub fn final_result_ggng(score: FinalScore) -> &'static str {
    if score.home >= 1 && score.away >= 1 {
        "GG"
    } else {
        "NG"
    }
}

fn normalize_pick(raw: &str) -> String {
    match raw {
        "NO_BET" | "NO_PREDICTION" => "NO_PREDICTION".to_string(),
        other => other.to_string(),
    }
}

fn pick_to_1x2(pick: &str) -> Option<&'static str> {
    match pick {
        "HOME" => Some("1"),
        "DRAW" => Some("X"),
        "AWAY" => Some("2"),
        _ => None,
    }
}

/// Build normalized picks from analyzer decisions (one per market).
pub fn picks_from_decisions(decisions: &[Decision]) -> SnapshotPicks {
    let mut picks = SnapshotPicks::default();
    for decision in decisions {
        let Some(market) = Market::parse(&decision.market) else {
            continue;
        };
        let raw = match (decision.decision, decision.selection) {
            (DecisionKind::Play, Some(selection)) => selection.as_str().to_string(),
            (kind, _) => kind.as_str().to_string(),
        };
        // BTTS selections map onto the GG/NG vocabulary.
        let raw = match (market, raw.as_str()) {
            (Market::Btts, "YES") => "GG".to_string(),
            (Market::Btts, "NO") => "NG".to_string(),
            (_, _) => raw,
        };
        let normalized = normalize_pick(&raw);
        match market {
            Market::OneXTwo => picks.one_x_two = normalized,
            Market::Ou25 => picks.over_under_25 = normalized,
            Market::Btts => picks.gg_ng = normalized,
        }
    }
    picks
}

/// Picks from persisted prediction rows (pick wins over decision kind).
pub fn picks_from_rows(rows: &[crate::models::PredictionRow]) -> SnapshotPicks {
    let mut picks = SnapshotPicks::default();
    for row in rows {
        let Some(market) = Market::parse(&row.market) else {
            continue;
        };
        let raw = row
            .pick
            .clone()
            .unwrap_or_else(|| row.decision.clone())
            .to_ascii_uppercase();
        let raw = match (market, raw.as_str()) {
            (Market::Btts, "YES") => "GG".to_string(),
            (Market::Btts, "NO") => "NG".to_string(),
            (_, _) => raw,
        };
        let normalized = normalize_pick(&raw);
        match market {
            Market::OneXTwo => picks.one_x_two = normalized,
            Market::Ou25 => picks.over_under_25 = normalized,
            Market::Btts => picks.gg_ng = normalized,
        }
    }
    picks
}

fn resolve_one(pick: &str, derived: &str, map_pick: impl Fn(&str) -> Option<&'static str>) -> MarketOutcome {
    if pick == "NO_PREDICTION" {
        return MarketOutcome::Neutral;
    }
    match map_pick(pick) {
        Some(expected) => {
            if expected == derived {
                MarketOutcome::Success
            } else {
                MarketOutcome::Failure
            }
        }
        None => MarketOutcome::Neutral,
    }
}

/// Resolve all markets against a final score.
pub fn resolve_markets(picks: &SnapshotPicks, score: FinalScore) -> MarketOutcomes {
    let derived_1x2 = final_result_1x2(score);
    let derived_ou = final_result_ou25(score);
    let derived_gg = final_result_ggng(score);

    MarketOutcomes {
        one_x_two: resolve_one(&picks.one_x_two, derived_1x2, pick_to_1x2),
        over_under_25: resolve_one(&picks.over_under_25, derived_ou, |p| match p {
            "OVER" => Some("OVER"),
            "UNDER" => Some("UNDER"),
            _ => None,
        }),
        gg_ng: resolve_one(&picks.gg_ng, derived_gg, |p| match p {
            "GG" => Some("GG"),
            "NG" => Some("NG"),
            _ => None,
        }),
    }
}

/// Reason codes per market, null-safe (missing or empty lists yield `[]`).
pub fn reason_codes_by_market(decisions: &[Decision]) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = [
        (KEY_1X2.to_string(), Vec::new()),
        (KEY_OU25.to_string(), Vec::new()),
        (KEY_GGNG.to_string(), Vec::new()),
    ]
    .into_iter()
    .collect();
    for decision in decisions {
        let Some(market) = Market::parse(&decision.market) else {
            continue;
        };
        let key = match market {
            Market::OneXTwo => KEY_1X2,
            Market::Ou25 => KEY_OU25,
            Market::Btts => KEY_GGNG,
        };
        let mut codes = decision.reason_codes.clone();
        codes.truncate(20);
        out.insert(key.to_string(), codes);
    }
    out
}

/// Result of an attach operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachResult {
    pub snapshot_id: i64,
    pub market_outcomes: MarketOutcomes,
    pub reason_codes_by_market: BTreeMap<String, Vec<String>>,
    pub final_result: FinalResultSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResultSummary {
    pub home_goals: i32,
    pub away_goals: i32,
    pub status: String,
    pub resolved_at: String,
}

/// Attach a result to in-memory decisions, optionally persisting the
/// `SnapshotResolution` keyed by the analysis run.
#[allow(clippy::too_many_arguments)]
pub fn attach_result_for_decisions(
    repo: &dyn Repository,
    analysis_run_id: i64,
    decisions: &[Decision],
    score: FinalScore,
    status: &str,
    resolved_at_utc: DateTime<Utc>,
    persist: bool,
) -> Result<AttachResult, StorageError> {
    let picks = picks_from_decisions(decisions);
    let market_outcomes = resolve_markets(&picks, score);
    let reason_codes = reason_codes_by_market(decisions);

    if persist && analysis_run_id > 0 {
        let row = SnapshotResolutionRow {
            id: 0,
            analysis_run_id,
            home_goals: score.home,
            away_goals: score.away,
            status: status.to_string(),
            resolved_at_utc,
            market_outcomes_json: serde_json::to_string(&market_outcomes.to_map())?,
            reason_codes_by_market_json: serde_json::to_string(&reason_codes)?,
        };
        repo.upsert_snapshot_resolution(&row)?;
    }

    Ok(AttachResult {
        snapshot_id: analysis_run_id,
        market_outcomes,
        reason_codes_by_market: reason_codes,
        final_result: FinalResultSummary {
            home_goals: score.home,
            away_goals: score.away,
            status: status.to_string(),
            resolved_at: crate::engine::canonical::iso_utc(resolved_at_utc),
        },
    })
}

/// Attach a result to a persisted analysis run by loading its predictions.
pub fn attach_result(
    repo: &dyn Repository,
    analysis_run_id: i64,
    score: FinalScore,
    status: &str,
    resolved_at_utc: DateTime<Utc>,
) -> Result<AttachResult, StorageError> {
    let run = repo
        .analysis_run(analysis_run_id)?
        .ok_or_else(|| StorageError::NotFound(format!("analysis run {analysis_run_id}")))?;
    let predictions = repo.predictions_for_run(run.id)?;
    if predictions.is_empty() {
        return Err(StorageError::NotFound(format!(
            "predictions for analysis run {analysis_run_id}"
        )));
    }

    let picks = picks_from_rows(&predictions);
    let market_outcomes = resolve_markets(&picks, score);

    // Reason codes from stored reasons; unknown or empty JSON yields [].
    let mut reason_codes: BTreeMap<String, Vec<String>> = [
        (KEY_1X2.to_string(), Vec::new()),
        (KEY_OU25.to_string(), Vec::new()),
        (KEY_GGNG.to_string(), Vec::new()),
    ]
    .into_iter()
    .collect();
    for row in &predictions {
        let Some(market) = Market::parse(&row.market) else {
            continue;
        };
        let key = match market {
            Market::OneXTwo => KEY_1X2,
            Market::Ou25 => KEY_OU25,
            Market::Btts => KEY_GGNG,
        };
        let reasons: Vec<String> = serde_json::from_str::<Vec<String>>(&row.reasons_json)
            .unwrap_or_default()
            .into_iter()
            .take(20)
            .collect();
        reason_codes.insert(key.to_string(), reasons);
    }

    let resolution = SnapshotResolutionRow {
        id: 0,
        analysis_run_id,
        home_goals: score.home,
        away_goals: score.away,
        status: status.to_string(),
        resolved_at_utc,
        market_outcomes_json: serde_json::to_string(&market_outcomes.to_map())?,
        reason_codes_by_market_json: serde_json::to_string(&reason_codes)?,
    };
    repo.upsert_snapshot_resolution(&resolution)?;

    Ok(AttachResult {
        snapshot_id: analysis_run_id,
        market_outcomes,
        reason_codes_by_market: reason_codes,
        final_result: FinalResultSummary {
            home_goals: score.home,
            away_goals: score.away,
            status: status.to_string(),
            resolved_at: crate::engine::canonical::iso_utc(resolved_at_utc),
        },
    })
}
