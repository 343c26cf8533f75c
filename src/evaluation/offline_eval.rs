//! Offline evaluation snapshot over persisted runs and resolutions.
//!
//! Feeds the tuner and the pipeline report. Everything here is derived from
//! stored rows; nothing mutates decision state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::canonical::sha256_canonical;
use crate::evaluation::attach_result::MarketOutcome;
use crate::storage::{Repository, StorageError};

/// Confidence band edges used for calibration reporting.
const CONFIDENCE_BANDS: [(f64, f64, &str); 4] = [
    (0.0, 0.62, "below_0.62"),
    (0.62, 0.70, "0.62-0.70"),
    (0.70, 0.80, "0.70-0.80"),
    (0.80, 1.01, "0.80+"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketAccuracy {
    pub success: u64,
    pub failure: u64,
    pub neutral: u64,
    /// success / (success + failure); absent when no resolved picks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BandStats {
    pub predictions: u64,
    pub success: u64,
    pub failure: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasonEffectiveness {
    pub success: u64,
    pub failure: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallCounts {
    pub total_snapshots: u64,
    pub resolved_snapshots: u64,
}

/// The evaluation report consumed by the tuner and checksummed into the
/// pipeline report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub overall: OverallCounts,
    pub per_market_accuracy: BTreeMap<String, MarketAccuracy>,
    pub confidence_bands: BTreeMap<String, BandStats>,
    pub reason_effectiveness: BTreeMap<String, ReasonEffectiveness>,
}

fn band_label(confidence: f64) -> &'static str {
    for (lo, hi, label) in CONFIDENCE_BANDS {
        if confidence >= lo && confidence < hi {
            return label;
        }
    }
    "0.80+"
}

fn market_key_to_name(key: &str) -> Option<&'static str> {
    match key {
        "one_x_two" => Some("1X2"),
        "over_under_25" => Some("OU_2.5"),
        "gg_ng" => Some("BTTS"),
        _ => None,
    }
}

/// Build the evaluation report from up to `limit` persisted runs.
pub fn build_evaluation_report(
    repo: &dyn Repository,
    limit: usize,
) -> Result<EvaluationReport, StorageError> {
    let runs = repo.list_analysis_runs(limit)?;
    let mut report = EvaluationReport {
        overall: OverallCounts {
            total_snapshots: runs.len() as u64,
            resolved_snapshots: 0,
        },
        ..EvaluationReport::default()
    };

    for run in &runs {
        let Some(resolution) = repo.snapshot_resolution_for_run(run.id)? else {
            continue;
        };
        report.overall.resolved_snapshots += 1;

        let outcomes: BTreeMap<String, MarketOutcome> =
            serde_json::from_str(&resolution.market_outcomes_json).unwrap_or_default();
        let reason_codes: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&resolution.reason_codes_by_market_json).unwrap_or_default();
        let predictions = repo.predictions_for_run(run.id)?;

        for (key, outcome) in &outcomes {
            let Some(market_name) = market_key_to_name(key) else {
                continue;
            };
            let entry = report
                .per_market_accuracy
                .entry(market_name.to_string())
                .or_default();
            match outcome {
                MarketOutcome::Success => entry.success += 1,
                MarketOutcome::Failure => entry.failure += 1,
                MarketOutcome::Neutral => entry.neutral += 1,
            }

            if matches!(outcome, MarketOutcome::Success | MarketOutcome::Failure) {
                // Confidence band from the matching prediction row.
                if let Some(prediction) = predictions
                    .iter()
                    .find(|p| crate::engine::contracts::Market::parse(&p.market)
                        .map(|m| m.as_str() == market_name)
                        .unwrap_or(false))
                {
                    let band = report
                        .confidence_bands
                        .entry(band_label(prediction.confidence).to_string())
                        .or_default();
                    band.predictions += 1;
                    if *outcome == MarketOutcome::Success {
                        band.success += 1;
                    } else {
                        band.failure += 1;
                    }
                }
                for code in reason_codes.get(key).map(Vec::as_slice).unwrap_or(&[]) {
                    let stats = report
                        .reason_effectiveness
                        .entry(code.clone())
                        .or_default();
                    if *outcome == MarketOutcome::Success {
                        stats.success += 1;
                    } else {
                        stats.failure += 1;
                    }
                }
            }
        }
    }

    for accuracy in report.per_market_accuracy.values_mut() {
        let resolved = accuracy.success + accuracy.failure;
        accuracy.accuracy = if resolved > 0 {
            Some(accuracy.success as f64 / resolved as f64)
        } else {
            None
        };
    }

    Ok(report)
}

/// Checksum of an evaluation report (canonical JSON, full content).
pub fn evaluation_report_checksum(report: &EvaluationReport) -> String {
    sha256_canonical(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisRunRow, PredictionRow, SnapshotResolutionRow};
    use crate::storage::SqliteRepository;
    use chrono::{TimeZone, Utc};

    fn seed_resolved_run(
        repo: &SqliteRepository,
        match_id: &str,
        outcome_1x2: &str,
        confidence: f64,
    ) -> i64 {
        let now = Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap();
        let run_id = repo
            .create_analysis_run(&AnalysisRunRow {
                id: 0,
                created_at_utc: now,
                logic_version: "v2".to_string(),
                mode: "PREGAME".to_string(),
                match_id: match_id.to_string(),
                data_quality_score: 0.8,
                flags_json: "[]".to_string(),
            })
            .unwrap();
        repo.create_prediction(&PredictionRow {
            id: 0,
            created_at_utc: now,
            analysis_run_id: run_id,
            match_id: match_id.to_string(),
            market: "1X2".to_string(),
            decision: "PLAY".to_string(),
            pick: Some("HOME".to_string()),
            confidence,
            risk: 1.0 - confidence,
            reasons_json: "[]".to_string(),
            evidence_pack_json: "{}".to_string(),
        })
        .unwrap();
        repo.upsert_snapshot_resolution(&SnapshotResolutionRow {
            id: 0,
            analysis_run_id: run_id,
            home_goals: 1,
            away_goals: 0,
            status: "FINAL".to_string(),
            resolved_at_utc: now,
            market_outcomes_json: format!(
                r#"{{"one_x_two":"{outcome_1x2}","over_under_25":"NEUTRAL","gg_ng":"NEUTRAL"}}"#
            ),
            reason_codes_by_market_json:
                r#"{"one_x_two":["TOP_SEP"],"over_under_25":[],"gg_ng":[]}"#.to_string(),
        })
        .unwrap();
        run_id
    }

    #[test]
    fn report_aggregates_accuracy_bands_and_reasons() {
        let repo = SqliteRepository::in_memory().unwrap();
        seed_resolved_run(&repo, "m1", "SUCCESS", 0.75);
        seed_resolved_run(&repo, "m2", "FAILURE", 0.65);

        let report = build_evaluation_report(&repo, 100).unwrap();
        assert_eq!(report.overall.total_snapshots, 2);
        assert_eq!(report.overall.resolved_snapshots, 2);

        let one_x_two = &report.per_market_accuracy["1X2"];
        assert_eq!(one_x_two.success, 1);
        assert_eq!(one_x_two.failure, 1);
        assert_eq!(one_x_two.accuracy, Some(0.5));

        assert_eq!(report.confidence_bands["0.70-0.80"].success, 1);
        assert_eq!(report.confidence_bands["0.62-0.70"].failure, 1);
        assert_eq!(report.reason_effectiveness["TOP_SEP"].success, 1);
        assert_eq!(report.reason_effectiveness["TOP_SEP"].failure, 1);
    }

    #[test]
    fn identical_stores_produce_identical_checksums() {
        let repo_a = SqliteRepository::in_memory().unwrap();
        let repo_b = SqliteRepository::in_memory().unwrap();
        seed_resolved_run(&repo_a, "m1", "SUCCESS", 0.75);
        seed_resolved_run(&repo_b, "m1", "SUCCESS", 0.75);

        let a = build_evaluation_report(&repo_a, 100).unwrap();
        let b = build_evaluation_report(&repo_b, 100).unwrap();
        assert_eq!(
            evaluation_report_checksum(&a),
            evaluation_report_checksum(&b)
        );
    }
}
