//! Live-shadow analyze runner: full pipeline with the analyzer on both sides
//! of each match, then pick/confidence/reason/coverage comparison.
//!
//! Persistence is hard-blocked regardless of capability flags; the analyzer
//! runs exactly once per side per match.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::engine::canonical::iso_utc;
use crate::evaluation::attach_result::FinalScore;
use crate::pipeline::shadow::{run_shadow_pipeline, PipelineContext, ShadowPipelineInput};
use crate::reports::analyze_guardrails::{
    compare_analysis, decision_views, evaluate_analysis_guardrails, AnalysisComparison,
    AnalyzeGuardrailPolicy,
};
use crate::reports::bundle::write_bundle_file;
use crate::reports::index_store::{update_index, IndexEntry};
use crate::reports::Alert;

/// Subdirectory for analyze bundles under the reports root.
pub const ANALYZE_REPORTS_SUBDIR: &str = "live_shadow_analyze";

/// Analyze runner configuration.
#[derive(Debug, Clone)]
pub struct AnalyzeRunConfig {
    pub live_connector: String,
    pub recorded_connector: String,
    pub match_ids: Option<Vec<String>>,
    pub final_scores: BTreeMap<String, FinalScore>,
    pub policy: AnalyzeGuardrailPolicy,
    pub now_utc: DateTime<Utc>,
}

/// Per-match comparison outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchComparison {
    pub match_id: String,
    pub comparison: AnalysisComparison,
    pub alerts: Vec<Alert>,
}

/// Analyze runner output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRunReport {
    pub run_id: String,
    pub created_at_utc: String,
    pub live_connector: String,
    pub recorded_connector: String,
    pub match_count: usize,
    pub comparisons: Vec<MatchComparison>,
    pub alerts: Vec<Alert>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn analyze_run_id(now: DateTime<Utc>) -> String {
    format!(
        "live_shadow_analyze_{}_{}",
        now.format("%Y%m%d_%H%M%S"),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    )
}

/// Run the live-shadow analyze comparison.
pub async fn run_live_shadow_analyze(
    ctx: Arc<PipelineContext>,
    config: AnalyzeRunConfig,
    reports_dir: &Path,
    index_path: &Path,
) -> AnalyzeRunReport {
    let run_id = analyze_run_id(config.now_utc);
    let created_at = iso_utc(config.now_utc);

    let mut match_ids = match &config.match_ids {
        Some(ids) => ids.clone(),
        None => {
            let Some(live) = ctx.connectors.get_safe(&config.live_connector) else {
                return error_report(
                    run_id,
                    created_at,
                    &config,
                    "CONNECTOR_NOT_AVAILABLE",
                    "Live connector not available (check LIVE_IO_ALLOWED and connector env)."
                        .to_string(),
                );
            };
            match live.fetch_matches().await {
                Ok(identities) => identities.into_iter().map(|m| m.match_id).collect(),
                Err(e) => {
                    return error_report(
                        run_id,
                        created_at,
                        &config,
                        "FETCH_MATCHES_FAILED",
                        e.to_string(),
                    )
                }
            }
        }
    };
    match_ids.sort();
    match_ids.dedup();

    if match_ids.is_empty() {
        return error_report(
            run_id,
            created_at,
            &config,
            "NO_MATCHES",
            "No matches found or provided.".to_string(),
        );
    }

    let mut comparisons: Vec<MatchComparison> = Vec::new();
    let mut all_alerts: Vec<Alert> = Vec::new();

    for match_id in &match_ids {
        let score = config
            .final_scores
            .get(match_id)
            .copied()
            .unwrap_or(FinalScore { home: 0, away: 0 });

        // One pipeline invocation per side: analyzer runs exactly once each.
        let side_input = |connector: &str| ShadowPipelineInput {
            connector_name: connector.to_string(),
            match_id: match_id.clone(),
            final_score: Some(score),
            status: "FINAL".to_string(),
            now_utc: config.now_utc,
            dry_run: true,
            hard_block_persistence: true,
            activation: false,
            allow_activation_for_this_match: None,
            batch_denial_reason: None,
        };

        let live_report = run_shadow_pipeline(&ctx, &side_input(&config.live_connector)).await;
        if live_report.is_error() {
            warn!(match_id = %match_id, error = ?live_report.error, "live side failed; skipping match");
            continue;
        }
        let recorded_report =
            run_shadow_pipeline(&ctx, &side_input(&config.recorded_connector)).await;
        if recorded_report.is_error() {
            warn!(match_id = %match_id, error = ?recorded_report.error, "recorded side failed; skipping match");
            continue;
        }

        let live_views = decision_views(&live_report.analysis.decisions);
        let recorded_views = decision_views(&recorded_report.analysis.decisions);
        let comparison = compare_analysis(&live_views, &recorded_views);
        let alerts = evaluate_analysis_guardrails(&live_views, &recorded_views, &config.policy);
        all_alerts.extend(alerts.clone());
        comparisons.push(MatchComparison {
            match_id: match_id.clone(),
            comparison,
            alerts,
        });
    }

    let report = AnalyzeRunReport {
        run_id: run_id.clone(),
        created_at_utc: created_at.clone(),
        live_connector: config.live_connector.clone(),
        recorded_connector: config.recorded_connector.clone(),
        match_count: match_ids.len(),
        comparisons,
        alerts: all_alerts.clone(),
        status: "ok".to_string(),
        error: None,
        detail: None,
    };

    let bundle_dir = reports_dir.join(ANALYZE_REPORTS_SUBDIR).join(&run_id);
    if let Err(e) = write_bundle_file(&bundle_dir, "analyze.json", &report) {
        warn!(error = %e, "failed to write analyze bundle");
    }
    let index_result = update_index(index_path, |index| {
        index.live_shadow_analyze_runs.push(
            IndexEntry::new(run_id.clone(), created_at.clone())
                .with("matches_count", json!(match_ids.len()))
                .with("alerts_count", json!(all_alerts.len()))
                .with("live_connector", json!(config.live_connector))
                .with("recorded_connector", json!(config.recorded_connector)),
        );
    });
    if let Err(e) = index_result {
        warn!(error = %e, "failed to update report index");
    }

    report
}

fn error_report(
    run_id: String,
    created_at: String,
    config: &AnalyzeRunConfig,
    code: &str,
    detail: String,
) -> AnalyzeRunReport {
    AnalyzeRunReport {
        run_id,
        created_at_utc: created_at,
        live_connector: config.live_connector.clone(),
        recorded_connector: config.recorded_connector.clone(),
        match_count: 0,
        comparisons: Vec::new(),
        alerts: Vec::new(),
        status: "error".to_string(),
        error: Some(code.to_string()),
        detail: Some(detail),
    }
}
