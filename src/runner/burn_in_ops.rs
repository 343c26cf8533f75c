//! Burn-in ops runner: ingestion -> live-shadow compare -> live-shadow
//! analyze -> optional burn-in activation, consolidated into one report
//! bundle and one index entry.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::engine::canonical::iso_utc;
use crate::evaluation::attach_result::FinalScore;
use crate::pipeline::shadow::PipelineContext;
use crate::reports::analyze_guardrails::AnalyzeGuardrailPolicy;
use crate::reports::bundle::{prune_bundles, write_bundle_file};
use crate::reports::index_store::{update_index, IndexEntry};
use crate::reports::live_shadow_compare::ComparePolicy;
use crate::runner::live_shadow_analyze_runner::{
    run_live_shadow_analyze, AnalyzeRunConfig, AnalyzeRunReport,
};
use crate::runner::live_shadow_compare_runner::{run_live_shadow_compare, CompareRunReport};
use crate::runner::shadow_batch::{run_shadow_batch, BatchReport, BatchRunConfig};

/// Subdirectory for burn-in bundles under the reports root.
pub const BURN_IN_OPS_SUBDIR: &str = "burn_in";
/// Bundles retained after pruning.
pub const DEFAULT_MAX_BUNDLES_RETAINED: usize = 30;

/// Burn-in ops configuration.
#[derive(Debug, Clone)]
pub struct BurnInOpsConfig {
    pub connector_name: String,
    pub recorded_connector_name: String,
    pub match_ids: Option<Vec<String>>,
    pub final_scores: BTreeMap<String, FinalScore>,
    pub enable_activation: bool,
    pub dry_run: bool,
    pub now_utc: DateTime<Utc>,
    pub max_bundles_retained: usize,
}

/// Consolidated burn-in ops report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurnInOpsReport {
    pub run_id: String,
    pub created_at_utc: String,
    pub connector_name: String,
    pub matches_count: usize,
    pub status: String,
    pub alerts_count: usize,
    pub activated: bool,
    pub activated_count: u64,
    pub live_compare: Option<CompareRunReport>,
    pub live_analyze: Option<AnalyzeRunReport>,
    pub shadow_batch: Option<BatchReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn burn_in_run_id(now: DateTime<Utc>) -> String {
    format!(
        "burn_in_ops_{}_{}",
        now.format("%Y%m%d_%H%M%S"),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    )
}

/// Run the consolidated burn-in ops flow.
pub async fn run_burn_in_ops(
    ctx: Arc<PipelineContext>,
    config: BurnInOpsConfig,
    reports_dir: &Path,
    index_path: &Path,
) -> BurnInOpsReport {
    let run_id = burn_in_run_id(config.now_utc);
    let created_at = iso_utc(config.now_utc);

    let Some(live_adapter) = ctx.connectors.get_safe(&config.connector_name) else {
        return BurnInOpsReport {
            run_id,
            created_at_utc: created_at,
            connector_name: config.connector_name.clone(),
            matches_count: 0,
            status: "error".to_string(),
            alerts_count: 0,
            activated: false,
            activated_count: 0,
            live_compare: None,
            live_analyze: None,
            shadow_batch: None,
            error: Some("CONNECTOR_NOT_AVAILABLE".to_string()),
            detail: Some(format!(
                "Connector {:?} not available (check LIVE_IO_ALLOWED and connector env).",
                config.connector_name
            )),
        };
    };

    let mut match_ids = match &config.match_ids {
        Some(ids) => ids.clone(),
        None => match live_adapter.fetch_matches().await {
            Ok(identities) => identities.into_iter().map(|m| m.match_id).collect(),
            Err(e) => {
                return BurnInOpsReport {
                    run_id,
                    created_at_utc: created_at,
                    connector_name: config.connector_name.clone(),
                    matches_count: 0,
                    status: "error".to_string(),
                    alerts_count: 0,
                    activated: false,
                    activated_count: 0,
                    live_compare: None,
                    live_analyze: None,
                    shadow_batch: None,
                    error: Some("FETCH_MATCHES_FAILED".to_string()),
                    detail: Some(e.to_string()),
                };
            }
        },
    };
    match_ids.sort();
    match_ids.dedup();

    if match_ids.is_empty() {
        return BurnInOpsReport {
            run_id,
            created_at_utc: created_at,
            connector_name: config.connector_name.clone(),
            matches_count: 0,
            status: "error".to_string(),
            alerts_count: 0,
            activated: false,
            activated_count: 0,
            live_compare: None,
            live_analyze: None,
            shadow_batch: None,
            error: Some("NO_MATCHES".to_string()),
            detail: Some("No matches from connector or provided list.".to_string()),
        };
    }

    // 1) Live shadow compare (live vs recorded ingestion).
    let recorded_adapter = ctx
        .connectors
        .get_safe(&config.recorded_connector_name)
        .unwrap_or_else(|| live_adapter.clone());
    let compare_report = run_live_shadow_compare(
        live_adapter.clone(),
        recorded_adapter,
        Some(match_ids.clone()),
        &ComparePolicy::default(),
        ctx.connectors.live_io(),
        reports_dir,
        index_path,
        config.now_utc,
    )
    .await;

    // 2) Live shadow analyze (full analyzer on both sides).
    let analyze_report = run_live_shadow_analyze(
        ctx.clone(),
        AnalyzeRunConfig {
            live_connector: config.connector_name.clone(),
            recorded_connector: config.recorded_connector_name.clone(),
            match_ids: Some(match_ids.clone()),
            final_scores: config.final_scores.clone(),
            policy: AnalyzeGuardrailPolicy::default(),
            now_utc: config.now_utc,
        },
        reports_dir,
        index_path,
    )
    .await;

    // 3) Optional burn-in activation (shadow batch with activation on).
    let mut batch_report: Option<BatchReport> = None;
    let mut activated = false;
    let mut activated_count = 0u64;
    if config.enable_activation && !config.dry_run {
        let mut batch_config = BatchRunConfig::new(&config.connector_name, config.now_utc);
        batch_config.match_ids = Some(match_ids.clone());
        batch_config.final_scores = config.final_scores.clone();
        batch_config.activation = true;
        let report = run_shadow_batch(ctx.clone(), batch_config).await;
        if report.error.is_none() {
            activated = report.activation.activated;
            activated_count = report.activation.activated_count;
        }
        batch_report = Some(report);
    }

    let alerts_count = compare_report.alerts.len() + analyze_report.alerts.len();
    let status = if compare_report.error.is_some() || analyze_report.error.is_some() {
        "error".to_string()
    } else {
        "ok".to_string()
    };

    let report = BurnInOpsReport {
        run_id: run_id.clone(),
        created_at_utc: created_at.clone(),
        connector_name: config.connector_name.clone(),
        matches_count: match_ids.len(),
        status: status.clone(),
        alerts_count,
        activated,
        activated_count,
        live_compare: Some(compare_report),
        live_analyze: Some(analyze_report),
        shadow_batch: batch_report,
        error: None,
        detail: None,
    };

    if !config.dry_run {
        let bundle_dir = reports_dir.join(BURN_IN_OPS_SUBDIR).join(&run_id);
        let summary = json!({
            "run_id": run_id,
            "created_at_utc": created_at,
            "connector_name": config.connector_name,
            "matches_count": match_ids.len(),
            "status": status,
            "alerts_count": alerts_count,
            "activated": activated,
        });
        if let Err(e) = write_bundle_file(&bundle_dir, "summary.json", &summary) {
            warn!(error = %e, "failed to write burn-in summary");
        }
        if let Err(e) = write_bundle_file(&bundle_dir, "live_compare.json", &report.live_compare) {
            warn!(error = %e, "failed to write burn-in compare section");
        }
        if let Err(e) = write_bundle_file(&bundle_dir, "live_analyze.json", &report.live_analyze) {
            warn!(error = %e, "failed to write burn-in analyze section");
        }
        if report.shadow_batch.is_some() {
            if let Err(e) =
                write_bundle_file(&bundle_dir, "shadow_batch.json", &report.shadow_batch)
            {
                warn!(error = %e, "failed to write burn-in batch section");
            }
        }

        let index_result = update_index(index_path, |index| {
            index.burn_in_ops_runs.push(
                IndexEntry::new(run_id.clone(), created_at.clone())
                    .with("status", json!(status))
                    .with("alerts_count", json!(alerts_count))
                    .with("activated", json!(activated))
                    .with("activated_count", json!(activated_count))
                    .with("matches_count", json!(match_ids.len()))
                    .with("connector_name", json!(config.connector_name)),
            );
        });
        if let Err(e) = index_result {
            warn!(error = %e, "failed to update report index");
        }
        if let Err(e) = prune_bundles(
            &reports_dir.join(BURN_IN_OPS_SUBDIR),
            config.max_bundles_retained,
        ) {
            warn!(error = %e, "failed to prune burn-in bundles");
        }
    }

    report
}
