//! Batch shadow runner.
//!
//! Iterates the sorted match list, runs the shadow pipeline per match with
//! bounded concurrency, and aggregates counts in sorted order so the batch
//! report equals the sequential result regardless of execution interleaving.
//! Rollout percentage and the daily cap are applied before the per-decision
//! loop; a consumed daily cap denies the entire batch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::activation::gate::check_activation_gate_batch;
use crate::activation::tiers::{daily_cap_remaining, select_rollout_match_ids, get_tier_config};
use crate::engine::canonical::iso_utc;
use crate::engine::contracts::{DecisionCounts, DecisionKind};
use crate::evaluation::attach_result::FinalScore;
use crate::ingestion::live_io::{live_io_alerts, LiveIoMetricsSnapshot};
use crate::pipeline::shadow::{
    run_shadow_pipeline, PipelineContext, PipelineReport, ShadowPipelineInput,
    MULTI_SOURCE_CONNECTOR,
};
use crate::reports::index_store::{load_index, update_index, IndexEntry};
use crate::reports::Alert;

/// Default bound on concurrently running matches.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Batch run configuration.
#[derive(Debug, Clone)]
pub struct BatchRunConfig {
    pub connector_name: String,
    pub match_ids: Option<Vec<String>>,
    pub final_scores: BTreeMap<String, FinalScore>,
    pub now_utc: DateTime<Utc>,
    pub activation: bool,
    pub dry_run: bool,
    pub max_concurrency: usize,
}

impl BatchRunConfig {
    pub fn new(connector_name: &str, now_utc: DateTime<Utc>) -> Self {
        Self {
            connector_name: connector_name.to_string(),
            match_ids: None,
            final_scores: BTreeMap::new(),
            now_utc,
            activation: false,
            dry_run: false,
            max_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagCount {
    pub flag: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateFailureCount {
    pub gate_id: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFailure {
    pub match_id: String,
    pub error: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchActivationSummary {
    pub requested: bool,
    pub tier: String,
    pub rollout_pct: f64,
    pub eligible_count: usize,
    pub activated: bool,
    pub activated_count: u64,
    pub activated_matches: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Aggregated batch report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    pub created_at_utc: String,
    pub connector_name: String,
    pub match_count: usize,
    pub counts: DecisionCounts,
    pub top_flags: Vec<FlagCount>,
    pub gate_failure_frequency: Vec<GateFailureCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_io: Option<LiveIoMetricsSnapshot>,
    pub guardrail_alerts: Vec<Alert>,
    pub failures: Vec<MatchFailure>,
    pub activation: BatchActivationSummary,
    pub reports: BTreeMap<String, PipelineReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl BatchReport {
    fn error_report(run_id: String, created_at: String, code: &str, detail: String) -> Self {
        Self {
            run_id,
            created_at_utc: created_at,
            error: Some(code.to_string()),
            detail: Some(detail),
            ..Self::default()
        }
    }
}

fn batch_run_id(now: DateTime<Utc>) -> String {
    format!(
        "shadow_batch_{}_{}",
        now.format("%Y%m%d_%H%M%S"),
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    )
}

/// Run the batch shadow pipeline.
pub async fn run_shadow_batch(ctx: Arc<PipelineContext>, config: BatchRunConfig) -> BatchReport {
    let run_id = batch_run_id(config.now_utc);
    let created_at = iso_utc(config.now_utc);

    // Resolve the match list: explicit ids or the connector's listing.
    let mut match_ids: Vec<String> = match &config.match_ids {
        Some(ids) => ids.clone(),
        None => {
            if config.connector_name == MULTI_SOURCE_CONNECTOR {
                return BatchReport::error_report(
                    run_id,
                    created_at,
                    "NO_MATCHES",
                    "multi_source flow requires an explicit match list".to_string(),
                );
            }
            let Some(connector) = ctx.connectors.get_safe(&config.connector_name) else {
                return BatchReport::error_report(
                    run_id,
                    created_at,
                    "CONNECTOR_NOT_AVAILABLE",
                    format!(
                        "Connector {:?} not available (check LIVE_IO_ALLOWED and connector env).",
                        config.connector_name
                    ),
                );
            };
            match connector.fetch_matches().await {
                Ok(identities) => identities.into_iter().map(|m| m.match_id).collect(),
                Err(e) => {
                    return BatchReport::error_report(
                        run_id,
                        created_at,
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
        return BatchReport::error_report(
            run_id,
            created_at,
            "NO_MATCHES",
            "No matches from connector or provided list.".to_string(),
        );
    }

    // Activation pre-pass: batch gate, rollout subset, daily cap.
    let index = load_index(&ctx.index_path);
    let tier_config = get_tier_config(&ctx.activation_env);
    let mut eligible: BTreeSet<String> = BTreeSet::new();
    let mut batch_denial: Option<String> = None;

    if config.activation {
        let gate = check_activation_gate_batch(
            &ctx.activation_env,
            &config.connector_name,
            match_ids.len(),
            &index,
        );
        if !gate.allowed {
            batch_denial = gate.reason;
        } else {
            let rollout = select_rollout_match_ids(&match_ids, ctx.activation_env.rollout_pct);
            match daily_cap_remaining(&ctx.activation_env, &index, config.now_utc) {
                Some(0) => {
                    batch_denial = Some(format!(
                        "daily activation cap reached (cap={})",
                        ctx.activation_env.daily_max_activations
                    ));
                }
                Some(remaining) => {
                    eligible = rollout.into_iter().take(remaining as usize).collect();
                }
                None => eligible = rollout,
            }
        }
        if let Some(reason) = &batch_denial {
            info!(reason = %reason, "batch activation denied; running shadow-only");
        }
    }

    // Per-match shadow pipelines under bounded concurrency. Aggregation
    // happens over the sorted id list, so the observed counters equal the
    // sequential result on the same input set.
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut join_set = tokio::task::JoinSet::new();
    for match_id in match_ids.clone() {
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        let connector_name = config.connector_name.clone();
        let final_score = config.final_scores.get(&match_id).copied();
        let allow = if config.activation {
            Some(batch_denial.is_none() && eligible.contains(&match_id))
        } else {
            None
        };
        let input = ShadowPipelineInput {
            connector_name,
            match_id: match_id.clone(),
            final_score,
            status: "FINAL".to_string(),
            now_utc: config.now_utc,
            dry_run: config.dry_run,
            hard_block_persistence: false,
            activation: config.activation,
            allow_activation_for_this_match: allow,
            batch_denial_reason: batch_denial.clone(),
        };
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let report = run_shadow_pipeline(&ctx, &input).await;
            (match_id, report)
        });
    }

    let mut reports: BTreeMap<String, PipelineReport> = BTreeMap::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((match_id, report)) => {
                reports.insert(match_id, report);
            }
            Err(e) => warn!(error = %e, "match task panicked"),
        }
    }

    // Aggregate in sorted order.
    let mut counts = DecisionCounts::default();
    let mut flag_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut gate_failures: BTreeMap<String, u64> = BTreeMap::new();
    let mut failures: Vec<MatchFailure> = Vec::new();
    let mut activated_matches: Vec<String> = Vec::new();
    let mut guardrail_alerts: Vec<Alert> = Vec::new();

    for match_id in &match_ids {
        let Some(report) = reports.get(match_id) else {
            failures.push(MatchFailure {
                match_id: match_id.clone(),
                error: "MISSING_REPORT".to_string(),
                detail: "per-match task produced no report".to_string(),
            });
            continue;
        };
        if let Some(error) = &report.error {
            failures.push(MatchFailure {
                match_id: match_id.clone(),
                error: error.clone(),
                detail: report.detail.clone().unwrap_or_default(),
            });
            continue;
        }
        for decision in &report.analysis.decisions {
            match decision.decision {
                DecisionKind::Play => counts.play += 1,
                DecisionKind::NoBet => counts.no_bet += 1,
                DecisionKind::NoPrediction => counts.no_prediction += 1,
            }
            for flag in &decision.flags {
                *flag_counts.entry(flag.clone()).or_default() += 1;
            }
        }
        for flag in &report.analysis.flags {
            *flag_counts.entry(flag.clone()).or_default() += 1;
            if flag == "INTERNAL_GUARDRAIL_TRIGGERED" {
                guardrail_alerts.push(Alert::warn(
                    "STABILITY_DIVERGENCE",
                    format!("Match {match_id}: analyzer output diverged for identical input."),
                ));
            }
        }
        for gate in &report.analysis.gate_results {
            if !gate.pass {
                let key = serde_json::to_value(gate.gate_id)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "unknown".to_string());
                *gate_failures.entry(key).or_default() += 1;
            }
        }
        if report.activation.activated {
            activated_matches.push(match_id.clone());
        }
    }

    let live_io_snapshot = ctx.connectors.live_io().metrics.snapshot();
    guardrail_alerts.extend(live_io_alerts(
        &live_io_snapshot,
        &ctx.connectors.live_io().thresholds,
    ));

    let mut top_flags: Vec<FlagCount> = flag_counts
        .into_iter()
        .map(|(flag, count)| FlagCount { flag, count })
        .collect();
    top_flags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.flag.cmp(&b.flag)));
    top_flags.truncate(10);

    let mut gate_failure_frequency: Vec<GateFailureCount> = gate_failures
        .into_iter()
        .map(|(gate_id, count)| GateFailureCount { gate_id, count })
        .collect();
    gate_failure_frequency
        .sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.gate_id.cmp(&b.gate_id)));
    gate_failure_frequency.truncate(10);

    let activated_count = activated_matches.len() as u64;
    let activation_summary = BatchActivationSummary {
        requested: config.activation,
        tier: tier_config.tier.clone(),
        rollout_pct: ctx.activation_env.rollout_pct,
        eligible_count: match_ids.len(),
        activated: activated_count > 0,
        activated_count,
        activated_matches: activated_matches.clone(),
        reason: batch_denial.clone(),
    };

    // Index entries: one `runs` entry per batch; one activation entry when
    // activation was requested.
    if !config.dry_run {
        let index_result = update_index(&ctx.index_path, |index| {
            index.runs.push(
                IndexEntry::new(run_id.clone(), created_at.clone())
                    .with("connector_name", json!(config.connector_name))
                    .with("matches_count", json!(match_ids.len()))
                    .with("failures_count", json!(failures.len())),
            );
            if config.activation {
                index.activation_runs.push(
                    IndexEntry::new(run_id.clone(), created_at.clone())
                        .with("connector_name", json!(config.connector_name))
                        .with("matches_count", json!(match_ids.len()))
                        .with("activated", json!(activated_count > 0))
                        .with("activated_count", json!(activated_count))
                        .with("reason", json!(batch_denial))
                        .with("activated_matches", json!(activated_matches)),
                );
            }
        });
        if let Err(e) = index_result {
            warn!(error = %e, "failed to update report index");
        }
    }

    BatchReport {
        run_id,
        created_at_utc: created_at,
        connector_name: config.connector_name.clone(),
        match_count: match_ids.len(),
        counts,
        top_flags,
        gate_failure_frequency,
        live_io: Some(live_io_snapshot),
        guardrail_alerts,
        failures,
        activation: activation_summary,
        reports,
        error: None,
        detail: None,
    }
}
