//! Single-match shadow pipeline.
//!
//! ingest -> analyze -> activation audit -> (gated) persist -> attach result
//! -> evaluation snapshot -> tuner (shadow) -> policy audit. Default is
//! shadow-only: nothing is persisted unless activation is requested, every
//! blocking flag is clear, and at least one decision passes the gate.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::activation::audit::build_activation_audit;
use crate::activation::gate::check_activation_gate;
use crate::activation::tiers::ActivationEnv;
use crate::activation::ActivationAudit;
use crate::engine::analyzer::{analyze_v2, default_market_requests};
use crate::engine::canonical::{sha256_canonical, strip_volatile};
use crate::engine::contracts::{AnalyzerResult, Decision, GateResult};
use crate::engine::evidence::{EvidencePack, VOLATILE_EVIDENCE_KEYS};
use crate::engine::policy::{min_confidence_from_policy, Policy};
use crate::engine::resolver::{normalize_alias, ResolutionStatus};
use crate::engine::stability::{run_stability_check, StabilityCheck, StabilityStore};
use crate::evaluation::attach_result::{attach_result_for_decisions, FinalScore, MarketOutcome};
use crate::evaluation::evaluator::evaluate_prediction;
use crate::evaluation::offline_eval::{build_evaluation_report, evaluation_report_checksum};
use crate::ingestion::connector::IngestedMatchData;
use crate::ingestion::evidence_builder::ingested_to_evidence_pack;
use crate::ingestion::registry::ConnectorRegistry;
use crate::models::{AnalysisRunRow, MatchRow, PredictionRow};
use crate::pipeline::multi_source::{run_pipeline, PipelineInput};
use crate::reports::index_store::load_index;
use crate::storage::Repository;
use crate::tuner::{audit_snapshots, proposal_checksum, run_tuner, AuditSnapshot};

/// Connector name that routes through the multi-source pipeline instead of a
/// registered connector.
pub const MULTI_SOURCE_CONNECTOR: &str = "multi_source";

/// Shared context for pipeline runs. Owned by the runner; interior state
/// (stability store, live-I/O metrics) carries its own synchronization.
pub struct PipelineContext {
    pub repo: Arc<dyn Repository>,
    pub connectors: Arc<ConnectorRegistry>,
    pub stability: Arc<StabilityStore>,
    pub policy: Policy,
    pub activation_env: ActivationEnv,
    pub index_path: PathBuf,
}

/// Input for one shadow pipeline run.
#[derive(Debug, Clone)]
pub struct ShadowPipelineInput {
    pub connector_name: String,
    pub match_id: String,
    pub final_score: Option<FinalScore>,
    pub status: String,
    pub now_utc: DateTime<Utc>,
    pub dry_run: bool,
    pub hard_block_persistence: bool,
    pub activation: bool,
    /// Set by the batch runner's rollout / daily-cap pre-pass.
    pub allow_activation_for_this_match: Option<bool>,
    /// Batch-level denial reason carried onto every per-decision audit.
    pub batch_denial_reason: Option<String>,
}

impl ShadowPipelineInput {
    pub fn shadow(connector_name: &str, match_id: &str, now_utc: DateTime<Utc>) -> Self {
        Self {
            connector_name: connector_name.to_string(),
            match_id: match_id.to_string(),
            final_score: None,
            status: "FINAL".to_string(),
            now_utc,
            dry_run: false,
            hard_block_persistence: false,
            activation: false,
            allow_activation_for_this_match: None,
            batch_denial_reason: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionSection {
    pub payload_checksum: Option<String>,
    pub collected_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickConfidence {
    pub pick: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSection {
    pub snapshot_id: Option<i64>,
    pub markets_picks_confidences: BTreeMap<String, PickConfidence>,
    pub decisions: Vec<Decision>,
    pub flags: Vec<String>,
    pub gate_results: Vec<GateResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionSection {
    pub market_outcomes: BTreeMap<String, MarketOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposalSection {
    pub diffs: Vec<crate::tuner::PolicyDiff>,
    pub guardrails_results: Vec<crate::tuner::GuardrailResult>,
    pub proposal_checksum: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSection {
    pub changed_count: u32,
    pub per_market_change_count: BTreeMap<String, u32>,
    pub snapshots_checksum: Option<String>,
    pub current_policy_checksum: Option<String>,
    pub proposed_policy_checksum: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationSection {
    pub activated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub audits: Vec<ActivationAudit>,
}

/// Full pipeline report for one match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub ingestion: IngestionSection,
    pub analysis: AnalysisSection,
    pub resolution: ResolutionSection,
    pub evaluation_report_checksum: Option<String>,
    pub proposal: ProposalSection,
    pub audit: AuditSection,
    pub activation: ActivationSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability: Option<StabilityCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl PipelineReport {
    pub fn error_report(code: &str, detail: impl Into<String>) -> Self {
        Self {
            error: Some(code.to_string()),
            detail: Some(detail.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn slug(s: &str, max_len: usize) -> String {
    let normalized = normalize_alias(s).replace(' ', "_");
    let out = if normalized.is_empty() {
        "unknown".to_string()
    } else {
        normalized
    };
    out.chars().take(max_len).collect()
}

/// Ensure the canonical match row exists for a connector-backed flow, so the
/// resolver and evaluation can reference it.
fn ensure_match_row(
    repo: &dyn Repository,
    connector_name: &str,
    ingested: &IngestedMatchData,
) -> Result<(), crate::storage::StorageError> {
    let kickoff = crate::engine::canonical::parse_iso_utc(&ingested.kickoff_utc)
        .unwrap_or_else(Utc::now);
    repo.ensure_match(&MatchRow {
        id: ingested.match_id.clone(),
        home_team_id: format!("{connector_name}_team_{}", slug(&ingested.home_team, 32)),
        away_team_id: format!("{connector_name}_team_{}", slug(&ingested.away_team, 32)),
        kickoff_utc: kickoff,
        competition_id: Some(format!("{connector_name}_comp_{}", slug(&ingested.competition, 24))),
        status: ingested.status.clone(),
    })
}

/// Run the full shadow pipeline for one match.
pub async fn run_shadow_pipeline(
    ctx: &PipelineContext,
    input: &ShadowPipelineInput,
) -> PipelineReport {
    debug!(connector = %input.connector_name, match_id = %input.match_id, "shadow pipeline start");

    // 1) Ingest: connector-backed flow or the multi-source pipeline.
    let evidence_pack: EvidencePack = if input.connector_name == MULTI_SOURCE_CONNECTOR {
        let pipeline_input = PipelineInput::new(input.match_id.clone());
        match run_pipeline(
            ctx.repo.as_ref(),
            &pipeline_input,
            input.now_utc,
            input.dry_run || input.hard_block_persistence,
        )
        .await
        {
            Ok(result) => match result.evidence_pack {
                Some(pack) => pack,
                None => {
                    return PipelineReport::error_report(
                        "NO_EVIDENCE_PACK",
                        "Pipeline returned no evidence pack",
                    )
                }
            },
            Err(e) => return PipelineReport::error_report("PIPELINE_FAILED", e.to_string()),
        }
    } else {
        let Some(connector) = ctx.connectors.get_safe(&input.connector_name) else {
            warn!(connector = %input.connector_name, "connector not available or live IO not allowed");
            return PipelineReport::error_report(
                "CONNECTOR_NOT_FOUND",
                format!(
                    "{} not available or live IO not allowed",
                    input.connector_name
                ),
            );
        };
        match connector.fetch_match_data(&input.match_id).await {
            Ok(Some(ingested)) => {
                if !input.hard_block_persistence && !input.dry_run {
                    if let Err(e) = ensure_match_row(ctx.repo.as_ref(), &input.connector_name, &ingested)
                    {
                        warn!(error = %e, "failed to ensure match row; continuing in shadow");
                    }
                }
                ingested_to_evidence_pack(&ingested, input.now_utc)
            }
            Ok(None) => {
                return PipelineReport::error_report(
                    "NO_FIXTURE",
                    format!("No fixture found for match_id={:?}", input.match_id),
                )
            }
            Err(e) => {
                return PipelineReport::error_report("LIVE_IO_ERROR", e.to_string());
            }
        }
    };

    // 2) Volatility-stripped payload checksum: identical payloads hash
    // identically across repeated runs.
    let serialized = serde_json::to_value(&evidence_pack).unwrap_or(serde_json::Value::Null);
    let stripped = strip_volatile(&serialized, &VOLATILE_EVIDENCE_KEYS);
    let payload_checksum = sha256_canonical(&stripped);
    let collected_at = evidence_pack.captured_at_utc.clone();

    // 3) Analyzer v2 under the active policy.
    let min_confidence = min_confidence_from_policy(&ctx.policy);
    let mut analyzer_result: AnalyzerResult = analyze_v2(
        ResolutionStatus::Resolved,
        Some(&evidence_pack),
        &default_market_requests(),
        min_confidence,
    );

    // 4) Stability guardrail (records latest output hash, flags divergence).
    let stability = run_stability_check(
        ctx.stability.as_ref(),
        &input.match_id,
        Some(&evidence_pack),
        &mut analyzer_result,
    );

    // 5) Per-decision activation gate.
    let index = load_index(&ctx.index_path);
    let mut activation_audits: Vec<ActivationAudit> = Vec::new();
    let mut activation_allowed_for_match = false;

    if input.activation && input.allow_activation_for_this_match == Some(false) {
        let reason = input
            .batch_denial_reason
            .clone()
            .unwrap_or_else(|| "rollout or daily cap limited".to_string());
        info!(match_id = %input.match_id, reason = %reason, "activation blocked before the per-decision gate");
        for decision in &analyzer_result.decisions {
            activation_audits.push(build_activation_audit(
                &input.connector_name,
                &input.match_id,
                decision,
                false,
                Some(reason.clone()),
                input.now_utc,
            ));
        }
    } else if input.activation && !input.hard_block_persistence && !input.dry_run {
        for decision in &analyzer_result.decisions {
            let gate = check_activation_gate(
                &ctx.activation_env,
                &input.connector_name,
                &decision.market,
                decision.confidence.unwrap_or(0.0),
                min_confidence,
                &index,
            );
            if gate.allowed {
                activation_allowed_for_match = true;
            }
            activation_audits.push(build_activation_audit(
                &input.connector_name,
                &input.match_id,
                decision,
                gate.allowed,
                gate.reason,
                input.now_utc,
            ));
        }
    } else {
        let reason = if input.activation {
            "hard_block_persistence or dry_run"
        } else {
            "activation=False or persistence blocked"
        };
        for decision in &analyzer_result.decisions {
            activation_audits.push(build_activation_audit(
                &input.connector_name,
                &input.match_id,
                decision,
                false,
                Some(reason.to_string()),
                input.now_utc,
            ));
        }
    }

    // 6) Persist AnalysisRun + Predictions only when every blocking flag is
    // clear and the gate allowed at least one decision. Prediction rows are
    // written per decision: a decision whose activation was denied leaves no
    // row behind.
    let allowed_markets: std::collections::BTreeSet<String> = activation_audits
        .iter()
        .filter(|audit| audit.activation_allowed)
        .map(|audit| audit.market.clone())
        .collect();
    let should_persist = input.activation
        && !input.hard_block_persistence
        && !input.dry_run
        && activation_allowed_for_match;
    let mut snapshot_id: Option<i64> = None;
    if should_persist {
        let flags_json = serde_json::to_string(&analyzer_result.analysis_run.flags)
            .unwrap_or_else(|_| "[]".to_string());
        let data_quality_score = analyzer_result
            .analysis_run
            .conflict_summary
            .map(|c| c.evidence_quality)
            .unwrap_or(0.0);
        match ctx.repo.create_analysis_run(&AnalysisRunRow {
            id: 0,
            created_at_utc: input.now_utc,
            logic_version: analyzer_result.version.clone(),
            mode: "PREGAME".to_string(),
            match_id: input.match_id.clone(),
            data_quality_score,
            flags_json,
        }) {
            Ok(run_id) => {
                snapshot_id = Some(run_id);
                let evidence_pack_json =
                    serde_json::to_string(&evidence_pack).unwrap_or_else(|_| "{}".to_string());
                for decision in &analyzer_result.decisions {
                    if !allowed_markets.contains(&decision.market) {
                        continue;
                    }
                    let confidence = decision.confidence.unwrap_or(0.0);
                    let row = PredictionRow {
                        id: 0,
                        created_at_utc: input.now_utc,
                        analysis_run_id: run_id,
                        match_id: input.match_id.clone(),
                        market: decision.market.clone(),
                        decision: decision.decision.as_str().to_string(),
                        pick: decision.selection.map(|s| s.as_str().to_string()),
                        confidence,
                        risk: (1.0 - confidence).max(0.0),
                        reasons_json: serde_json::to_string(&decision.reasons)
                            .unwrap_or_else(|_| "[]".to_string()),
                        evidence_pack_json: evidence_pack_json.clone(),
                    };
                    if let Err(e) = ctx.repo.create_prediction(&row) {
                        warn!(error = %e, market = %decision.market, "failed to persist prediction");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to persist analysis run; continuing in shadow");
            }
        }
    }

    // 7) Attach result (deterministic outcome resolution), then evaluate the
    // persisted predictions into outcome rows (NO_BET yields none).
    let resolution = match input.final_score {
        Some(score) => attach_result_for_decisions(
            ctx.repo.as_ref(),
            snapshot_id.unwrap_or(0),
            &analyzer_result.decisions,
            score,
            &input.status,
            input.now_utc,
            should_persist && !input.dry_run,
        )
        .map(|attach| attach.market_outcomes.to_map())
        .unwrap_or_else(|e| {
            warn!(error = %e, "attach result failed");
            BTreeMap::new()
        }),
        None => BTreeMap::new(),
    };
    if let (Some(run_id), Some(score)) = (snapshot_id, input.final_score) {
        match ctx.repo.predictions_for_run(run_id) {
            Ok(rows) => {
                for row in rows {
                    if let Err(e) = evaluate_prediction(
                        ctx.repo.as_ref(),
                        &row,
                        score.home,
                        score.away,
                        input.now_utc,
                    ) {
                        warn!(error = %e, market = %row.market, "outcome evaluation failed");
                    }
                }
            }
            Err(e) => warn!(error = %e, "could not load predictions for evaluation"),
        }
    }

    // 8) Evaluation snapshot + checksum.
    let eval_report = match build_evaluation_report(ctx.repo.as_ref(), 5_000) {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "evaluation report failed; using empty report");
            Default::default()
        }
    };
    let evaluation_checksum = Some(evaluation_report_checksum(&eval_report));

    // 9) Tuner in shadow.
    let proposal = run_tuner(&eval_report, &ctx.policy);
    let proposal_checksum_value = proposal_checksum(&proposal);

    // 10) Policy audit over this match's snapshot; never applied.
    let audit_report = audit_snapshots(
        &[AuditSnapshot {
            match_id: input.match_id.clone(),
            evidence_pack: evidence_pack.clone(),
        }],
        &ctx.policy,
        &proposal.proposed_policy,
    );

    let mut picks: BTreeMap<String, PickConfidence> = BTreeMap::new();
    for decision in &analyzer_result.decisions {
        picks.insert(
            decision.market.clone(),
            PickConfidence {
                pick: Some(
                    decision
                        .selection
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_else(|| decision.decision.as_str().to_string()),
                ),
                confidence: decision.confidence,
            },
        );
    }

    let denial_reason = if !activation_allowed_for_match {
        activation_audits
            .first()
            .and_then(|audit| audit.activation_reason.clone())
    } else {
        None
    };

    PipelineReport {
        ingestion: IngestionSection {
            payload_checksum: Some(payload_checksum),
            collected_at: Some(collected_at),
        },
        analysis: AnalysisSection {
            snapshot_id,
            markets_picks_confidences: picks,
            decisions: analyzer_result.decisions.clone(),
            flags: analyzer_result.analysis_run.flags.clone(),
            gate_results: analyzer_result.analysis_run.gate_results.clone(),
        },
        resolution: ResolutionSection {
            market_outcomes: resolution,
        },
        evaluation_report_checksum: evaluation_checksum,
        proposal: ProposalSection {
            diffs: proposal.diffs,
            guardrails_results: proposal.guardrails_results,
            proposal_checksum: Some(proposal_checksum_value),
        },
        audit: AuditSection {
            changed_count: audit_report.changed_count,
            per_market_change_count: audit_report.per_market_change_count,
            snapshots_checksum: Some(audit_report.snapshots_checksum),
            current_policy_checksum: Some(audit_report.current_policy_checksum),
            proposed_policy_checksum: Some(audit_report.proposed_policy_checksum),
        },
        activation: ActivationSection {
            activated: input.activation && activation_allowed_for_match,
            reason: denial_reason,
            audits: activation_audits,
        },
        stability: Some(stability),
        dry_run: if input.dry_run { Some(true) } else { None },
        error: None,
        detail: None,
    }
}
