//! Shadow pipeline behavior tests: shadow-only default, checksum
//! determinism, activation gating, and error reports.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use crate::activation::tiers::{ActivationEnv, ActivationMode};
use crate::engine::policy::Policy;
use crate::engine::stability::StabilityStore;
use crate::ingestion::live_io::LiveIoContext;
use crate::ingestion::registry::ConnectorRegistry;
use crate::ingestion::stub_live::{StubLiveConnector, StubLiveMode};
use crate::pipeline::shadow::{
    run_shadow_pipeline, PipelineContext, ShadowPipelineInput, MULTI_SOURCE_CONNECTOR,
};
use crate::evaluation::attach_result::{FinalScore, MarketOutcome};
use crate::storage::{Repository, SqliteRepository};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap()
}

fn context_with_stub(
    live_io_allowed: bool,
    activation_env: ActivationEnv,
    index_dir: &std::path::Path,
) -> PipelineContext {
    let live_io = LiveIoContext::for_tests(live_io_allowed, activation_env.live_writes_allowed);
    let registry = ConnectorRegistry::new(index_dir.join("fixtures"), live_io.clone());
    if live_io_allowed {
        registry.register(
            "stub_live_platform",
            Arc::new(StubLiveConnector::with_mode(live_io, StubLiveMode::Ok)),
        );
    }
    PipelineContext {
        repo: Arc::new(SqliteRepository::in_memory().unwrap()),
        connectors: Arc::new(registry),
        stability: Arc::new(StabilityStore::new()),
        policy: Policy::bootstrap_default(),
        activation_env,
        index_path: index_dir.join("index.json"),
    }
}

fn permissive_activation_env() -> ActivationEnv {
    ActivationEnv {
        kill_switch: false,
        enabled: true,
        mode: Some(ActivationMode::Expanded),
        mode_raw: "expanded".to_string(),
        tier: Some(ActivationMode::Expanded),
        live_writes_allowed: true,
        live_io_allowed: true,
        connectors: ["stub_live_platform".to_string()].into_iter().collect(),
        markets: ["1X2".to_string()].into_iter().collect(),
        max_matches: Some(10),
        min_confidence: 0.5,
        burn_in_min_confidence: 0.85,
        rollout_pct: 100.0,
        daily_max_activations: 0,
    }
}

fn shadow_input(match_id: &str) -> ShadowPipelineInput {
    let mut input = ShadowPipelineInput::shadow("stub_live_platform", match_id, now());
    input.final_score = Some(FinalScore { home: 1, away: 0 });
    input
}

#[tokio::test]
async fn shadow_default_persists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_with_stub(true, ActivationEnv::default(), dir.path());
    let report = run_shadow_pipeline(&ctx, &shadow_input("a1")).await;

    assert!(!report.is_error());
    assert!(!report.activation.activated);
    assert_eq!(report.analysis.snapshot_id, None);
    assert!(report
        .activation
        .audits
        .iter()
        .all(|a| !a.activation_allowed));
    // Nothing reached storage.
    assert!(ctx.repo.list_analysis_runs(10).unwrap().is_empty());
    assert!(ctx.repo.list_snapshot_resolutions(10).unwrap().is_empty());
}

#[tokio::test]
async fn payload_checksum_is_stable_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_with_stub(true, ActivationEnv::default(), dir.path());

    let first = run_shadow_pipeline(&ctx, &shadow_input("a1")).await;
    let mut later = shadow_input("a1");
    later.now_utc = Utc.with_ymd_and_hms(2025, 10, 2, 9, 0, 0).unwrap();
    let second = run_shadow_pipeline(&ctx, &later).await;

    assert_eq!(
        first.ingestion.payload_checksum,
        second.ingestion.payload_checksum
    );
    // Same inputs, same stability hashes, no guardrail trip.
    assert_eq!(
        first.stability.as_ref().unwrap().output_hash,
        second.stability.as_ref().unwrap().output_hash
    );
    assert!(second.stability.as_ref().unwrap().stable);
}

#[tokio::test]
async fn activation_with_permissive_env_persists_rows() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_with_stub(true, permissive_activation_env(), dir.path());
    let mut input = shadow_input("a1");
    input.activation = true;

    let report = run_shadow_pipeline(&ctx, &input).await;
    assert!(!report.is_error());
    assert!(report.activation.activated, "reason: {:?}", report.activation.reason);
    let run_id = report.analysis.snapshot_id.expect("persisted run id");

    // Only the gate-allowed market leaves a prediction row behind.
    let predictions = ctx.repo.predictions_for_run(run_id).unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].market, "1X2");
    // Result attach persisted the resolution under the same run.
    let resolution = ctx.repo.snapshot_resolution_for_run(run_id).unwrap();
    assert!(resolution.is_some());
    // 1X2 audit allowed; non-whitelisted markets denied.
    let audit_1x2 = report
        .activation
        .audits
        .iter()
        .find(|a| a.market == "1X2")
        .unwrap();
    assert!(audit_1x2.activation_allowed);
    let audit_ou = report
        .activation
        .audits
        .iter()
        .find(|a| a.market == "OU_2.5")
        .unwrap();
    assert!(!audit_ou.activation_allowed);
}

#[tokio::test]
async fn kill_switch_denies_every_decision_and_blocks_persistence() {
    let dir = tempfile::tempdir().unwrap();
    let mut env = permissive_activation_env();
    env.kill_switch = true;
    env.mode = Some(ActivationMode::BurnIn);
    env.mode_raw = "burn_in".to_string();
    let ctx = context_with_stub(true, env, dir.path());
    let mut input = shadow_input("a1");
    input.activation = true;

    let report = run_shadow_pipeline(&ctx, &input).await;
    assert!(!report.activation.activated);
    for audit in &report.activation.audits {
        assert!(!audit.activation_allowed);
        assert!(audit
            .activation_reason
            .as_deref()
            .unwrap()
            .contains("KILL_SWITCH"));
    }
    assert!(ctx.repo.list_analysis_runs(10).unwrap().is_empty());
}

#[tokio::test]
async fn rollout_cap_denial_is_reported_per_decision() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_with_stub(true, permissive_activation_env(), dir.path());
    let mut input = shadow_input("a1");
    input.activation = true;
    input.allow_activation_for_this_match = Some(false);

    let report = run_shadow_pipeline(&ctx, &input).await;
    assert!(!report.activation.activated);
    assert!(report
        .activation
        .reason
        .as_deref()
        .unwrap()
        .contains("rollout or daily cap"));
    assert!(ctx.repo.list_analysis_runs(10).unwrap().is_empty());
}

#[tokio::test]
async fn unknown_connector_yields_error_report() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_with_stub(false, ActivationEnv::default(), dir.path());
    let report = run_shadow_pipeline(
        &ctx,
        &ShadowPipelineInput::shadow("stub_live_platform", "a1", now()),
    )
    .await;
    assert_eq!(report.error.as_deref(), Some("CONNECTOR_NOT_FOUND"));
}

#[tokio::test]
async fn unknown_match_yields_no_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_with_stub(true, ActivationEnv::default(), dir.path());
    let report = run_shadow_pipeline(
        &ctx,
        &ShadowPipelineInput::shadow("stub_live_platform", "zz-unknown", now()),
    )
    .await;
    assert_eq!(report.error.as_deref(), Some("NO_FIXTURE"));
}

#[tokio::test]
async fn multi_source_flow_builds_report_with_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_with_stub(false, ActivationEnv::default(), dir.path());
    let mut input = ShadowPipelineInput::shadow(MULTI_SOURCE_CONNECTOR, "m-alpha", now());
    input.final_score = Some(FinalScore { home: 2, away: 1 });

    let report = run_shadow_pipeline(&ctx, &input).await;
    assert!(!report.is_error());
    assert_eq!(report.analysis.decisions.len(), 3);
    assert_eq!(report.resolution.market_outcomes.len(), 3);
    // Every outcome is from the closed vocabulary.
    for outcome in report.resolution.market_outcomes.values() {
        assert!(matches!(
            outcome,
            MarketOutcome::Success | MarketOutcome::Failure | MarketOutcome::Neutral
        ));
    }
}

#[tokio::test]
async fn dry_run_flag_rides_on_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_with_stub(true, permissive_activation_env(), dir.path());
    let mut input = shadow_input("a1");
    input.activation = true;
    input.dry_run = true;

    let report = run_shadow_pipeline(&ctx, &input).await;
    assert_eq!(report.dry_run, Some(true));
    assert!(!report.activation.activated);
    assert!(ctx.repo.list_analysis_runs(10).unwrap().is_empty());
}
