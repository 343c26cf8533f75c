//! Batch runner tests: ordering determinism, rollout subsets, daily cap,
//! and failure aggregation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;

use crate::activation::tiers::{ActivationEnv, ActivationMode};
use crate::engine::policy::Policy;
use crate::engine::stability::StabilityStore;
use crate::evaluation::attach_result::FinalScore;
use crate::ingestion::live_io::LiveIoContext;
use crate::ingestion::registry::ConnectorRegistry;
use crate::ingestion::stub_live::{StubLiveConnector, StubLiveMode};
use crate::pipeline::shadow::PipelineContext;
use crate::reports::index_store::{load_index, save_index, IndexEntry, ReportIndex};
use crate::runner::shadow_batch::{run_shadow_batch, BatchRunConfig};
use crate::storage::SqliteRepository;

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 12, 0, 0).unwrap()
}

fn make_ctx(
    dir: &std::path::Path,
    activation_env: ActivationEnv,
    mode: StubLiveMode,
) -> Arc<PipelineContext> {
    let live_io = LiveIoContext::for_tests(true, activation_env.live_writes_allowed);
    let registry = ConnectorRegistry::new(dir.join("fixtures"), live_io.clone());
    registry.register(
        "stub_live_platform",
        Arc::new(StubLiveConnector::with_mode(live_io, mode)),
    );
    Arc::new(PipelineContext {
        repo: Arc::new(SqliteRepository::in_memory().unwrap()),
        connectors: Arc::new(registry),
        stability: Arc::new(StabilityStore::new()),
        policy: Policy::bootstrap_default(),
        activation_env,
        index_path: dir.join("index.json"),
    })
}

fn expanded_env(rollout_pct: f64, daily_cap: u64) -> ActivationEnv {
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
        rollout_pct,
        daily_max_activations: daily_cap,
    }
}

fn final_scores(ids: &[&str]) -> BTreeMap<String, FinalScore> {
    ids.iter()
        .map(|id| (id.to_string(), FinalScore { home: 1, away: 0 }))
        .collect()
}

#[test]
fn identical_batches_aggregate_identically_regardless_of_concurrency() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let ctx_a = make_ctx(dir_a.path(), ActivationEnv::default(), StubLiveMode::Ok);
        let ctx_b = make_ctx(dir_b.path(), ActivationEnv::default(), StubLiveMode::Ok);

        let mut config_seq = BatchRunConfig::new("stub_live_platform", now());
        config_seq.match_ids = Some(vec![
            "d4".to_string(),
            "a1".to_string(),
            "c3".to_string(),
            "b2".to_string(),
        ]);
        config_seq.final_scores = final_scores(&["a1", "b2", "c3", "d4"]);
        config_seq.max_concurrency = 1;

        let mut config_par = config_seq.clone();
        config_par.max_concurrency = 4;

        let sequential = run_shadow_batch(ctx_a, config_seq).await;
        let concurrent = run_shadow_batch(ctx_b, config_par).await;

        assert_eq!(sequential.counts, concurrent.counts);
        assert_eq!(sequential.top_flags, concurrent.top_flags);
        assert_eq!(
            sequential.gate_failure_frequency,
            concurrent.gate_failure_frequency
        );
        // Per-match reports are identical too.
        for (match_id, report) in &sequential.reports {
            let other = &concurrent.reports[match_id];
            assert_eq!(
                report.ingestion.payload_checksum,
                other.ingestion.payload_checksum
            );
            assert_eq!(report.analysis.decisions, other.analysis.decisions);
        }
    });
}

#[tokio::test]
async fn rollout_fifty_pct_limits_activation_to_first_half() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(dir.path(), expanded_env(50.0, 0), StubLiveMode::Ok);

    let mut config = BatchRunConfig::new("stub_live_platform", now());
    config.match_ids = Some(vec![
        "d4".to_string(),
        "a1".to_string(),
        "c3".to_string(),
        "b2".to_string(),
    ]);
    config.final_scores = final_scores(&["a1", "b2", "c3", "d4"]);
    config.activation = true;

    let report = run_shadow_batch(ctx, config).await;
    assert!(report.error.is_none());
    assert_eq!(report.activation.rollout_pct, 50.0);
    assert_eq!(report.activation.eligible_count, 4);
    // Only the first 50% (a1, b2) of the sorted ids can activate.
    for activated in &report.activation.activated_matches {
        assert!(["a1", "b2"].contains(&activated.as_str()));
    }
    assert!(report.activation.activated_count <= 2);
}

#[tokio::test]
async fn zero_rollout_pct_activates_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(dir.path(), expanded_env(0.0, 0), StubLiveMode::Ok);

    let mut config = BatchRunConfig::new("stub_live_platform", now());
    config.match_ids = Some(vec!["a1".to_string(), "b2".to_string()]);
    config.final_scores = final_scores(&["a1", "b2"]);
    config.activation = true;

    let report = run_shadow_batch(ctx, config).await;
    assert_eq!(report.activation.activated_count, 0);
    assert!(!report.activation.activated);
}

#[tokio::test]
async fn exhausted_daily_cap_denies_whole_batch_with_reason() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(dir.path(), expanded_env(100.0, 2), StubLiveMode::Ok);

    // Index already shows two activations today.
    let mut index = ReportIndex::default();
    index.activation_runs.push(
        IndexEntry::new("earlier", "2025-10-01T08:00:00+00:00")
            .with("activated", json!(true))
            .with("activated_count", json!(2)),
    );
    save_index(&index, &ctx.index_path).unwrap();

    let mut config = BatchRunConfig::new("stub_live_platform", now());
    config.match_ids = Some(vec!["a1".to_string(), "b2".to_string()]);
    config.final_scores = final_scores(&["a1", "b2"]);
    config.activation = true;

    let report = run_shadow_batch(ctx.clone(), config).await;
    assert_eq!(report.activation.activated_count, 0);
    let reason = report.activation.reason.unwrap();
    assert!(reason.contains("daily"));
    assert!(reason.contains("cap"));

    // No new index entry carries activated=true.
    let updated = load_index(&ctx.index_path);
    let new_activated: Vec<_> = updated
        .activation_runs
        .iter()
        .filter(|e| e.run_id != "earlier")
        .filter(|e| {
            e.extra
                .get("activated")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
        })
        .collect();
    assert!(new_activated.is_empty());
}

#[tokio::test]
async fn transport_failures_land_in_failures_not_panics() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(dir.path(), ActivationEnv::default(), StubLiveMode::ServerError);

    let mut config = BatchRunConfig::new("stub_live_platform", now());
    config.match_ids = Some(vec!["a1".to_string(), "b2".to_string()]);

    let report = run_shadow_batch(ctx, config).await;
    assert!(report.error.is_none());
    assert_eq!(report.failures.len(), 2);
    for failure in &report.failures {
        assert_eq!(failure.error, "LIVE_IO_ERROR");
    }
}

#[tokio::test]
async fn batch_appends_runs_entry_to_index() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = make_ctx(dir.path(), ActivationEnv::default(), StubLiveMode::Ok);

    let mut config = BatchRunConfig::new("stub_live_platform", now());
    config.match_ids = Some(vec!["a1".to_string()]);
    let report = run_shadow_batch(ctx.clone(), config).await;
    assert!(report.error.is_none());

    let index = load_index(&ctx.index_path);
    assert_eq!(index.runs.len(), 1);
    assert_eq!(index.runs[0].run_id, report.run_id);
}
