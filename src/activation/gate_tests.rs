//! Activation gate ordering tests: the first failing layer wins.

use crate::activation::gate::{check_activation_gate, check_activation_gate_batch};
use crate::activation::tiers::{ActivationEnv, ActivationMode};
use crate::reports::index_store::{IndexEntry, ReportIndex};
use serde_json::json;

fn permissive_env(mode: ActivationMode) -> ActivationEnv {
    ActivationEnv {
        kill_switch: false,
        enabled: true,
        mode: Some(mode),
        mode_raw: mode.as_str().to_string(),
        tier: Some(mode),
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

#[test]
fn kill_switch_wins_over_everything() {
    let mut env = permissive_env(ActivationMode::BurnIn);
    env.kill_switch = true;
    let decision = check_activation_gate(
        &env,
        "real_provider",
        "1X2",
        0.95,
        0.62,
        &ReportIndex::default(),
    );
    assert!(!decision.allowed);
    assert!(decision.reason.unwrap().contains("KILL_SWITCH"));
}

#[test]
fn disabled_activation_is_denied_before_mode_checks() {
    let mut env = permissive_env(ActivationMode::Limited);
    env.enabled = false;
    env.mode = None;
    let decision =
        check_activation_gate(&env, "stub_live_platform", "1X2", 0.9, 0.62, &ReportIndex::default());
    assert!(decision.reason.unwrap().contains("ACTIVATION_ENABLED"));
}

#[test]
fn invalid_mode_is_denied() {
    let mut env = permissive_env(ActivationMode::Limited);
    env.mode = None;
    env.mode_raw = "yolo".to_string();
    let decision =
        check_activation_gate(&env, "stub_live_platform", "1X2", 0.9, 0.62, &ReportIndex::default());
    assert!(decision.reason.unwrap().contains("ACTIVATION_MODE"));
}

#[test]
fn live_writes_required() {
    let mut env = permissive_env(ActivationMode::Limited);
    env.live_writes_allowed = false;
    let decision =
        check_activation_gate(&env, "stub_live_platform", "1X2", 0.9, 0.62, &ReportIndex::default());
    assert!(decision.reason.unwrap().contains("LIVE_WRITES_ALLOWED"));
}

#[test]
fn burn_in_additionally_requires_live_io() {
    let mut env = permissive_env(ActivationMode::BurnIn);
    env.live_io_allowed = false;
    let decision = check_activation_gate(
        &env,
        "real_provider",
        "1X2",
        0.95,
        0.62,
        &ReportIndex::default(),
    );
    assert!(decision.reason.unwrap().contains("LIVE_IO_ALLOWED"));
}

#[test]
fn connector_and_market_whitelists_apply_in_limited_mode() {
    let env = permissive_env(ActivationMode::Limited);
    let wrong_connector = check_activation_gate(
        &env,
        "other_connector",
        "1X2",
        0.9,
        0.62,
        &ReportIndex::default(),
    );
    assert!(wrong_connector
        .reason
        .unwrap()
        .contains("ACTIVATION_CONNECTORS"));

    let wrong_market = check_activation_gate(
        &env,
        "stub_live_platform",
        "BTTS",
        0.9,
        0.62,
        &ReportIndex::default(),
    );
    assert!(wrong_market.reason.unwrap().contains("ACTIVATION_MARKETS"));
}

#[test]
fn confidence_must_clear_policy_and_tier_thresholds() {
    let mut env = permissive_env(ActivationMode::Limited);
    env.min_confidence = 0.8;
    let below_policy = check_activation_gate(
        &env,
        "stub_live_platform",
        "1X2",
        0.5,
        0.62,
        &ReportIndex::default(),
    );
    assert!(below_policy.reason.unwrap().contains("policy minimum"));

    let below_tier = check_activation_gate(
        &env,
        "stub_live_platform",
        "1X2",
        0.7,
        0.62,
        &ReportIndex::default(),
    );
    assert!(below_tier.reason.unwrap().contains("activation minimum"));
}

#[test]
fn recent_alerts_block_activation() {
    let env = permissive_env(ActivationMode::Limited);
    let mut index = ReportIndex::default();
    index.live_shadow_analyze_runs.push(
        IndexEntry::new("lsa_9", "2025-10-01T09:00:00+00:00").with("alerts_count", json!(1)),
    );
    let decision =
        check_activation_gate(&env, "stub_live_platform", "1X2", 0.9, 0.62, &index);
    assert!(!decision.allowed);
    assert!(decision.reason.unwrap().contains("alert"));
}

#[test]
fn clean_limited_gate_allows() {
    let env = permissive_env(ActivationMode::Limited);
    let decision =
        check_activation_gate(&env, "stub_live_platform", "1X2", 0.9, 0.62, &ReportIndex::default());
    assert!(decision.allowed);
    assert!(decision.reason.is_none());
}

#[test]
fn batch_gate_enforces_tier_cap() {
    let mut env = permissive_env(ActivationMode::Expanded);
    env.max_matches = Some(2);
    let within = check_activation_gate_batch(&env, "stub_live_platform", 2, &ReportIndex::default());
    assert!(within.allowed);
    let over = check_activation_gate_batch(&env, "stub_live_platform", 3, &ReportIndex::default());
    assert!(over.reason.unwrap().contains("exceeds tier cap"));
}

#[test]
fn batch_gate_requires_a_cap_outside_burn_in() {
    let mut env = permissive_env(ActivationMode::Limited);
    env.max_matches = None;
    let decision =
        check_activation_gate_batch(&env, "stub_live_platform", 1, &ReportIndex::default());
    assert!(decision.reason.unwrap().contains("ACTIVATION_MAX_MATCHES"));
}

#[test]
fn burn_in_batch_dispatches_to_burn_in_rules() {
    let mut env = permissive_env(ActivationMode::BurnIn);
    env.connectors = Default::default();
    let over_cap = check_activation_gate_batch(&env, "real_provider", 4, &ReportIndex::default());
    assert!(over_cap.reason.unwrap().contains("Burn-in"));
}
