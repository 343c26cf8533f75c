//! Multi-layer activation gate.
//!
//! Layers run in a strict order and the first failure terminates with a
//! denial reason. Denials are data, not errors: runners keep operating in
//! shadow mode. Only the separate approval gate returns a `Result`.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::activation::burn_in::{
    check_burn_in_gate, check_burn_in_gate_batch, get_burn_in_config,
};
use crate::activation::tiers::{
    get_tier_config, tier_max_matches, tier_min_confidence, ActivationEnv, ActivationMode,
};
use crate::reports::index_store::ReportIndex;

/// Live-shadow-analyze runs scanned for unresolved alerts before activating.
pub const GUARDRAIL_SCAN_RUNS: usize = 5;

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Abstract readiness checks (DB connectivity, cache health). The deployment
/// wires real probes in; the default is ready.
pub fn check_readiness() -> GateDecision {
    GateDecision::allow()
}

/// Recent live-shadow runs must not carry unresolved alerts.
pub fn check_live_shadow_guardrails(index: &ReportIndex) -> GateDecision {
    for (run_id, alerts_count) in index.recent_analyze_alerts(GUARDRAIL_SCAN_RUNS) {
        if alerts_count > 0 {
            return GateDecision::deny(format!(
                "Recent live shadow run {run_id} has {alerts_count} alert(s)"
            ));
        }
    }
    GateDecision::allow()
}

fn common_env_gates(env: &ActivationEnv) -> Option<GateDecision> {
    if env.kill_switch {
        return Some(GateDecision::deny("ACTIVATION_KILL_SWITCH is enabled"));
    }
    if !env.enabled {
        return Some(GateDecision::deny("ACTIVATION_ENABLED is not set"));
    }
    if env.mode.is_none() {
        return Some(GateDecision::deny(format!(
            "ACTIVATION_MODE must be 'limited', 'burn_in', or 'expanded' (got {:?})",
            env.mode_raw
        )));
    }
    if !env.live_writes_allowed {
        return Some(GateDecision::deny("LIVE_WRITES_ALLOWED is not set"));
    }
    if env.mode == Some(ActivationMode::BurnIn) && !env.live_io_allowed {
        return Some(GateDecision::deny(
            "LIVE_IO_ALLOWED is not set (required for burn-in)",
        ));
    }
    None
}

/// Per-decision activation gate.
pub fn check_activation_gate(
    env: &ActivationEnv,
    connector_name: &str,
    market: &str,
    confidence: f64,
    policy_min_confidence: f64,
    index: &ReportIndex,
) -> GateDecision {
    if let Some(denied) = common_env_gates(env) {
        return denied;
    }

    let mode = match env.mode {
        Some(mode) => mode,
        None => return GateDecision::deny("ACTIVATION_MODE is not set"),
    };

    if mode == ActivationMode::BurnIn {
        let (decision, _state) = check_burn_in_gate(
            env,
            connector_name,
            market,
            confidence,
            policy_min_confidence,
            index,
        );
        return decision;
    }

    let ready = check_readiness();
    if !ready.allowed {
        return GateDecision::deny(format!(
            "Readiness check failed: {}",
            ready.reason.unwrap_or_default()
        ));
    }

    if !env.connectors.is_empty() && !env.connectors.contains(connector_name) {
        return GateDecision::deny(format!(
            "Connector {connector_name:?} not in ACTIVATION_CONNECTORS whitelist"
        ));
    }

    if !env.markets.contains(market) {
        return GateDecision::deny(format!(
            "Market {market:?} not in ACTIVATION_MARKETS whitelist"
        ));
    }

    if confidence < policy_min_confidence {
        return GateDecision::deny(format!(
            "Confidence {confidence:.3} below policy minimum {policy_min_confidence:.3}"
        ));
    }
    let tier_min = tier_min_confidence(env, mode);
    if tier_min > 0.0 && confidence < tier_min {
        return GateDecision::deny(format!(
            "Confidence {confidence:.3} below activation minimum {tier_min:.3}"
        ));
    }

    let guardrails = check_live_shadow_guardrails(index);
    if !guardrails.allowed {
        return GateDecision::deny(format!(
            "Live shadow guardrails check failed: {}",
            guardrails.reason.unwrap_or_default()
        ));
    }

    GateDecision::allow()
}

/// Batch-level activation gate (applied before the per-decision loop).
pub fn check_activation_gate_batch(
    env: &ActivationEnv,
    connector_name: &str,
    match_count: usize,
    index: &ReportIndex,
) -> GateDecision {
    if let Some(denied) = common_env_gates(env) {
        return denied;
    }

    let mode = match env.mode {
        Some(mode) => mode,
        None => return GateDecision::deny("ACTIVATION_MODE is not set"),
    };

    if mode == ActivationMode::BurnIn {
        let (decision, _state) = check_burn_in_gate_batch(env, connector_name, match_count, index);
        return decision;
    }

    if !env.connectors.is_empty() && !env.connectors.contains(connector_name) {
        return GateDecision::deny(format!(
            "Connector {connector_name:?} not in ACTIVATION_CONNECTORS whitelist"
        ));
    }

    let max_matches = tier_max_matches(env, mode);
    if max_matches == 0 {
        return GateDecision::deny(
            "ACTIVATION_MAX_MATCHES not set or 0 (required for limited/expanded)",
        );
    }
    if match_count as u32 > max_matches {
        return GateDecision::deny(format!(
            "Match count {match_count} exceeds tier cap ACTIVATION_MAX_MATCHES={max_matches}"
        ));
    }

    let ready = check_readiness();
    if !ready.allowed {
        return GateDecision::deny(format!(
            "Readiness check failed: {}",
            ready.reason.unwrap_or_default()
        ));
    }

    let guardrails = check_live_shadow_guardrails(index);
    if !guardrails.allowed {
        return GateDecision::deny(format!(
            "Live shadow guardrails check failed: {}",
            guardrails.reason.unwrap_or_default()
        ));
    }

    GateDecision::allow()
}

/// Current activation configuration (for reporting).
pub fn get_activation_config(env: &ActivationEnv) -> serde_json::Value {
    let mut config = json!({
        "kill_switch_active": env.kill_switch,
        "activation_enabled": env.enabled,
        "activation_mode": env.mode.map(|m| m.as_str()).unwrap_or(""),
        "activation_tier": env.effective_tier().map(|m| m.as_str()).unwrap_or("burn_in"),
        "live_writes_allowed": env.live_writes_allowed,
        "allowed_connectors": env.connectors.iter().collect::<Vec<_>>(),
        "allowed_markets": env.markets.iter().collect::<Vec<_>>(),
        "tier_config": get_tier_config(env),
        "rollout_pct": env.rollout_pct,
        "daily_max_activations": env.daily_max_activations,
    });
    if env.mode == Some(ActivationMode::BurnIn) {
        if let Some(map) = config.as_object_mut() {
            map.insert("burn_in".to_string(), get_burn_in_config(env));
        }
    }
    config
}
