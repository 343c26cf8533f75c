//! Burn-in mode: the narrowest activation tier.
//!
//! One connector (`real_provider` unless whitelisted otherwise), one market
//! (`1X2` by default), stricter confidence, per-batch cap 1-3, and zero
//! tolerance for live-I/O alerts or recent shadow-analyze alerts.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::activation::gate::GateDecision;
use crate::activation::tiers::{
    ActivationEnv, ActivationMode, tier_max_matches, BURN_IN_MAX_MATCHES_MAX,
};
use crate::reports::index_store::ReportIndex;

/// Burn-in guardrail constants.
pub const BURN_IN_MAX_LIVE_IO_ALERTS: u64 = 0;
pub const BURN_IN_MAX_PICK_CHANGE_RATE: f64 = 0.1;
pub const BURN_IN_MAX_CONFIDENCE_DELTA_P95: f64 = 0.05;

fn default_connectors() -> BTreeSet<String> {
    ["real_provider".to_string()].into_iter().collect()
}

fn default_markets() -> BTreeSet<String> {
    ["1X2".to_string()].into_iter().collect()
}

/// Connector whitelist for burn-in: explicit env whitelist, else
/// real_provider only.
pub fn burn_in_connectors(env: &ActivationEnv) -> BTreeSet<String> {
    if env.connectors.is_empty() {
        default_connectors()
    } else {
        env.connectors.clone()
    }
}

/// Market whitelist for burn-in (default 1X2 only).
pub fn burn_in_markets(env: &ActivationEnv) -> BTreeSet<String> {
    if env.markets.is_empty() {
        default_markets()
    } else {
        env.markets.clone()
    }
}

/// Guardrail state attached to burn-in gate outcomes (for reporting).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BurnInGuardrailState {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl BurnInGuardrailState {
    fn set(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }
}

/// Deny activation when live-I/O alerts exceed the burn-in maximum (zero).
pub fn check_burn_in_live_io_alerts(alert_count: u64) -> GateDecision {
    if alert_count > BURN_IN_MAX_LIVE_IO_ALERTS {
        GateDecision::deny(format!(
            "Burn-in: live IO alerts {alert_count} exceeds max {BURN_IN_MAX_LIVE_IO_ALERTS}"
        ))
    } else {
        GateDecision::allow()
    }
}

/// Check the latest live-shadow-analyze run for burn-in guardrails.
pub fn check_burn_in_vs_recorded(
    index: &ReportIndex,
) -> (GateDecision, BurnInGuardrailState) {
    let mut state = BurnInGuardrailState::default();
    state.set("max_pick_change_rate", json!(BURN_IN_MAX_PICK_CHANGE_RATE));
    state.set(
        "max_confidence_delta_p95",
        json!(BURN_IN_MAX_CONFIDENCE_DELTA_P95),
    );

    match index.latest_analyze_alerts() {
        None => {
            state.set("latest_run_id", Value::Null);
            (GateDecision::allow(), state)
        }
        Some((run_id, alerts_count)) => {
            state.set("latest_run_id", json!(run_id));
            if alerts_count > 0 {
                (
                    GateDecision::deny(format!(
                        "Burn-in: latest live shadow analyze run has {alerts_count} alert(s)"
                    )),
                    state,
                )
            } else {
                (GateDecision::allow(), state)
            }
        }
    }
}

/// Burn-in gate for one decision.
pub fn check_burn_in_gate(
    env: &ActivationEnv,
    connector_name: &str,
    market: &str,
    confidence: f64,
    policy_min_confidence: f64,
    index: &ReportIndex,
) -> (GateDecision, BurnInGuardrailState) {
    let mut state = BurnInGuardrailState::default();
    state.set(
        "burn_in_confidence_gate",
        json!(env.burn_in_min_confidence),
    );

    let allowed_connectors = burn_in_connectors(env);
    if !allowed_connectors.contains(connector_name) {
        let list: Vec<&String> = allowed_connectors.iter().collect();
        return (
            GateDecision::deny(format!(
                "Burn-in: connector {connector_name:?} not allowed (whitelist: {list:?})"
            )),
            state,
        );
    }

    let allowed_markets = burn_in_markets(env);
    if !allowed_markets.contains(market) {
        let list: Vec<&String> = allowed_markets.iter().collect();
        return (
            GateDecision::deny(format!(
                "Burn-in: market {market:?} not in whitelist {list:?}"
            )),
            state,
        );
    }

    if confidence < policy_min_confidence {
        return (
            GateDecision::deny(format!(
                "Confidence {confidence:.3} below policy minimum {policy_min_confidence:.3}"
            )),
            state,
        );
    }
    if confidence < env.burn_in_min_confidence {
        return (
            GateDecision::deny(format!(
                "Burn-in: confidence {confidence:.3} below burn-in minimum {:.3}",
                env.burn_in_min_confidence
            )),
            state,
        );
    }

    let (guard, guard_state) = check_burn_in_vs_recorded(index);
    for (k, v) in guard_state.fields {
        state.set(&k, v);
    }
    if !guard.allowed {
        return (guard, state);
    }

    (GateDecision::allow(), state)
}

/// Burn-in batch gate: match count capped into [1, 3].
pub fn check_burn_in_gate_batch(
    env: &ActivationEnv,
    connector_name: &str,
    match_count: usize,
    index: &ReportIndex,
) -> (GateDecision, BurnInGuardrailState) {
    let mut state = BurnInGuardrailState::default();
    let max_matches = tier_max_matches(env, ActivationMode::BurnIn);
    state.set("burn_in_max_matches", json!(max_matches));

    if env.mode != Some(ActivationMode::BurnIn) {
        return (
            GateDecision::deny("ACTIVATION_MODE is not burn_in".to_string()),
            state,
        );
    }

    let allowed_connectors = burn_in_connectors(env);
    if !allowed_connectors.contains(connector_name) {
        return (
            GateDecision::deny(format!(
                "Burn-in: connector {connector_name:?} not allowed"
            )),
            state,
        );
    }

    debug_assert!(max_matches <= BURN_IN_MAX_MATCHES_MAX);
    if match_count as u32 > max_matches {
        return (
            GateDecision::deny(format!(
                "Burn-in: match count {match_count} exceeds max {max_matches}"
            )),
            state,
        );
    }

    let (guard, guard_state) = check_burn_in_vs_recorded(index);
    for (k, v) in guard_state.fields {
        state.set(&k, v);
    }
    if !guard.allowed {
        return (guard, state);
    }

    (GateDecision::allow(), state)
}

/// Burn-in configuration snapshot for reporting.
pub fn get_burn_in_config(env: &ActivationEnv) -> Value {
    json!({
        "is_burn_in_mode": env.mode == Some(ActivationMode::BurnIn),
        "burn_in_max_matches": tier_max_matches(env, ActivationMode::BurnIn),
        "burn_in_min_confidence": env.burn_in_min_confidence,
        "burn_in_connectors": burn_in_connectors(env).into_iter().collect::<Vec<_>>(),
        "burn_in_markets": burn_in_markets(env).into_iter().collect::<Vec<_>>(),
        "max_live_io_alerts": BURN_IN_MAX_LIVE_IO_ALERTS,
        "max_pick_change_rate_burn_in": BURN_IN_MAX_PICK_CHANGE_RATE,
        "max_confidence_delta_p95_burn_in": BURN_IN_MAX_CONFIDENCE_DELTA_P95,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::index_store::IndexEntry;
    use serde_json::json;

    fn burn_in_env() -> ActivationEnv {
        ActivationEnv {
            mode: Some(ActivationMode::BurnIn),
            ..ActivationEnv::default()
        }
    }

    #[test]
    fn default_whitelists_are_real_provider_and_1x2() {
        let env = ActivationEnv {
            connectors: BTreeSet::new(),
            ..burn_in_env()
        };
        assert!(burn_in_connectors(&env).contains("real_provider"));
        assert!(burn_in_markets(&env).contains("1X2"));
    }

    #[test]
    fn wrong_connector_is_denied() {
        let env = burn_in_env();
        let (decision, _) = check_burn_in_gate(
            &env,
            "stub_live_platform",
            "1X2",
            0.95,
            0.62,
            &ReportIndex::default(),
        );
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("connector"));
    }

    #[test]
    fn confidence_below_burn_in_minimum_is_denied() {
        let env = burn_in_env();
        let (decision, state) = check_burn_in_gate(
            &env,
            "real_provider",
            "1X2",
            0.80,
            0.62,
            &ReportIndex::default(),
        );
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("burn-in minimum"));
        assert_eq!(state.fields["burn_in_confidence_gate"], json!(0.85));
    }

    #[test]
    fn alerts_on_latest_analyze_run_deny_activation() {
        let mut index = ReportIndex::default();
        index.live_shadow_analyze_runs.push(
            IndexEntry::new("lsa_1", "2025-10-01T10:00:00+00:00").with("alerts_count", json!(2)),
        );
        let env = burn_in_env();
        let (decision, _) =
            check_burn_in_gate(&env, "real_provider", "1X2", 0.95, 0.62, &index);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("alert"));
    }

    #[test]
    fn batch_gate_caps_match_count_between_one_and_three() {
        let env = burn_in_env();
        let index = ReportIndex::default();
        let (allowed, _) = check_burn_in_gate_batch(&env, "real_provider", 1, &index);
        assert!(allowed.allowed);
        let (denied, _) = check_burn_in_gate_batch(&env, "real_provider", 4, &index);
        assert!(!denied.allowed);
    }

    #[test]
    fn clean_gate_passes_with_high_confidence() {
        let env = burn_in_env();
        let (decision, _) = check_burn_in_gate(
            &env,
            "real_provider",
            "1X2",
            0.9,
            0.62,
            &ReportIndex::default(),
        );
        assert!(decision.allowed);
    }
}
