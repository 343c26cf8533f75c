//! Activation control plane: per-decision gates, burn-in tightening, tiers
//! with rollout and daily cap, the approval gate, and audit records.
//!
//! Everything here decides whether a computed decision may be persisted;
//! nothing here computes decisions.

pub mod approval;
pub mod audit;
pub mod burn_in;
pub mod gate;
pub mod tiers;

#[cfg(test)]
mod gate_tests;

pub use approval::{require_activation_approval, ApprovalContext, ApprovalEnv, ApprovalError};
pub use audit::{build_activation_audit, ActivationAudit};
pub use burn_in::{
    check_burn_in_gate, check_burn_in_gate_batch, check_burn_in_live_io_alerts,
    check_burn_in_vs_recorded, get_burn_in_config,
};
pub use gate::{
    check_activation_gate, check_activation_gate_batch, check_live_shadow_guardrails,
    get_activation_config, GateDecision, GUARDRAIL_SCAN_RUNS,
};
pub use tiers::{
    daily_cap_remaining, get_tier_config, select_rollout_match_ids, tier_max_matches,
    tier_min_confidence, ActivationEnv, ActivationMode, TierConfig,
    ACTIVATION_MAX_MATCHES_HARD_CAP,
};
