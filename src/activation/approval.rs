//! Approval gate: the independent permission check in front of any real
//! activation workflow.
//!
//! Unlike the per-decision gates, this one returns a `Result`; a denial must
//! be matched by the caller and is never silently swallowed — every denial
//! emits a guardrail ops event before the error is returned.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::engine::policy::Policy;
use crate::ingestion::live_io::env_flag;
use crate::reports::index_store::ReportIndex;

/// Approval denial. The stable code is always `ACTIVATION_NOT_APPROVED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    Denied { reasons: Vec<String> },
}

impl ApprovalError {
    pub fn code(&self) -> &'static str {
        "ACTIVATION_NOT_APPROVED"
    }

    pub fn detail(&self) -> String {
        match self {
            Self::Denied { reasons } => reasons.join("; "),
        }
    }
}

impl std::fmt::Display for ApprovalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code(), self.detail())
    }
}

impl std::error::Error for ApprovalError {}

/// Environment inputs to the approval gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEnv {
    pub activation_allowed: bool,
    pub approval_token: Option<String>,
    pub min_offline_eval_runs: u64,
}

impl ApprovalEnv {
    pub fn from_env() -> Self {
        Self {
            activation_allowed: env_flag("ACTIVATION_ALLOWED"),
            approval_token: std::env::var("ACTIVATION_APPROVAL_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            min_offline_eval_runs: std::env::var("MIN_OFFLINE_EVAL_RUNS")
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0),
        }
    }
}

/// Caller-supplied approval context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalContext {
    pub approval_token: Option<String>,
    pub policy_version_pin: Option<String>,
    pub audit_trail_enabled: bool,
}

fn deny(reason: impl Into<String>) -> ApprovalError {
    let reason = reason.into();
    // Never let a denial be silently swallowed.
    error!(guardrail = "activation_not_approved", reason = %reason, "approval gate denied activation");
    ApprovalError::Denied {
        reasons: vec![reason],
    }
}

/// Require every approval condition; the first unmet condition denies.
///
/// Conditions, in order: ACTIVATION_ALLOWED truthy; approval token set and
/// matching; policy pin present and equal to the active policy version;
/// offline evaluation prerequisite met; audit trail present (flag or at
/// least one prior activation run in the index).
pub fn require_activation_approval(
    env: &ApprovalEnv,
    context: &ApprovalContext,
    active_policy: &Policy,
    index: &ReportIndex,
) -> Result<(), ApprovalError> {
    if !env.activation_allowed {
        return Err(deny("ACTIVATION_ALLOWED is not set or not truthy"));
    }

    let Some(expected_token) = env.approval_token.as_deref() else {
        return Err(deny("ACTIVATION_APPROVAL_TOKEN is not set"));
    };
    match context.approval_token.as_deref() {
        Some(supplied) if supplied == expected_token => {}
        Some(_) => return Err(deny("approval token does not match ACTIVATION_APPROVAL_TOKEN")),
        None => return Err(deny("approval token missing from context")),
    }

    let Some(pin) = context.policy_version_pin.as_deref() else {
        return Err(deny("policy_version_pin missing from context"));
    };
    if pin != active_policy.meta.version {
        return Err(deny(format!(
            "policy_version_pin {pin:?} does not match active policy version {:?}",
            active_policy.meta.version
        )));
    }

    let offline_eval_runs = index.runs.len() as u64;
    if offline_eval_runs < env.min_offline_eval_runs {
        return Err(deny(format!(
            "offline_eval_runs {offline_eval_runs} below MIN_OFFLINE_EVAL_RUNS {}",
            env.min_offline_eval_runs
        )));
    }

    // Audit-trail condition: "history exists" means at least one prior
    // activation run, unless the caller explicitly carries the audit flag.
    if !context.audit_trail_enabled && index.activation_runs.is_empty() {
        return Err(deny(
            "audit trail not enabled and no prior activation_runs in index",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::index_store::IndexEntry;

    fn approving_env() -> ApprovalEnv {
        ApprovalEnv {
            activation_allowed: true,
            approval_token: Some("secret123".to_string()),
            min_offline_eval_runs: 0,
        }
    }

    fn context_with_pin(pin: &str) -> ApprovalContext {
        ApprovalContext {
            approval_token: Some("secret123".to_string()),
            policy_version_pin: Some(pin.to_string()),
            audit_trail_enabled: true,
        }
    }

    fn index_with_history() -> ReportIndex {
        let mut index = ReportIndex::default();
        index
            .runs
            .push(IndexEntry::new("r1", "2025-10-01T10:00:00+00:00"));
        index
            .activation_runs
            .push(IndexEntry::new("a1", "2025-10-01T11:00:00+00:00"));
        index
    }

    #[test]
    fn default_denied_without_activation_allowed() {
        let env = ApprovalEnv::default();
        let policy = Policy::bootstrap_default();
        let err = require_activation_approval(
            &env,
            &context_with_pin(&policy.meta.version),
            &policy,
            &ReportIndex::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "ACTIVATION_NOT_APPROVED");
        assert!(err.detail().contains("ACTIVATION_ALLOWED"));
    }

    #[test]
    fn denied_when_token_missing_or_mismatched() {
        let policy = Policy::bootstrap_default();
        let index = index_with_history();

        let mut env = approving_env();
        env.approval_token = None;
        let err = require_activation_approval(
            &env,
            &context_with_pin(&policy.meta.version),
            &policy,
            &index,
        )
        .unwrap_err();
        assert!(err.detail().contains("APPROVAL_TOKEN"));

        let env = approving_env();
        let mut context = context_with_pin(&policy.meta.version);
        context.approval_token = Some("wrong".to_string());
        let err = require_activation_approval(&env, &context, &policy, &index).unwrap_err();
        assert!(err.detail().to_lowercase().contains("token"));
    }

    #[test]
    fn denied_when_policy_pin_missing_or_stale() {
        let policy = Policy::bootstrap_default();
        let index = index_with_history();
        let env = approving_env();

        let mut context = context_with_pin(&policy.meta.version);
        context.policy_version_pin = None;
        let err = require_activation_approval(&env, &context, &policy, &index).unwrap_err();
        assert!(err.detail().contains("policy_version_pin"));

        let err = require_activation_approval(
            &env,
            &context_with_pin("wrong-version-xyz"),
            &policy,
            &index,
        )
        .unwrap_err();
        assert!(err.detail().contains("policy_version_pin"));
    }

    #[test]
    fn denied_when_offline_eval_prerequisite_unmet() {
        let policy = Policy::bootstrap_default();
        let mut env = approving_env();
        env.min_offline_eval_runs = 1_000;
        let err = require_activation_approval(
            &env,
            &context_with_pin(&policy.meta.version),
            &policy,
            &index_with_history(),
        )
        .unwrap_err();
        assert!(err.detail().contains("MIN_OFFLINE_EVAL_RUNS"));
    }

    #[test]
    fn denied_without_audit_trail_or_history() {
        let policy = Policy::bootstrap_default();
        let env = approving_env();
        let mut context = context_with_pin(&policy.meta.version);
        context.audit_trail_enabled = false;
        let mut index = ReportIndex::default();
        index
            .runs
            .push(IndexEntry::new("r1", "2025-10-01T10:00:00+00:00"));
        let err = require_activation_approval(&env, &context, &policy, &index).unwrap_err();
        assert!(err.detail().to_lowercase().contains("audit"));
    }

    #[test]
    fn allowed_when_all_conditions_hold() {
        let policy = Policy::bootstrap_default();
        let env = approving_env();
        let result = require_activation_approval(
            &env,
            &context_with_pin(&policy.meta.version),
            &policy,
            &index_with_history(),
        );
        assert!(result.is_ok());
    }
}
