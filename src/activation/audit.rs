//! Activation audit records: one per decision considered for activation,
//! whether or not the gate allowed it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::canonical::iso_utc;
use crate::engine::contracts::Decision;

/// One activation audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationAudit {
    pub connector_name: String,
    pub match_id: String,
    pub market: String,
    pub decision_kind: String,
    pub confidence: f64,
    pub reasons: Vec<String>,
    pub activation_allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_reason: Option<String>,
    pub created_at_utc: String,
}

/// Build the audit record for one considered decision.
pub fn build_activation_audit(
    connector_name: &str,
    match_id: &str,
    decision: &Decision,
    activation_allowed: bool,
    activation_reason: Option<String>,
    now_utc: DateTime<Utc>,
) -> ActivationAudit {
    ActivationAudit {
        connector_name: connector_name.to_string(),
        match_id: match_id.to_string(),
        market: decision.market.clone(),
        decision_kind: decision.decision.as_str().to_string(),
        confidence: decision.confidence.unwrap_or(0.0),
        reasons: decision.reasons.clone(),
        activation_allowed,
        activation_reason,
        created_at_utc: iso_utc(now_utc),
    }
}
