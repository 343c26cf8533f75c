//! Decision policy: the knobs the analyzer and activation gate read.
//!
//! The active policy is loaded from a versioned JSON file; applying a tuner
//! proposal is an operator step outside this crate. Policies are read-only
//! during a run.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::analyzer::DEFAULT_MIN_CONFIDENCE;
use crate::engine::canonical::sha256_canonical;
use crate::engine::contracts::Market;

/// Lowest permitted reason dampening factor.
pub const DAMPENING_FLOOR: f64 = 0.5;

/// Policy metadata. `created_at_utc` is volatile and excluded from checksums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyMeta {
    pub version: String,
    pub created_at_utc: String,
    #[serde(default)]
    pub notes: String,
}

/// Per-market knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPolicy {
    pub min_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_bands: Option<Vec<f64>>,
}

/// Per-reason-code knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReasonPolicy {
    pub dampening_factor: f64,
}

/// The active policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub meta: PolicyMeta,
    pub markets: BTreeMap<String, MarketPolicy>,
    #[serde(default)]
    pub reasons: BTreeMap<String, ReasonPolicy>,
}

/// Policy validation failure.
#[derive(Debug)]
pub enum PolicyError {
    MinConfidenceOutOfRange { market: String, value: f64 },
    DampeningOutOfRange { reason_code: String, value: f64 },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MinConfidenceOutOfRange { market, value } => {
                write!(f, "market {market}: min_confidence {value} outside [0,1]")
            }
            Self::DampeningOutOfRange { reason_code, value } => write!(
                f,
                "reason {reason_code}: dampening_factor {value} outside [{DAMPENING_FLOOR},1]"
            ),
        }
    }
}

impl std::error::Error for PolicyError {}

impl Policy {
    /// Bootstrap policy used when no policy file exists yet.
    pub fn bootstrap_default() -> Self {
        let mut markets = BTreeMap::new();
        for market in Market::ALL {
            markets.insert(
                market.as_str().to_string(),
                MarketPolicy {
                    min_confidence: DEFAULT_MIN_CONFIDENCE,
                    confidence_bands: None,
                },
            );
        }
        Self {
            meta: PolicyMeta {
                version: "v2.0.0".to_string(),
                created_at_utc: String::new(),
                notes: "bootstrap default".to_string(),
            },
            markets,
            reasons: BTreeMap::new(),
        }
    }

    /// Validate the documented ranges.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for (market, mp) in &self.markets {
            if !(0.0..=1.0).contains(&mp.min_confidence) {
                return Err(PolicyError::MinConfidenceOutOfRange {
                    market: market.clone(),
                    value: mp.min_confidence,
                });
            }
        }
        for (code, rp) in &self.reasons {
            if !(DAMPENING_FLOOR..=1.0).contains(&rp.dampening_factor) {
                return Err(PolicyError::DampeningOutOfRange {
                    reason_code: code.clone(),
                    value: rp.dampening_factor,
                });
            }
        }
        Ok(())
    }

    /// Minimum confidence for one market, falling back to the default.
    pub fn min_confidence_for(&self, market: Market) -> f64 {
        self.markets
            .get(market.as_str())
            .map(|m| m.min_confidence)
            .unwrap_or(DEFAULT_MIN_CONFIDENCE)
    }
}

/// Effective run-level minimum confidence: the lowest market threshold, so
/// soft gates never pass a decision its own market would refuse.
pub fn min_confidence_from_policy(policy: &Policy) -> f64 {
    let min = policy
        .markets
        .values()
        .map(|m| m.min_confidence)
        .fold(f64::INFINITY, f64::min);
    if min.is_finite() {
        min.clamp(0.0, 1.0)
    } else {
        DEFAULT_MIN_CONFIDENCE
    }
}

/// Load the active policy from a JSON file. Missing or malformed files fall
/// back to the bootstrap default (with a warning) rather than aborting a run.
pub fn load_active_policy(path: Option<&Path>) -> Policy {
    let Some(path) = path else {
        return Policy::bootstrap_default();
    };
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<Policy>(&raw) {
            Ok(policy) => match policy.validate() {
                Ok(()) => policy,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "active policy invalid; using bootstrap default");
                    Policy::bootstrap_default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "active policy unreadable; using bootstrap default");
                Policy::bootstrap_default()
            }
        },
        Err(_) => Policy::bootstrap_default(),
    }
}

/// Policy checksum with the volatile `meta.created_at_utc` excluded, so two
/// identical policies written at different times hash identically.
pub fn policy_checksum(policy: &Policy) -> String {
    let mut clean = policy.clone();
    clean.meta.created_at_utc = String::new();
    sha256_canonical(&clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_policy_validates() {
        let policy = Policy::bootstrap_default();
        assert!(policy.validate().is_ok());
        assert_eq!(min_confidence_from_policy(&policy), DEFAULT_MIN_CONFIDENCE);
    }

    #[test]
    fn out_of_range_knobs_are_rejected() {
        let mut policy = Policy::bootstrap_default();
        policy
            .markets
            .insert("1X2".to_string(), MarketPolicy { min_confidence: 1.2, confidence_bands: None });
        assert!(policy.validate().is_err());

        let mut policy = Policy::bootstrap_default();
        policy.reasons.insert(
            "H2H_USED".to_string(),
            ReasonPolicy { dampening_factor: 0.2 },
        );
        assert!(policy.validate().is_err());
    }

    #[test]
    fn checksum_ignores_created_at() {
        let mut a = Policy::bootstrap_default();
        a.meta.created_at_utc = "2025-10-01T00:00:00+00:00".to_string();
        let mut b = Policy::bootstrap_default();
        b.meta.created_at_utc = "2026-01-01T00:00:00+00:00".to_string();
        assert_eq!(policy_checksum(&a), policy_checksum(&b));

        b.markets
            .get_mut("1X2")
            .map(|m| m.min_confidence = 0.7)
            .unwrap();
        assert_ne!(policy_checksum(&a), policy_checksum(&b));
    }

    #[test]
    fn missing_policy_file_falls_back_to_bootstrap() {
        let policy = load_active_policy(Some(Path::new("/nonexistent/policy.json")));
        assert_eq!(policy, Policy::bootstrap_default());
    }
}
