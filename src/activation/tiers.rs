//! Activation tiers, deterministic rollout selection, and the daily cap.
//!
//! The environment is parsed once into `ActivationEnv` and passed explicitly
//! so gates stay pure and testable. Burn-in is the narrowest tier; limited
//! and expanded share the env-driven cap under a hard ceiling.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingestion::live_io::env_flag;
use crate::reports::index_store::ReportIndex;

/// Hard ceiling on matches per activated batch, regardless of tier or env.
pub const ACTIVATION_MAX_MATCHES_HARD_CAP: u32 = 10;

/// Burn-in match caps.
pub const BURN_IN_MAX_MATCHES_MIN: u32 = 1;
pub const BURN_IN_MAX_MATCHES_MAX: u32 = 3;
pub const BURN_IN_MAX_MATCHES_DEFAULT: u32 = 1;

/// Default tier min confidence (limited / expanded).
pub const DEFAULT_TIER_MIN_CONFIDENCE: f64 = 0.80;
/// Default burn-in min confidence (stricter).
pub const DEFAULT_BURN_IN_MIN_CONFIDENCE: f64 = 0.85;

/// Activation mode / tier vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    Limited,
    BurnIn,
    Expanded,
}

impl ActivationMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "limited" => Some(Self::Limited),
            "burn_in" => Some(Self::BurnIn),
            "expanded" => Some(Self::Expanded),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Limited => "limited",
            Self::BurnIn => "burn_in",
            Self::Expanded => "expanded",
        }
    }
}

/// Parsed activation environment. Gates never read `std::env` directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationEnv {
    pub kill_switch: bool,
    pub enabled: bool,
    pub mode: Option<ActivationMode>,
    pub mode_raw: String,
    pub tier: Option<ActivationMode>,
    pub live_writes_allowed: bool,
    pub live_io_allowed: bool,
    /// Connector whitelist; empty means unrestricted (outside burn-in).
    pub connectors: BTreeSet<String>,
    /// Market whitelist; defaults to 1X2 when unset.
    pub markets: BTreeSet<String>,
    pub max_matches: Option<u32>,
    pub min_confidence: f64,
    pub burn_in_min_confidence: f64,
    pub rollout_pct: f64,
    /// 0 means unlimited.
    pub daily_max_activations: u64,
}

impl Default for ActivationEnv {
    fn default() -> Self {
        Self {
            kill_switch: false,
            enabled: false,
            mode: None,
            mode_raw: String::new(),
            tier: None,
            live_writes_allowed: false,
            live_io_allowed: false,
            connectors: BTreeSet::new(),
            markets: ["1X2".to_string()].into_iter().collect(),
            max_matches: None,
            min_confidence: DEFAULT_TIER_MIN_CONFIDENCE,
            burn_in_min_confidence: DEFAULT_BURN_IN_MIN_CONFIDENCE,
            rollout_pct: 100.0,
            daily_max_activations: 0,
        }
    }
}

impl ActivationEnv {
    pub fn from_env() -> Self {
        let csv_set = |name: &str| -> BTreeSet<String> {
            std::env::var(name)
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        let parse_f64 = |name: &str, default: f64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.trim().parse::<f64>().ok())
                .unwrap_or(default)
        };

        let mode_raw = std::env::var("ACTIVATION_MODE").unwrap_or_default();
        let markets = {
            let set = csv_set("ACTIVATION_MARKETS");
            if set.is_empty() {
                ["1X2".to_string()].into_iter().collect()
            } else {
                set
            }
        };

        Self {
            kill_switch: env_flag("ACTIVATION_KILL_SWITCH"),
            enabled: env_flag("ACTIVATION_ENABLED"),
            mode: ActivationMode::parse(&mode_raw),
            mode_raw: mode_raw.trim().to_ascii_lowercase(),
            tier: std::env::var("ACTIVATION_TIER")
                .ok()
                .and_then(|v| ActivationMode::parse(&v)),
            live_writes_allowed: env_flag("LIVE_WRITES_ALLOWED"),
            live_io_allowed: env_flag("LIVE_IO_ALLOWED"),
            connectors: csv_set("ACTIVATION_CONNECTORS"),
            markets,
            max_matches: std::env::var("ACTIVATION_MAX_MATCHES")
                .ok()
                .and_then(|v| v.trim().parse::<u32>().ok()),
            min_confidence: parse_f64("ACTIVATION_MIN_CONFIDENCE", DEFAULT_TIER_MIN_CONFIDENCE),
            burn_in_min_confidence: parse_f64(
                "ACTIVATION_MIN_CONFIDENCE_BURN_IN",
                DEFAULT_BURN_IN_MIN_CONFIDENCE,
            ),
            rollout_pct: parse_f64("ACTIVATION_ROLLOUT_PCT", 100.0),
            daily_max_activations: std::env::var("ACTIVATION_DAILY_MAX_ACTIVATIONS")
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0),
        }
    }

    /// Effective tier: ACTIVATION_TIER, falling back to the mode.
    pub fn effective_tier(&self) -> Option<ActivationMode> {
        self.tier.or(self.mode)
    }
}

/// Max matches for a tier: burn-in clamps into [1, 3]; limited/expanded use
/// the env cap (0 when unset) under the hard ceiling.
pub fn tier_max_matches(env: &ActivationEnv, tier: ActivationMode) -> u32 {
    match tier {
        ActivationMode::BurnIn => env
            .max_matches
            .unwrap_or(BURN_IN_MAX_MATCHES_DEFAULT)
            .clamp(BURN_IN_MAX_MATCHES_MIN, BURN_IN_MAX_MATCHES_MAX),
        ActivationMode::Limited | ActivationMode::Expanded => env
            .max_matches
            .unwrap_or(0)
            .min(ACTIVATION_MAX_MATCHES_HARD_CAP),
    }
}

/// Tier min confidence: burn-in uses the stricter burn-in knob.
pub fn tier_min_confidence(env: &ActivationEnv, tier: ActivationMode) -> f64 {
    match tier {
        ActivationMode::BurnIn => env.burn_in_min_confidence,
        ActivationMode::Limited | ActivationMode::Expanded => env.min_confidence,
    }
}

/// Deterministic rollout subset: the first `round(n * pct / 100)` ids of the
/// lexicographically sorted list.
pub fn select_rollout_match_ids(match_ids: &[String], rollout_pct: f64) -> BTreeSet<String> {
    if rollout_pct <= 0.0 || match_ids.is_empty() {
        return BTreeSet::new();
    }
    let mut sorted: Vec<&String> = match_ids.iter().collect();
    sorted.sort();
    if rollout_pct >= 100.0 {
        return sorted.into_iter().cloned().collect();
    }
    let take = (sorted.len() as f64 * rollout_pct / 100.0).round() as usize;
    sorted.into_iter().take(take).cloned().collect()
}

/// Remaining daily activations. `None` when the cap is unlimited.
pub fn daily_cap_remaining(
    env: &ActivationEnv,
    index: &ReportIndex,
    now_utc: DateTime<Utc>,
) -> Option<u64> {
    if env.daily_max_activations == 0 {
        return None;
    }
    let used = index.daily_activations_used(now_utc);
    Some(env.daily_max_activations.saturating_sub(used))
}

/// Tier configuration snapshot for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    pub tier: String,
    pub max_matches: u32,
    pub min_confidence: f64,
    pub rollout_pct: f64,
    pub daily_max_activations: u64,
    pub blocks_on_critical_alerts: bool,
}

pub fn get_tier_config(env: &ActivationEnv) -> TierConfig {
    let tier = env.effective_tier().unwrap_or(ActivationMode::BurnIn);
    TierConfig {
        tier: tier.as_str().to_string(),
        max_matches: tier_max_matches(env, tier),
        min_confidence: tier_min_confidence(env, tier),
        rollout_pct: env.rollout_pct,
        daily_max_activations: env.daily_max_activations,
        // Every tier refuses to activate over unresolved critical alerts.
        blocks_on_critical_alerts: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::index_store::IndexEntry;
    use chrono::TimeZone;
    use serde_json::json;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rollout_zero_pct_is_empty_and_full_pct_is_all() {
        assert!(select_rollout_match_ids(&ids(&["a", "b", "c"]), 0.0).is_empty());
        assert_eq!(
            select_rollout_match_ids(&ids(&["a", "b", "c"]), 100.0).len(),
            3
        );
        assert_eq!(
            select_rollout_match_ids(&ids(&["a", "b", "c"]), 150.0).len(),
            3
        );
    }

    #[test]
    fn rollout_takes_first_half_of_sorted_ids() {
        let selected = select_rollout_match_ids(&ids(&["d", "a", "c", "b"]), 50.0);
        assert_eq!(
            selected,
            ["a".to_string(), "b".to_string()].into_iter().collect()
        );
    }

    #[test]
    fn rollout_rounds_the_subset_size() {
        let selected = select_rollout_match_ids(&ids(&["a", "b", "c"]), 33.0);
        assert_eq!(selected.len(), 1);
        assert!(selected.contains("a"));

        let quarter = select_rollout_match_ids(&ids(&["x", "y", "z", "w"]), 25.0);
        assert_eq!(quarter.len(), 1);
        assert!(quarter.contains("w"));
    }

    #[test]
    fn burn_in_matches_clamp_to_three() {
        let env = ActivationEnv {
            max_matches: Some(10),
            ..ActivationEnv::default()
        };
        assert_eq!(tier_max_matches(&env, ActivationMode::BurnIn), 3);

        let unset = ActivationEnv::default();
        assert_eq!(tier_max_matches(&unset, ActivationMode::BurnIn), 1);
    }

    #[test]
    fn limited_and_expanded_respect_env_and_hard_cap() {
        let env = ActivationEnv {
            max_matches: Some(5),
            ..ActivationEnv::default()
        };
        assert_eq!(tier_max_matches(&env, ActivationMode::Limited), 5);
        let big = ActivationEnv {
            max_matches: Some(20),
            ..ActivationEnv::default()
        };
        assert_eq!(
            tier_max_matches(&big, ActivationMode::Expanded),
            ACTIVATION_MAX_MATCHES_HARD_CAP
        );
    }

    #[test]
    fn tier_min_confidence_selects_the_right_knob() {
        let env = ActivationEnv {
            min_confidence: 0.72,
            burn_in_min_confidence: 0.88,
            ..ActivationEnv::default()
        };
        assert_eq!(tier_min_confidence(&env, ActivationMode::Limited), 0.72);
        assert_eq!(tier_min_confidence(&env, ActivationMode::BurnIn), 0.88);
    }

    #[test]
    fn daily_cap_remaining_counts_todays_activations() {
        let now = Utc.with_ymd_and_hms(2025, 10, 1, 15, 0, 0).unwrap();
        let mut index = ReportIndex::default();
        index.activation_runs.push(
            IndexEntry::new("a", "2025-10-01T12:00:00+00:00")
                .with("activated", json!(true))
                .with("activated_count", json!(2)),
        );
        let env = ActivationEnv {
            daily_max_activations: 2,
            ..ActivationEnv::default()
        };
        assert_eq!(daily_cap_remaining(&env, &index, now), Some(0));

        let unlimited = ActivationEnv::default();
        assert_eq!(daily_cap_remaining(&unlimited, &index, now), None);
    }
}
