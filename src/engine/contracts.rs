//! Analyzer v2 decision contract: markets, decision kinds, flags, gate ids,
//! and the thresholds that drive gate behavior.
//!
//! The vocabularies here are closed. New entries are additive; existing ones
//! are never renamed, because persisted rows and report bundles carry them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Analyzer version tag emitted on every result.
pub const ANALYZER_VERSION_V2: &str = "v2";
/// Policy version stamped on decisions when the active policy has no version.
pub const POLICY_VERSION_V2: &str = "v2.0.0";
/// Hard cap on free-text reasons per decision.
pub const MAX_DECISION_REASONS: usize = 10;

// Conflict handling thresholds.
/// consensus_quality below this blocks the market (NO_PREDICTION).
pub const CONFLICT_T1_BLOCK: f64 = 0.4;
/// consensus_quality below this downgrades unless confidence overrides.
pub const CONFLICT_T2_DOWNGRADE: f64 = 0.65;
/// PLAY allowed in [T1, T2) only when confidence reaches this.
pub const OVERRIDE_CONFIDENCE_WHEN_BELOW_T2: f64 = 0.78;

/// Evidence quality below this is a hard gate failure.
pub const THRESHOLD_EVIDENCE_QUALITY: f64 = 0.5;
/// Minor-flag count at or above this downgrades to NO_BET.
pub const MAX_MINOR_FLAGS_BEFORE_NO_BET: usize = 2;

/// Canonical decision outcome per market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    Play,
    NoBet,
    NoPrediction,
}

impl DecisionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Play => "PLAY",
            Self::NoBet => "NO_BET",
            Self::NoPrediction => "NO_PREDICTION",
        }
    }
}

/// Markets supported by analyzer v2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "1X2")]
    OneXTwo,
    #[serde(rename = "OU_2.5")]
    Ou25,
    #[serde(rename = "BTTS")]
    Btts,
}

impl Market {
    pub const ALL: [Market; 3] = [Market::OneXTwo, Market::Ou25, Market::Btts];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneXTwo => "1X2",
            Self::Ou25 => "OU_2.5",
            Self::Btts => "BTTS",
        }
    }

    /// Parse a market name, accepting historical spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1X2" => Some(Self::OneXTwo),
            "OU_2.5" | "OU25" | "OU_25" => Some(Self::Ou25),
            "BTTS" | "GGNG" => Some(Self::Btts),
            _ => None,
        }
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selection vocabulary across all markets. Only present when the decision is
/// PLAY; the market constrains which variants are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Selection {
    Home,
    Draw,
    Away,
    Over,
    Under,
    Yes,
    No,
}

impl Selection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "HOME",
            Self::Draw => "DRAW",
            Self::Away => "AWAY",
            Self::Over => "OVER",
            Self::Under => "UNDER",
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }
}

/// Controlled vocabulary for decision and run-level flags.
pub mod flags {
    pub const DATA_SPARSE: &str = "DATA_SPARSE";
    pub const SOURCE_CONFLICT: &str = "SOURCE_CONFLICT";
    pub const SIGNAL_CONTRADICTION: &str = "SIGNAL_CONTRADICTION";
    pub const LOW_QUALITY_EVIDENCE: &str = "LOW_QUALITY_EVIDENCE";
    pub const OUTLIER_DETECTED: &str = "OUTLIER_DETECTED";
    pub const SMALL_SAMPLE: &str = "SMALL_SAMPLE";
    pub const STALE_DATA: &str = "STALE_DATA";
    pub const MISSING_KEY_FEATURES: &str = "MISSING_KEY_FEATURES";
    pub const CONSENSUS_WEAK: &str = "CONSENSUS_WEAK";
    pub const MARKET_NOT_SUPPORTED: &str = "MARKET_NOT_SUPPORTED";
    pub const INTERNAL_GUARDRAIL_TRIGGERED: &str = "INTERNAL_GUARDRAIL_TRIGGERED";
    // Resolver-derived (mapped when the resolver outcome is not RESOLVED).
    pub const AMBIGUOUS: &str = "AMBIGUOUS";
    pub const NOT_FOUND: &str = "NOT_FOUND";
}

/// Identifiers for quality gates in `analysis_run.gate_results`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateId {
    Resolver,
    MissingKeyFeatures,
    EvidenceQuality,
    SourceConflict,
    SignalContradiction,
    MarketSupported,
    SoftBorderlineConfidence,
    SoftMinorFlags,
}

/// One gate outcome, serializable into the analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate_id: GateId,
    pub pass: bool,
    pub notes: String,
}

impl GateResult {
    pub fn passed(gate_id: GateId, notes: impl Into<String>) -> Self {
        Self {
            gate_id,
            pass: true,
            notes: notes.into(),
        }
    }

    pub fn failed(gate_id: GateId, notes: impl Into<String>) -> Self {
        Self {
            gate_id,
            pass: false,
            notes: notes.into(),
        }
    }
}

/// Per-market decision.
///
/// `market` is the requested market label so unsupported requests still get a
/// decision row. `selection` and `confidence` are present if and only if the
/// decision is PLAY (`confidence` is additionally reported on NO_BET where
/// scoring ran; `selection` never is).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub market: String,
    pub decision: DecisionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub reasons: Vec<String>,
    pub reason_codes: Vec<String>,
    pub flags: Vec<String>,
    pub evidence_refs: Vec<String>,
    pub policy_version: String,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

/// Overall analyzer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyzerStatus {
    Ok,
    NoPrediction,
}

/// PLAY / NO_BET / NO_PREDICTION tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionCounts {
    #[serde(rename = "PLAY")]
    pub play: u32,
    #[serde(rename = "NO_BET")]
    pub no_bet: u32,
    #[serde(rename = "NO_PREDICTION")]
    pub no_prediction: u32,
}

/// Evidence/consensus quality summary attached to the run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub evidence_quality: f64,
    pub consensus_quality: f64,
}

/// Run-level aggregation across all requested markets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRunSummary {
    pub flags: Vec<String>,
    pub gate_results: Vec<GateResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_summary: Option<ConflictSummary>,
    pub counts: DecisionCounts,
}

/// Full analyzer v2 result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerResult {
    pub status: AnalyzerStatus,
    pub version: String,
    pub policy_version: String,
    pub analysis_run: AnalysisRunSummary,
    pub decisions: Vec<Decision>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_parse_accepts_historical_spellings() {
        assert_eq!(Market::parse("OU25"), Some(Market::Ou25));
        assert_eq!(Market::parse("GGNG"), Some(Market::Btts));
        assert_eq!(Market::parse("1x2"), Some(Market::OneXTwo));
        assert_eq!(Market::parse("HANDICAP"), None);
    }

    #[test]
    fn wire_forms_are_stable() {
        assert_eq!(
            serde_json::to_string(&Market::Ou25).unwrap(),
            "\"OU_2.5\""
        );
        assert_eq!(
            serde_json::to_string(&DecisionKind::NoPrediction).unwrap(),
            "\"NO_PREDICTION\""
        );
        assert_eq!(serde_json::to_string(&Selection::Home).unwrap(), "\"HOME\"");
        let counts = DecisionCounts {
            play: 1,
            no_bet: 2,
            no_prediction: 0,
        };
        let v = serde_json::to_value(counts).unwrap();
        assert_eq!(v["PLAY"], 1);
        assert_eq!(v["NO_BET"], 2);
    }
}
