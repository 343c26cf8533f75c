//! Deterministic decision engine.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                       analyze_v2 (entry)                      │
//! │   resolver gate → features → hard gates → market scoring →   │
//! │   soft gates → counts / status → stability check              │
//! └───────────────────────────────────────────────────────────────┘
//!          ▲                    ▲                      ▲
//!   ┌──────┴─────┐      ┌───────┴───────┐      ┌───────┴───────┐
//!   │  resolver  │      │ evidence pack │      │ stability     │
//!   │ (aliases)  │      │ quality +     │      │ store (hash   │
//!   │            │      │ consensus     │      │ guardrail)    │
//!   └────────────┘      └───────────────┘      └───────────────┘
//! ```
//!
//! # Determinism guarantees
//!
//! - All checksums route through `canonical` (sorted keys, `+00:00` UTC).
//! - No wall-clock reads inside scoring; time enters only as data.
//! - Candidate and decision ordering is fully specified; no map iteration
//!   order leaks into outputs.

pub mod analyzer;
pub mod canonical;
pub mod consensus;
pub mod contracts;
pub mod evidence;
pub mod features;
pub mod gates;
pub mod markets;
pub mod policy;
pub mod quality;
pub mod reason_codes;
pub mod resolver;
pub mod snapshot_envelope;
pub mod stability;

#[cfg(test)]
mod analyzer_tests;
#[cfg(test)]
mod resolver_tests;
#[cfg(test)]
mod snapshot_envelope_tests;

pub use analyzer::{analyze_v2, default_market_requests, MarketRequest, DEFAULT_MIN_CONFIDENCE};
pub use canonical::{canonical_string, iso_utc, parse_iso_utc, sha256_canonical, sha256_canonical_short};
pub use contracts::{
    AnalysisRunSummary, AnalyzerResult, AnalyzerStatus, ConflictSummary, Decision, DecisionCounts,
    DecisionKind, GateId, GateResult, Market, Selection, ANALYZER_VERSION_V2,
    MAX_DECISION_REASONS, POLICY_VERSION_V2,
};
pub use evidence::{
    evidence_pack_hash, Domain, DomainData, DomainPayload, EvidencePack, FixturesData, HeadToHead,
    QualityReport, StatsData, TeamStats,
};
pub use features::{consensus_quality, evidence_quality_score, extract_features, Features};
pub use policy::{
    load_active_policy, min_confidence_from_policy, policy_checksum, MarketPolicy, Policy,
    PolicyMeta, ReasonPolicy,
};
pub use resolver::{
    normalize_alias, resolve_match, MatchCandidate, MatchResolution, MatchResolutionInput,
    ResolutionStatus,
};
pub use snapshot_envelope::{
    build_envelope_for_live_shadow, build_envelope_for_recorded, compute_latency_ms,
    compute_payload_checksum, parse_stored_payload, SnapshotEnvelope, SnapshotSource, SnapshotType,
    SourceClass,
};
pub use stability::{run_stability_check, StabilityCheck, StabilityStore};
