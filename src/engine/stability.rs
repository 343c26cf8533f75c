//! Output stability guardrail.
//!
//! A process-wide map from analyzer input hash to the last output hash seen.
//! Divergence for the same input adds INTERNAL_GUARDRAIL_TRIGGERED to the run
//! flags and logs an error; the latest output hash is always recorded.
//! Divergence detection is best-effort: a read-then-write race can miss one
//! transition, which is acceptable.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::engine::canonical::sha256_canonical_short;
use crate::engine::canonical::sha256_hex;
use crate::engine::contracts::{flags, AnalyzerResult};
use crate::engine::evidence::{evidence_pack_hash, EvidencePack};

/// Stable hash of the analyzer input: match id plus evidence content hash.
pub fn compute_input_hash(match_id: &str, evidence_hash: &str) -> String {
    let raw = format!("{match_id}:{evidence_hash}");
    sha256_hex(raw.as_bytes())[..32].to_string()
}

/// Stable hash of the decision-relevant subset of an analyzer result.
pub fn compute_output_hash(result: &AnalyzerResult) -> String {
    let subset = serde_json::json!({
        "status": result.status,
        "version": result.version,
        "decisions": result.decisions,
        "analysis_run": {
            "flags": result.analysis_run.flags,
            "counts": result.analysis_run.counts,
        },
    });
    sha256_canonical_short(&subset)
}

/// Outcome of one stability check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityCheck {
    pub input_hash: String,
    pub output_hash: String,
    pub stable: bool,
    pub guardrail_triggered: bool,
}

/// Process-wide stability store. Owned by the runner that creates it and
/// passed down explicitly; interior synchronization makes shared reads and
/// exclusive writes safe across concurrent matches.
#[derive(Debug, Default)]
pub struct StabilityStore {
    entries: Mutex<HashMap<String, (String, u64)>>,
}

impl StabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Previous output hash for an input, if any.
    pub fn previous_output(&self, input_hash: &str) -> Option<String> {
        self.entries
            .lock()
            .get(input_hash)
            .map(|(hash, _)| hash.clone())
    }

    /// Record the latest output hash for an input. Always performed.
    pub fn record(&self, input_hash: &str, output_hash: &str) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.entries
            .lock()
            .insert(input_hash.to_string(), (output_hash.to_string(), now));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Run the stability check for one analyzer invocation, mutating the result's
/// run flags when divergence is detected.
pub fn run_stability_check(
    store: &StabilityStore,
    match_id: &str,
    evidence_pack: Option<&EvidencePack>,
    result: &mut AnalyzerResult,
) -> StabilityCheck {
    let evidence_hash = match evidence_pack {
        Some(pack) => evidence_pack_hash(pack),
        None => sha256_hex(b"none")[..32].to_string(),
    };
    let input_hash = compute_input_hash(match_id, &evidence_hash);
    let output_hash = compute_output_hash(result);

    let previous = store.previous_output(&input_hash);
    let diverged = previous
        .as_deref()
        .map(|prev| prev != output_hash)
        .unwrap_or(false);
    store.record(&input_hash, &output_hash);

    if diverged {
        let run_flags = &mut result.analysis_run.flags;
        if !run_flags
            .iter()
            .any(|f| f == flags::INTERNAL_GUARDRAIL_TRIGGERED)
        {
            run_flags.push(flags::INTERNAL_GUARDRAIL_TRIGGERED.to_string());
        }
        error!(
            input_hash = %input_hash,
            output_hash = %output_hash,
            "stability mismatch: previous output hash differs for identical input"
        );
    }

    StabilityCheck {
        input_hash,
        output_hash,
        stable: !diverged,
        guardrail_triggered: diverged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::analyzer::{analyze_v2, default_market_requests};
    use crate::engine::resolver::ResolutionStatus;

    fn result_for(min_confidence: f64) -> AnalyzerResult {
        analyze_v2(
            ResolutionStatus::NotFound,
            None,
            &default_market_requests(),
            min_confidence,
        )
    }

    #[test]
    fn first_sighting_is_stable() {
        let store = StabilityStore::new();
        let mut result = result_for(0.62);
        let check = run_stability_check(&store, "m1", None, &mut result);
        assert!(check.stable);
        assert!(!check.guardrail_triggered);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn same_input_same_output_stays_stable() {
        let store = StabilityStore::new();
        let mut a = result_for(0.62);
        let mut b = result_for(0.62);
        let first = run_stability_check(&store, "m1", None, &mut a);
        let second = run_stability_check(&store, "m1", None, &mut b);
        assert_eq!(first.output_hash, second.output_hash);
        assert!(second.stable);
        assert!(!b
            .analysis_run
            .flags
            .contains(&flags::INTERNAL_GUARDRAIL_TRIGGERED.to_string()));
    }

    #[test]
    fn divergence_triggers_guardrail_and_records_latest() {
        let store = StabilityStore::new();
        let mut a = result_for(0.62);
        let check_a = run_stability_check(&store, "m1", None, &mut a);

        let mut b = result_for(0.62);
        // Force a different observable output.
        b.analysis_run.flags.push("STALE_DATA".to_string());
        let check_b = run_stability_check(&store, "m1", None, &mut b);

        assert!(!check_b.stable);
        assert!(check_b.guardrail_triggered);
        assert!(b
            .analysis_run
            .flags
            .contains(&flags::INTERNAL_GUARDRAIL_TRIGGERED.to_string()));
        // Latest value replaces the old one.
        assert_eq!(
            store.previous_output(&check_a.input_hash).as_deref(),
            Some(check_b.output_hash.as_str())
        );
    }
}
