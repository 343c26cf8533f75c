//! Shadow policy tuner and policy audit.
//!
//! The tuner only proposes: bounded per-market deltas derived from the
//! offline evaluation report, checked against guardrails. Applying a
//! proposal is an operator step outside this crate. The audit re-runs the
//! analyzer under the current and proposed policies over a snapshot set and
//! reports what would change, without applying anything.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::analyzer::{analyze_v2, default_market_requests};
use crate::engine::canonical::sha256_canonical;
use crate::engine::contracts::Market;
use crate::engine::evidence::EvidencePack;
use crate::engine::policy::{min_confidence_from_policy, policy_checksum, Policy};
use crate::engine::resolver::ResolutionStatus;
use crate::evaluation::offline_eval::EvaluationReport;

/// Minimum resolved picks before the tuner trusts a market's accuracy.
pub const MIN_SAMPLES_FOR_TUNING: u64 = 10;
/// Accuracy below this proposes a stricter threshold.
pub const TARGET_ACCURACY: f64 = 0.55;
/// Accuracy above this proposes a slightly looser threshold.
pub const RELAX_ACCURACY: f64 = 0.70;
/// Per-step threshold adjustments.
pub const TIGHTEN_STEP: f64 = 0.02;
pub const RELAX_STEP: f64 = 0.01;
/// Hard bounds on any proposed min_confidence.
pub const MIN_CONFIDENCE_FLOOR: f64 = 0.5;
pub const MIN_CONFIDENCE_CEILING: f64 = 0.9;
/// Largest single-proposal delta the guardrails accept.
pub const MAX_STEP_PER_PROPOSAL: f64 = 0.05;

/// One proposed knob change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDiff {
    pub market: String,
    pub field: String,
    pub from: f64,
    pub to: f64,
}

/// One guardrail check over the proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub name: String,
    pub passed: bool,
    pub notes: String,
}

/// Tuner output: diffs, guardrail results, and the full proposed policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyProposal {
    pub diffs: Vec<PolicyDiff>,
    pub guardrails_results: Vec<GuardrailResult>,
    pub proposed_policy: Policy,
}

/// Run the tuner in shadow mode over an evaluation report.
pub fn run_tuner(report: &EvaluationReport, current_policy: &Policy) -> PolicyProposal {
    let mut proposed = current_policy.clone();
    let mut diffs: Vec<PolicyDiff> = Vec::new();

    for market in Market::ALL {
        let Some(accuracy_stats) = report.per_market_accuracy.get(market.as_str()) else {
            continue;
        };
        let resolved = accuracy_stats.success + accuracy_stats.failure;
        let Some(accuracy) = accuracy_stats.accuracy else {
            continue;
        };
        if resolved < MIN_SAMPLES_FOR_TUNING {
            continue;
        }

        let current = current_policy.min_confidence_for(market);
        let target = if accuracy < TARGET_ACCURACY {
            (current + TIGHTEN_STEP).min(MIN_CONFIDENCE_CEILING)
        } else if accuracy > RELAX_ACCURACY {
            (current - RELAX_STEP).max(MIN_CONFIDENCE_FLOOR)
        } else {
            current
        };

        if (target - current).abs() > f64::EPSILON {
            if let Some(market_policy) = proposed.markets.get_mut(market.as_str()) {
                market_policy.min_confidence = target;
            }
            diffs.push(PolicyDiff {
                market: market.as_str().to_string(),
                field: "min_confidence".to_string(),
                from: current,
                to: target,
            });
        }
    }

    let guardrails_results = check_proposal_guardrails(&diffs, &proposed);
    PolicyProposal {
        diffs,
        guardrails_results,
        proposed_policy: proposed,
    }
}

fn check_proposal_guardrails(diffs: &[PolicyDiff], proposed: &Policy) -> Vec<GuardrailResult> {
    let mut results = Vec::new();

    let max_delta = diffs
        .iter()
        .map(|d| (d.to - d.from).abs())
        .fold(0.0_f64, f64::max);
    results.push(GuardrailResult {
        name: "max_step".to_string(),
        passed: max_delta <= MAX_STEP_PER_PROPOSAL,
        notes: format!("largest delta {max_delta:.3} (limit {MAX_STEP_PER_PROPOSAL})"),
    });

    let in_bounds = proposed
        .markets
        .values()
        .all(|m| (0.0..=1.0).contains(&m.min_confidence));
    results.push(GuardrailResult {
        name: "bounds".to_string(),
        passed: in_bounds,
        notes: "all min_confidence values within [0,1]".to_string(),
    });

    let validates = proposed.validate().is_ok();
    results.push(GuardrailResult {
        name: "policy_valid".to_string(),
        passed: validates,
        notes: "proposed policy passes validation".to_string(),
    });

    results
}

/// Checksum of a proposal's policy payload, excluding volatile metadata.
pub fn proposal_checksum(proposal: &PolicyProposal) -> String {
    policy_checksum(&proposal.proposed_policy)
}

/// One snapshot the audit replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSnapshot {
    pub match_id: String,
    pub evidence_pack: EvidencePack,
}

/// Audit report: change counts and the three checksums. Never applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub changed_count: u32,
    pub per_market_change_count: BTreeMap<String, u32>,
    pub snapshots_checksum: String,
    pub current_policy_checksum: String,
    pub proposed_policy_checksum: String,
}

/// Replay the analyzer over the snapshot set under both policies and count
/// per-market pick changes.
pub fn audit_snapshots(
    snapshots: &[AuditSnapshot],
    current_policy: &Policy,
    proposed_policy: &Policy,
) -> AuditReport {
    let current_min = min_confidence_from_policy(current_policy);
    let proposed_min = min_confidence_from_policy(proposed_policy);
    let requests = default_market_requests();

    let mut changed_count = 0u32;
    let mut per_market_change_count: BTreeMap<String, u32> = BTreeMap::new();

    for snapshot in snapshots {
        let before = analyze_v2(
            ResolutionStatus::Resolved,
            Some(&snapshot.evidence_pack),
            &requests,
            current_min,
        );
        let after = analyze_v2(
            ResolutionStatus::Resolved,
            Some(&snapshot.evidence_pack),
            &requests,
            proposed_min,
        );

        let mut snapshot_changed = false;
        for (old, new) in before.decisions.iter().zip(after.decisions.iter()) {
            let old_pick = (old.decision, old.selection);
            let new_pick = (new.decision, new.selection);
            if old_pick != new_pick {
                snapshot_changed = true;
                *per_market_change_count
                    .entry(old.market.clone())
                    .or_default() += 1;
            }
        }
        if snapshot_changed {
            changed_count += 1;
        }
    }

    AuditReport {
        changed_count,
        per_market_change_count,
        snapshots_checksum: sha256_canonical(&snapshots),
        current_policy_checksum: policy_checksum(current_policy),
        proposed_policy_checksum: policy_checksum(proposed_policy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::offline_eval::MarketAccuracy;

    fn report_with_accuracy(market: &str, success: u64, failure: u64) -> EvaluationReport {
        let mut report = EvaluationReport::default();
        let resolved = success + failure;
        report.per_market_accuracy.insert(
            market.to_string(),
            MarketAccuracy {
                success,
                failure,
                neutral: 0,
                accuracy: if resolved > 0 {
                    Some(success as f64 / resolved as f64)
                } else {
                    None
                },
            },
        );
        report
    }

    #[test]
    fn weak_accuracy_tightens_min_confidence() {
        let policy = Policy::bootstrap_default();
        let report = report_with_accuracy("1X2", 4, 8);
        let proposal = run_tuner(&report, &policy);
        assert_eq!(proposal.diffs.len(), 1);
        let diff = &proposal.diffs[0];
        assert_eq!(diff.market, "1X2");
        assert!(diff.to > diff.from);
        assert!(proposal.guardrails_results.iter().all(|g| g.passed));
        // Only the proposal changed; the input policy is untouched.
        assert_eq!(policy, Policy::bootstrap_default());
    }

    #[test]
    fn small_samples_never_produce_diffs() {
        let policy = Policy::bootstrap_default();
        let report = report_with_accuracy("1X2", 1, 3);
        let proposal = run_tuner(&report, &policy);
        assert!(proposal.diffs.is_empty());
        assert_eq!(proposal.proposed_policy, policy);
    }

    #[test]
    fn strong_accuracy_relaxes_within_floor() {
        let policy = Policy::bootstrap_default();
        let report = report_with_accuracy("OU_2.5", 9, 2);
        let proposal = run_tuner(&report, &policy);
        assert_eq!(proposal.diffs.len(), 1);
        assert!(proposal.diffs[0].to < proposal.diffs[0].from);
        assert!(proposal.diffs[0].to >= MIN_CONFIDENCE_FLOOR);
    }

    #[test]
    fn proposal_checksum_is_stable_across_meta_timestamps() {
        let policy = Policy::bootstrap_default();
        let report = report_with_accuracy("1X2", 4, 8);
        let mut a = run_tuner(&report, &policy);
        let mut b = run_tuner(&report, &policy);
        a.proposed_policy.meta.created_at_utc = "2025-10-01T00:00:00+00:00".to_string();
        b.proposed_policy.meta.created_at_utc = "2026-01-01T00:00:00+00:00".to_string();
        assert_eq!(proposal_checksum(&a), proposal_checksum(&b));
    }

    #[test]
    fn audit_counts_no_changes_for_identical_policies() {
        let policy = Policy::bootstrap_default();
        let report = audit_snapshots(&[], &policy, &policy);
        assert_eq!(report.changed_count, 0);
        assert_eq!(report.current_policy_checksum, report.proposed_policy_checksum);
    }
}
