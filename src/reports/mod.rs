//! Report artifacts: guardrail alerts, the run index, bundle writing, and
//! the live-vs-recorded diff engines.

pub mod analyze_guardrails;
pub mod bundle;
pub mod index_store;
pub mod live_shadow_compare;

use serde::{Deserialize, Serialize};

/// One guardrail alert. Alerts never block a shadow run; gates read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub code: String,
    pub severity: String,
    pub message: String,
}

impl Alert {
    pub fn warn(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            severity: "WARN".to_string(),
            message: message.into(),
        }
    }
}

pub use analyze_guardrails::{compare_analysis, evaluate_analysis_guardrails, AnalyzeGuardrailPolicy};
pub use bundle::{prune_bundles, write_bundle_file};
pub use index_store::{load_index, save_index, IndexEntry, ReportIndex};
pub use live_shadow_compare::{
    build_snapshot_list, compare_snapshots, ComparePolicy, CompareReport, SnapshotEntry,
};
