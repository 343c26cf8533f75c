//! Runners: batch shadow runs, live-shadow compare/analyze, and the
//! consolidated burn-in ops flow.

pub mod burn_in_ops;
pub mod live_shadow_analyze_runner;
pub mod live_shadow_compare_runner;
pub mod shadow_batch;

#[cfg(test)]
mod shadow_batch_tests;

pub use burn_in_ops::{run_burn_in_ops, BurnInOpsConfig, BurnInOpsReport, BURN_IN_OPS_SUBDIR};
pub use live_shadow_analyze_runner::{
    run_live_shadow_analyze, AnalyzeRunConfig, AnalyzeRunReport, ANALYZE_REPORTS_SUBDIR,
};
pub use live_shadow_compare_runner::{
    run_live_shadow_compare, CompareRunReport, COMPARE_REPORTS_SUBDIR,
};
pub use shadow_batch::{
    run_shadow_batch, BatchActivationSummary, BatchReport, BatchRunConfig, MatchFailure,
    DEFAULT_BATCH_CONCURRENCY,
};
