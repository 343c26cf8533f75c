//! Pipelines: multi-source evidence assembly, the raw-payload cache, the
//! resolver-fronted analysis flow, and the single-match shadow pipeline.

pub mod analysis_flow;
pub mod cache;
pub mod multi_source;
pub mod shadow;
pub mod sources;

#[cfg(test)]
mod shadow_tests;

pub use analysis_flow::{run_analysis_flow, AnalysisFlowResult};
pub use cache::{cache_payload, get_cached_payload, make_cache_key};
pub use multi_source::{run_pipeline, PipelineInput, PipelineResult, PipelineStatus};
pub use shadow::{
    run_shadow_pipeline, PipelineContext, PipelineReport, ShadowPipelineInput,
    MULTI_SOURCE_CONNECTOR,
};
pub use sources::{Source, SourcePayload, StubFixturesSource, StubStatsSource};
