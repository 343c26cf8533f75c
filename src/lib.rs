//! Offline-first football match decision engine.
//!
//! Deterministic pre-match decision pipeline plus its activation control
//! plane. The same inputs always produce byte-identical outputs, and any
//! live ingestion starts life as a shadow path that cannot influence stored
//! decisions until an operator explicitly authorizes activation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         runner (batch / ops)                     │
//! │   sorted match ids, bounded concurrency, aggregate reports       │
//! └──────────────────────────────────────────────────────────────────┘
//!          │                          │                      │
//!          ▼                          ▼                      ▼
//! ┌────────────────┐        ┌──────────────────┐    ┌───────────────┐
//! │ ingestion      │        │ pipeline::shadow │    │ reports       │
//! │ (connectors,   │──────▶ │ ingest→analyze→  │───▶│ (bundles,     │
//! │ live-I/O ctx)  │        │ gate→attach→eval │    │  index, diff) │
//! └────────────────┘        └──────────────────┘    └───────────────┘
//!                                    │
//!                   ┌────────────────┼────────────────┐
//!                   ▼                ▼                ▼
//!           ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//!           │ engine       │ │ activation   │ │ evaluation   │
//!           │ (analyzer v2,│ │ (gates, burn │ │ (outcomes,   │
//!           │  envelopes)  │ │  -in, tiers) │ │  KPIs)       │
//!           └──────────────┘ └──────────────┘ └──────────────┘
//! ```
//!
//! # Determinism guarantees
//!
//! - Every checksum routes through `engine::canonical` (sorted keys, compact
//!   separators, `+00:00` UTC timestamps).
//! - Batch iteration order is the sorted match-id list; concurrent execution
//!   aggregates in that order, so results equal the sequential run.
//! - Persistence is individually gated; shadow-only is the default.

pub mod activation;
pub mod engine;
pub mod evaluation;
pub mod ingestion;
pub mod models;
pub mod pipeline;
pub mod reports;
pub mod runner;
pub mod storage;
pub mod tuner;

pub use activation::{ActivationEnv, ApprovalContext, ApprovalEnv, ApprovalError, GateDecision};
pub use engine::{AnalyzerResult, Decision, DecisionKind, EvidencePack, Market, Policy, Selection};
pub use evaluation::{FinalScore, KpiPeriod, MarketOutcome};
pub use ingestion::{Connector, ConnectorRegistry, IngestedMatchData, LiveIoContext};
pub use pipeline::{PipelineContext, PipelineReport, ShadowPipelineInput};
pub use runner::{BatchReport, BatchRunConfig};
pub use storage::{Repository, SqliteRepository, StorageError};
