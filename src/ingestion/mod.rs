//! Ingestion: connectors, live-I/O control plane, evidence synthesis.

pub mod connector;
pub mod evidence_builder;
pub mod live_io;
pub mod recorded;
pub mod registry;
pub mod stub_live;

pub use connector::{
    ingested_from_value, normalize_kickoff_utc, parse_odds_1x2, Connector, ConnectorCategory,
    ConnectorError, IngestedMatchData, MatchIdentity, OddsOneXTwo,
};
pub use evidence_builder::{implied_probabilities, ingested_to_evidence_pack};
pub use live_io::{
    env_flag, live_io_alerts, live_io_allowed, live_writes_allowed, CircuitBreaker, LiveIoContext,
    LiveIoError, LiveIoMetrics, LiveIoMetricsSnapshot, LiveIoThresholds, RequestRecord,
};
pub use recorded::{RecordedProviderConnector, REAL_PROVIDER_NAME};
pub use registry::ConnectorRegistry;
pub use stub_live::{StubLiveConnector, StubLiveMode, STUB_LIVE_NAME};
