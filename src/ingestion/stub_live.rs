//! Stub live connector for deterministic failure drills.
//!
//! Serves an embedded fixture set through the full live-I/O path (capability
//! check, circuit breaker, metrics) so timeout / 500 / rate-limit / slow
//! behavior can be drilled without a network. The drill mode comes from
//! STUB_LIVE_MODE (ok|timeout|500|rate_limit|slow); unknown values mean ok.

use std::sync::Arc;

use async_trait::async_trait;

use crate::ingestion::connector::{
    Connector, ConnectorCategory, ConnectorError, IngestedMatchData, MatchIdentity, OddsOneXTwo,
};
use crate::ingestion::live_io::{LiveIoContext, LiveIoError, RequestRecord};

/// Canonical name of the stub live connector.
pub const STUB_LIVE_NAME: &str = "stub_live_platform";

/// Drill mode for the stub connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubLiveMode {
    Ok,
    Timeout,
    ServerError,
    RateLimit,
    Slow,
}

impl StubLiveMode {
    pub fn from_env() -> Self {
        Self::parse(
            std::env::var("STUB_LIVE_MODE")
                .unwrap_or_default()
                .as_str(),
        )
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "timeout" => Self::Timeout,
            "500" => Self::ServerError,
            "rate_limit" => Self::RateLimit,
            "slow" => Self::Slow,
            _ => Self::Ok,
        }
    }
}

/// Deterministic latency recorded per mode (no real sleeping; the drill is
/// about the recorded metrics, not wall time).
fn latency_for_mode(mode: StubLiveMode, timeout_ms: f64) -> f64 {
    match mode {
        StubLiveMode::Ok => 5.0,
        StubLiveMode::Slow => 1_500.0,
        StubLiveMode::Timeout => timeout_ms,
        StubLiveMode::ServerError | StubLiveMode::RateLimit => 10.0,
    }
}

/// Stub live connector.
pub struct StubLiveConnector {
    live_io: Arc<LiveIoContext>,
    mode: StubLiveMode,
    matches: Vec<IngestedMatchData>,
}

impl StubLiveConnector {
    /// Connector with the default embedded fixture set and env-driven mode.
    pub fn new(live_io: Arc<LiveIoContext>) -> Self {
        Self::with_matches(live_io, StubLiveMode::from_env(), default_matches())
    }

    pub fn with_mode(live_io: Arc<LiveIoContext>, mode: StubLiveMode) -> Self {
        Self::with_matches(live_io, mode, default_matches())
    }

    pub fn with_matches(
        live_io: Arc<LiveIoContext>,
        mode: StubLiveMode,
        mut matches: Vec<IngestedMatchData>,
    ) -> Self {
        matches.sort_by(|a, b| a.match_id.cmp(&b.match_id));
        Self {
            live_io,
            mode,
            matches,
        }
    }

    fn require_live_io(&self) -> Result<(), ConnectorError> {
        if !self.live_io.live_io_allowed {
            return Err(ConnectorError::NotAllowed(format!(
                "{STUB_LIVE_NAME} is a LIVE connector; set LIVE_IO_ALLOWED=true to use it"
            )));
        }
        Ok(())
    }

    /// One simulated request through the breaker and metrics.
    fn simulated_request(&self) -> Result<(), ConnectorError> {
        if !self.live_io.breaker.allow_request() {
            self.live_io.metrics.record(RequestRecord {
                circuit_open: true,
                ..Default::default()
            });
            return Err(ConnectorError::Transport(LiveIoError::CircuitOpen));
        }

        let timeout_ms = self.live_io.timeout.as_secs_f64() * 1000.0;
        let latency_ms = latency_for_mode(self.mode, timeout_ms);
        match self.mode {
            StubLiveMode::Ok | StubLiveMode::Slow => {
                self.live_io.metrics.record(RequestRecord {
                    success: true,
                    latency_ms,
                    ..Default::default()
                });
                self.live_io.breaker.record_success();
                Ok(())
            }
            StubLiveMode::Timeout => {
                self.live_io.metrics.record(RequestRecord {
                    success: false,
                    latency_ms,
                    timeout: true,
                    ..Default::default()
                });
                self.live_io.breaker.record_failure();
                Err(ConnectorError::Transport(LiveIoError::Timeout(
                    "stub drill timeout".to_string(),
                )))
            }
            StubLiveMode::ServerError => {
                self.live_io.metrics.record(RequestRecord {
                    success: false,
                    latency_ms,
                    ..Default::default()
                });
                self.live_io.breaker.record_failure();
                Err(ConnectorError::Transport(LiveIoError::Failure(
                    "HTTP 500: stub drill".to_string(),
                )))
            }
            StubLiveMode::RateLimit => {
                self.live_io.metrics.record(RequestRecord {
                    success: false,
                    latency_ms,
                    rate_limited: true,
                    ..Default::default()
                });
                self.live_io.breaker.record_failure();
                Err(ConnectorError::Transport(LiveIoError::RateLimited(
                    "HTTP 429: stub drill".to_string(),
                )))
            }
        }
    }
}

#[async_trait]
impl Connector for StubLiveConnector {
    fn name(&self) -> &str {
        STUB_LIVE_NAME
    }

    fn category(&self) -> ConnectorCategory {
        ConnectorCategory::Live
    }

    async fn fetch_matches(&self) -> Result<Vec<MatchIdentity>, ConnectorError> {
        self.require_live_io()?;
        self.simulated_request()?;
        Ok(self
            .matches
            .iter()
            .map(|m| MatchIdentity {
                match_id: m.match_id.clone(),
                kickoff_utc: Some(m.kickoff_utc.clone()),
                competition: Some(m.competition.clone()),
            })
            .collect())
    }

    async fn fetch_match_data(
        &self,
        match_id: &str,
    ) -> Result<Option<IngestedMatchData>, ConnectorError> {
        self.require_live_io()?;
        self.simulated_request()?;
        Ok(self.matches.iter().find(|m| m.match_id == match_id).cloned())
    }
}

/// Embedded fixture set: four scheduled matches with a clear favorite, a
/// balanced pairing, and two mid cases.
pub fn default_matches() -> Vec<IngestedMatchData> {
    let entry = |id: &str, home: &str, away: &str, odds: (f64, f64, f64)| IngestedMatchData {
        match_id: id.to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        competition: "Stub Live League".to_string(),
        kickoff_utc: "2025-10-04T16:00:00+00:00".to_string(),
        odds_1x2: OddsOneXTwo {
            home: odds.0,
            draw: odds.1,
            away: odds.2,
        },
        status: "scheduled".to_string(),
    };
    vec![
        entry("a1", "Alpha", "Delta", (1.45, 4.4, 7.0)),
        entry("b2", "Bravo", "Echo", (2.0, 3.4, 3.8)),
        entry("c3", "Charlie", "Foxtrot", (2.9, 3.2, 2.5)),
        entry("d4", "Dynamo", "Gamma", (3.4, 3.3, 2.2)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn live_capability_is_required() {
        let connector = StubLiveConnector::with_mode(
            LiveIoContext::for_tests(false, false),
            StubLiveMode::Ok,
        );
        let err = connector.fetch_matches().await.unwrap_err();
        assert!(matches!(err, ConnectorError::NotAllowed(_)));
    }

    #[tokio::test]
    async fn ok_mode_serves_sorted_matches() {
        let connector = StubLiveConnector::with_mode(
            LiveIoContext::for_tests(true, false),
            StubLiveMode::Ok,
        );
        let matches = connector.fetch_matches().await.unwrap();
        let ids: Vec<&str> = matches.iter().map(|m| m.match_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b2", "c3", "d4"]);
        assert!(connector.fetch_match_data("a1").await.unwrap().is_some());
        assert!(connector.fetch_match_data("zz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn timeout_drill_records_metrics_and_errors() {
        let live_io = LiveIoContext::for_tests(true, false);
        let connector = StubLiveConnector::with_mode(live_io.clone(), StubLiveMode::Timeout);
        let err = connector.fetch_matches().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::Transport(LiveIoError::Timeout(_))
        ));
        let snap = live_io.metrics.snapshot();
        assert_eq!(snap.timeouts, 1);
        assert_eq!(snap.failures, 1);
    }

    #[tokio::test]
    async fn repeated_failures_open_the_circuit() {
        let live_io = LiveIoContext::for_tests(true, false);
        let connector = StubLiveConnector::with_mode(live_io.clone(), StubLiveMode::ServerError);
        for _ in 0..5 {
            let _ = connector.fetch_matches().await;
        }
        // Breaker is now open: requests fail fast with the dedicated error.
        let err = connector.fetch_matches().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::Transport(LiveIoError::CircuitOpen)
        ));
        assert!(live_io.metrics.snapshot().circuit_open_rejections >= 1);
    }
}
