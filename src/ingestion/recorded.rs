//! Recorded-first provider connector.
//!
//! Loads JSON fixtures from a directory in deterministic (path-sorted) order
//! and fails fast at construction when fixtures are missing. An optional live
//! path is gated behind REAL_PROVIDER_LIVE plus LIVE_IO_ALLOWED and the
//! provider base URL / API key; fixtures must exist regardless.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::ingestion::connector::{
    ingested_from_value, Connector, ConnectorCategory, ConnectorError, IngestedMatchData,
    MatchIdentity,
};
use crate::ingestion::live_io::{env_flag, LiveIoContext, LiveIoError, RequestRecord};

/// Canonical name of the recorded-first provider connector.
pub const REAL_PROVIDER_NAME: &str = "real_provider";

/// Live-path configuration pulled from the environment.
#[derive(Debug, Clone)]
struct LiveProviderConfig {
    base_url: String,
    api_key: String,
}

fn live_provider_config() -> Option<LiveProviderConfig> {
    let base_url = std::env::var("REAL_PROVIDER_BASE_URL").ok()?.trim().to_string();
    let api_key = std::env::var("REAL_PROVIDER_API_KEY").ok()?.trim().to_string();
    if base_url.is_empty() || api_key.is_empty() {
        return None;
    }
    Some(LiveProviderConfig { base_url, api_key })
}

/// Recorded-first connector backed by a fixtures directory.
pub struct RecordedProviderConnector {
    name: String,
    fixtures_dir: PathBuf,
    live_io: Arc<LiveIoContext>,
    http: Option<reqwest::Client>,
}

impl RecordedProviderConnector {
    /// Construct and verify the fixtures directory (recorded-first: fixtures
    /// must exist even when the live path is enabled).
    pub fn new(
        fixtures_dir: impl AsRef<Path>,
        live_io: Arc<LiveIoContext>,
    ) -> Result<Self, ConnectorError> {
        Self::with_name(REAL_PROVIDER_NAME, fixtures_dir, live_io)
    }

    pub fn with_name(
        name: &str,
        fixtures_dir: impl AsRef<Path>,
        live_io: Arc<LiveIoContext>,
    ) -> Result<Self, ConnectorError> {
        let fixtures_dir = fixtures_dir.as_ref().to_path_buf();
        ensure_fixtures_exist(&fixtures_dir, name)?;
        let http = if Self::live_enabled(&live_io) {
            reqwest::Client::builder()
                .timeout(live_io.timeout)
                .build()
                .ok()
        } else {
            None
        };
        Ok(Self {
            name: name.to_string(),
            fixtures_dir,
            live_io,
            http,
        })
    }

    fn live_enabled(live_io: &LiveIoContext) -> bool {
        env_flag("REAL_PROVIDER_LIVE") && live_io.live_io_allowed && live_provider_config().is_some()
    }

    fn load_fixtures(&self) -> Result<Vec<Value>, ConnectorError> {
        ensure_fixtures_exist(&self.fixtures_dir, &self.name)?;
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.fixtures_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut fixtures = Vec::new();
        for path in paths {
            match std::fs::read_to_string(&path) {
                Ok(text) => match serde_json::from_str::<Value>(&text) {
                    Ok(value @ Value::Object(_)) => fixtures.push(value),
                    Ok(_) | Err(_) => {
                        warn!(path = %path.display(), "skipping unreadable fixture");
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable fixture");
                }
            }
        }
        if fixtures.is_empty() {
            return Err(ConnectorError::InvalidPayload(format!(
                "{}: no valid JSON fixtures in {}",
                self.name,
                self.fixtures_dir.display()
            )));
        }
        Ok(fixtures)
    }

    async fn live_get(&self, path: &str) -> Result<Option<Value>, ConnectorError> {
        let Some(client) = &self.http else {
            return Err(ConnectorError::NotAllowed(
                "live path requires REAL_PROVIDER_LIVE and LIVE_IO_ALLOWED".to_string(),
            ));
        };
        let Some(config) = live_provider_config() else {
            return Err(ConnectorError::NotAllowed(
                "live path requires REAL_PROVIDER_BASE_URL and REAL_PROVIDER_API_KEY".to_string(),
            ));
        };
        if !self.live_io.breaker.allow_request() {
            self.live_io.metrics.record(RequestRecord {
                circuit_open: true,
                ..Default::default()
            });
            return Err(ConnectorError::Transport(LiveIoError::CircuitOpen));
        }

        let url = format!("{}/{}", config.base_url.trim_end_matches('/'), path);
        let started = Instant::now();
        let response = client
            .get(&url)
            .bearer_auth(&config.api_key)
            .header("X-API-Key", &config.api_key)
            .send()
            .await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match response {
            Ok(resp) if resp.status().as_u16() == 404 => {
                self.live_io.metrics.record(RequestRecord {
                    success: false,
                    latency_ms,
                    ..Default::default()
                });
                Ok(None)
            }
            Ok(resp) if resp.status().as_u16() == 429 => {
                self.live_io.metrics.record(RequestRecord {
                    success: false,
                    latency_ms,
                    rate_limited: true,
                    ..Default::default()
                });
                self.live_io.breaker.record_failure();
                Err(ConnectorError::Transport(LiveIoError::RateLimited(
                    "429 from provider".to_string(),
                )))
            }
            Ok(resp) if resp.status().is_server_error() => {
                self.live_io.metrics.record(RequestRecord {
                    success: false,
                    latency_ms,
                    ..Default::default()
                });
                self.live_io.breaker.record_failure();
                Err(ConnectorError::Transport(LiveIoError::Failure(format!(
                    "HTTP {}",
                    resp.status()
                ))))
            }
            Ok(resp) => {
                let value = resp
                    .json::<Value>()
                    .await
                    .context("decoding provider response")
                    .map_err(|e| ConnectorError::InvalidPayload(e.to_string()))?;
                self.live_io.metrics.record(RequestRecord {
                    success: true,
                    latency_ms,
                    ..Default::default()
                });
                self.live_io.breaker.record_success();
                Ok(Some(value))
            }
            Err(e) if e.is_timeout() => {
                self.live_io.metrics.record(RequestRecord {
                    success: false,
                    latency_ms,
                    timeout: true,
                    ..Default::default()
                });
                self.live_io.breaker.record_failure();
                Err(ConnectorError::Transport(LiveIoError::Timeout(
                    "request deadline exceeded".to_string(),
                )))
            }
            Err(e) => {
                self.live_io.metrics.record(RequestRecord {
                    success: false,
                    latency_ms,
                    ..Default::default()
                });
                self.live_io.breaker.record_failure();
                Err(ConnectorError::Transport(LiveIoError::Failure(e.to_string())))
            }
        }
    }

    fn use_live(&self) -> bool {
        self.http.is_some()
    }
}

fn ensure_fixtures_exist(dir: &Path, name: &str) -> Result<(), ConnectorError> {
    if !dir.is_dir() {
        return Err(ConnectorError::InvalidPayload(format!(
            "{name} fixtures directory missing: {}. Recorded-first: add JSON fixtures.",
            dir.display()
        )));
    }
    let has_json = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .any(|e| e.path().extension().and_then(|x| x.to_str()) == Some("json"));
    if !has_json {
        return Err(ConnectorError::InvalidPayload(format!(
            "{name}: no JSON fixtures in {}. Recorded-first: add at least one fixture file.",
            dir.display()
        )));
    }
    Ok(())
}

#[async_trait]
impl Connector for RecordedProviderConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> ConnectorCategory {
        ConnectorCategory::Recorded
    }

    async fn fetch_matches(&self) -> Result<Vec<MatchIdentity>, ConnectorError> {
        if self.use_live() {
            if let Some(Value::Array(items)) = self.live_get("matches").await? {
                let mut identities: Vec<MatchIdentity> = items
                    .iter()
                    .filter_map(|raw| ingested_from_value(raw).ok())
                    .map(|parsed| MatchIdentity {
                        match_id: parsed.match_id,
                        kickoff_utc: Some(parsed.kickoff_utc),
                        competition: Some(parsed.competition),
                    })
                    .collect();
                identities.sort_by(|a, b| a.match_id.cmp(&b.match_id));
                return Ok(identities);
            }
            debug!("live match list unavailable; falling back to fixtures");
        }

        let mut identities: Vec<MatchIdentity> = self
            .load_fixtures()?
            .iter()
            .filter_map(|raw| ingested_from_value(raw).ok())
            .map(|parsed| MatchIdentity {
                match_id: parsed.match_id,
                kickoff_utc: Some(parsed.kickoff_utc),
                competition: Some(parsed.competition),
            })
            .collect();
        identities.sort_by(|a, b| a.match_id.cmp(&b.match_id));
        Ok(identities)
    }

    async fn fetch_match_data(
        &self,
        match_id: &str,
    ) -> Result<Option<IngestedMatchData>, ConnectorError> {
        if self.use_live() {
            match self.live_get(&format!("matches/{match_id}")).await? {
                Some(raw) => return Ok(Some(ingested_from_value(&raw)?)),
                None => return Ok(None),
            }
        }

        for raw in self.load_fixtures()? {
            if let Ok(parsed) = ingested_from_value(&raw) {
                if parsed.match_id == match_id {
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }
}
