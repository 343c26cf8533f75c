//! Connector registry.
//!
//! Resolves connector names to instances, enforcing the live-I/O capability
//! for live connectors. Tests register their own instances; the built-in
//! names are constructed lazily and cached.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::ingestion::connector::{Connector, ConnectorCategory};
use crate::ingestion::live_io::LiveIoContext;
use crate::ingestion::recorded::{RecordedProviderConnector, REAL_PROVIDER_NAME};
use crate::ingestion::stub_live::{StubLiveConnector, STUB_LIVE_NAME};

/// Registry of connectors for one runner.
pub struct ConnectorRegistry {
    fixtures_root: PathBuf,
    live_io: Arc<LiveIoContext>,
    connectors: Mutex<BTreeMap<String, Arc<dyn Connector>>>,
}

impl ConnectorRegistry {
    pub fn new(fixtures_root: impl Into<PathBuf>, live_io: Arc<LiveIoContext>) -> Self {
        Self {
            fixtures_root: fixtures_root.into(),
            live_io,
            connectors: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn live_io(&self) -> Arc<LiveIoContext> {
        self.live_io.clone()
    }

    /// Register (or replace) a connector instance under a name.
    pub fn register(&self, name: &str, connector: Arc<dyn Connector>) {
        self.connectors.lock().insert(name.to_string(), connector);
    }

    /// Resolve a connector, applying the capability rules:
    /// live connectors require LIVE_IO_ALLOWED. Returns `None` when the
    /// connector is unknown, cannot be constructed, or is not allowed.
    pub fn get_safe(&self, name: &str) -> Option<Arc<dyn Connector>> {
        if let Some(existing) = self.connectors.lock().get(name).cloned() {
            if existing.category() == ConnectorCategory::Live && !self.live_io.live_io_allowed {
                warn!(connector = name, "live connector requested without LIVE_IO_ALLOWED");
                return None;
            }
            return Some(existing);
        }

        let built: Option<Arc<dyn Connector>> = match name {
            REAL_PROVIDER_NAME => {
                let fixtures_dir = self.fixtures_root.join(REAL_PROVIDER_NAME);
                match RecordedProviderConnector::new(fixtures_dir, self.live_io.clone()) {
                    Ok(connector) => Some(Arc::new(connector)),
                    Err(e) => {
                        warn!(connector = name, error = %e, "connector unavailable");
                        None
                    }
                }
            }
            STUB_LIVE_NAME => {
                if !self.live_io.live_io_allowed {
                    warn!(connector = name, "live connector requested without LIVE_IO_ALLOWED");
                    return None;
                }
                Some(Arc::new(StubLiveConnector::new(self.live_io.clone())))
            }
            _ => None,
        };

        if let Some(connector) = &built {
            self.connectors
                .lock()
                .insert(name.to_string(), connector.clone());
        }
        built
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_connector_is_none() {
        let registry = ConnectorRegistry::new("/tmp/none", LiveIoContext::for_tests(false, false));
        assert!(registry.get_safe("made_up").is_none());
    }

    #[test]
    fn stub_live_requires_capability() {
        let registry = ConnectorRegistry::new("/tmp/none", LiveIoContext::for_tests(false, false));
        assert!(registry.get_safe(STUB_LIVE_NAME).is_none());

        let allowed = ConnectorRegistry::new("/tmp/none", LiveIoContext::for_tests(true, false));
        assert!(allowed.get_safe(STUB_LIVE_NAME).is_some());
    }
}
