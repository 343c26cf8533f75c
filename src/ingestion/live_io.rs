//! Live I/O control plane: capability flags, transport errors, request
//! metrics, and the circuit breaker shared by live connectors.
//!
//! All of this state lives in an explicit `LiveIoContext` owned by the runner
//! that creates it; connectors hold an `Arc` to it. Counters are monotonic
//! and atomically incremented.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::reports::Alert;

/// Default per-request deadline.
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 5.0;
/// Consecutive failures that open the circuit.
pub const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
/// Fixed open window before a single half-open probe is admitted.
pub const CIRCUIT_OPEN_WINDOW: Duration = Duration::from_secs(30);

/// Transport-level live I/O failure. Surfaced to the runner, recorded in
/// metrics, never aborts a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveIoError {
    Timeout(String),
    RateLimited(String),
    CircuitOpen,
    Failure(String),
}

impl std::fmt::Display for LiveIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout(detail) => write!(f, "live I/O timeout: {detail}"),
            Self::RateLimited(detail) => write!(f, "live I/O rate limited: {detail}"),
            Self::CircuitOpen => write!(f, "live I/O circuit open; failing fast"),
            Self::Failure(detail) => write!(f, "live I/O failure: {detail}"),
        }
    }
}

impl std::error::Error for LiveIoError {}

/// Truthy env flag: "1", "true", "yes" (case-insensitive).
pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Whether live connectors may be used at all.
pub fn live_io_allowed() -> bool {
    env_flag("LIVE_IO_ALLOWED")
}

/// Whether activated pipelines may persist anything.
pub fn live_writes_allowed() -> bool {
    env_flag("LIVE_WRITES_ALLOWED")
}

/// Guardrail thresholds over live I/O metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiveIoThresholds {
    pub max_timeouts: u64,
    pub max_rate_limited: u64,
    pub max_p95_ms: f64,
}

impl Default for LiveIoThresholds {
    fn default() -> Self {
        Self {
            max_timeouts: 0,
            max_rate_limited: 0,
            max_p95_ms: 2_000.0,
        }
    }
}

impl LiveIoThresholds {
    pub fn from_env() -> Self {
        let parse_u64 = |name: &str, default: u64| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let defaults = Self::default();
        Self {
            max_timeouts: parse_u64("LIVE_IO_MAX_TIMEOUTS", defaults.max_timeouts),
            max_rate_limited: parse_u64("LIVE_IO_MAX_RATE_LIMITED", defaults.max_rate_limited),
            max_p95_ms: std::env::var("LIVE_IO_MAX_P95_MS")
                .ok()
                .and_then(|v| v.trim().parse::<f64>().ok())
                .unwrap_or(defaults.max_p95_ms),
        }
    }
}

/// Point-in-time view of the live I/O counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveIoMetricsSnapshot {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub rate_limited: u64,
    pub circuit_open_rejections: u64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
}

/// Monotonic request counters plus latency samples.
#[derive(Debug, Default)]
pub struct LiveIoMetrics {
    total_requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    rate_limited: AtomicU64,
    circuit_open_rejections: AtomicU64,
    latencies_ms: Mutex<Vec<f64>>,
}

/// Per-request classification recorded into the metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestRecord {
    pub success: bool,
    pub latency_ms: f64,
    pub timeout: bool,
    pub rate_limited: bool,
    pub circuit_open: bool,
}

impl LiveIoMetrics {
    pub fn record(&self, record: RequestRecord) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if record.success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        if record.timeout {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }
        if record.rate_limited {
            self.rate_limited.fetch_add(1, Ordering::Relaxed);
        }
        if record.circuit_open {
            self.circuit_open_rejections.fetch_add(1, Ordering::Relaxed);
        }
        if record.latency_ms > 0.0 {
            self.latencies_ms.lock().push(record.latency_ms);
        }
    }

    pub fn snapshot(&self) -> LiveIoMetricsSnapshot {
        let latencies = {
            let mut samples = self.latencies_ms.lock().clone();
            samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            samples
        };
        LiveIoMetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            circuit_open_rejections: self.circuit_open_rejections.load(Ordering::Relaxed),
            latency_p50_ms: percentile(&latencies, 0.50),
            latency_p95_ms: percentile(&latencies, 0.95),
        }
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 - 1.0) * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Guardrail alerts over a metrics snapshot.
pub fn live_io_alerts(snapshot: &LiveIoMetricsSnapshot, thresholds: &LiveIoThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();
    if snapshot.timeouts > thresholds.max_timeouts {
        alerts.push(Alert::warn(
            "LIVE_IO_TIMEOUTS",
            format!(
                "Timeout count {} exceeds threshold {}.",
                snapshot.timeouts, thresholds.max_timeouts
            ),
        ));
    }
    if snapshot.rate_limited > thresholds.max_rate_limited {
        alerts.push(Alert::warn(
            "LIVE_IO_RATE_LIMITED",
            format!(
                "Rate-limited count {} exceeds threshold {}.",
                snapshot.rate_limited, thresholds.max_rate_limited
            ),
        ));
    }
    if snapshot.latency_p95_ms > thresholds.max_p95_ms {
        alerts.push(Alert::warn(
            "LIVE_IO_LATENCY_P95",
            format!(
                "Latency p95 {:.0}ms exceeds threshold {:.0}ms.",
                snapshot.latency_p95_ms, thresholds.max_p95_ms
            ),
        ));
    }
    alerts
}

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

/// Circuit breaker with a fixed open window and single half-open probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    failure_threshold: u32,
    open_window: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
            failure_threshold: CIRCUIT_FAILURE_THRESHOLD,
            open_window: CIRCUIT_OPEN_WINDOW,
        }
    }
}

impl CircuitBreaker {
    pub fn with_policy(failure_threshold: u32, open_window: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
            failure_threshold,
            open_window,
        }
    }

    /// Whether a request may be attempted. When the open window has elapsed a
    /// single probe is admitted (HalfOpen).
    pub fn allow_request(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            BreakerState::Closed { .. } | BreakerState::HalfOpen => true,
            BreakerState::Open { since } => {
                if since.elapsed() >= self.open_window {
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        *self.state.lock() = BreakerState::Closed {
            consecutive_failures: 0,
        };
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match *state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.failure_threshold {
                    warn!(failures, "circuit breaker opened");
                    *state = BreakerState::Open {
                        since: Instant::now(),
                    };
                } else {
                    *state = BreakerState::Closed {
                        consecutive_failures: failures,
                    };
                }
            }
            BreakerState::HalfOpen => {
                *state = BreakerState::Open {
                    since: Instant::now(),
                };
            }
            BreakerState::Open { .. } => {}
        }
    }
}

/// Shared live I/O context: capability flags, request timeout, metrics, and
/// breaker state for the lifetime of one runner.
#[derive(Debug)]
pub struct LiveIoContext {
    pub live_io_allowed: bool,
    pub live_writes_allowed: bool,
    pub timeout: Duration,
    pub thresholds: LiveIoThresholds,
    pub metrics: LiveIoMetrics,
    pub breaker: CircuitBreaker,
}

impl LiveIoContext {
    pub fn from_env() -> Arc<Self> {
        let timeout_secs = std::env::var("LIVE_IO_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| *v > 0.0)
            .unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        Arc::new(Self {
            live_io_allowed: live_io_allowed(),
            live_writes_allowed: live_writes_allowed(),
            timeout: Duration::from_secs_f64(timeout_secs),
            thresholds: LiveIoThresholds::from_env(),
            metrics: LiveIoMetrics::default(),
            breaker: CircuitBreaker::default(),
        })
    }

    /// Context for tests: explicit capabilities, default policy elsewhere.
    pub fn for_tests(live_io_allowed: bool, live_writes_allowed: bool) -> Arc<Self> {
        Arc::new(Self {
            live_io_allowed,
            live_writes_allowed,
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECONDS),
            thresholds: LiveIoThresholds::default(),
            metrics: LiveIoMetrics::default(),
            breaker: CircuitBreaker::default(),
        })
    }
}
