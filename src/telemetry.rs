//! Logging initialization and metrics counters.
//!
//! Embedders call [`init_tracing`] once at startup. Counters go through the
//! `metrics` facade; whether anything collects them is the embedder's choice.

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging (default for deployments).
    #[default]
    Json,
    /// Human-readable output for development.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter directive, e.g. "info" or "qshield_monitor=debug".
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),
    #[error("Subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_tracing(config: &LogConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| TelemetryError::InvalidFilter(e.to_string()))?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json())
            .try_init()
            .map_err(|_| TelemetryError::AlreadyInitialized),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty())
            .try_init()
            .map_err(|_| TelemetryError::AlreadyInitialized),
    }
}

pub fn record_frame_routed() {
    metrics::counter!("monitor_frames_routed_total").increment(1);
}

pub fn record_frame_dropped() {
    metrics::counter!("monitor_frames_dropped_total").increment(1);
}

pub fn record_reconnect_attempt() {
    metrics::counter!("monitor_reconnect_attempts_total").increment(1);
}

pub fn record_metrics_poll() {
    metrics::counter!("monitor_metrics_polls_total").increment(1);
}

pub fn record_run_completed(passed: bool) {
    let outcome = if passed { "passed" } else { "failed" };
    metrics::counter!("monitor_runs_total", "outcome" => outcome).increment(1);
}
