//! System-wide snapshots received from the harness.
//!
//! Both snapshot types are immutable values replaced wholesale on each
//! refresh. There is no field-level merge: partial updates from two racing
//! sources would otherwise interleave, which is exactly what the
//! connectivity-gated polling fallback exists to prevent.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Cryptographic posture advertised by the harness. Input to the risk scorer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemState {
    pub status: Option<String>,
    pub transport: Option<String>,
    pub kem: Option<String>,
    pub signature: Option<String>,
    pub hash: Option<String>,
}

/// Point-in-time performance snapshot from `GET /api/system/metrics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemMetrics {
    /// Harness uptime in seconds.
    pub uptime: f64,
    pub handshakes_per_sec: f64,
    pub total_handshakes: u64,
    pub successful_handshakes: u64,
    pub failed_handshakes: u64,
    /// Average handshake latency in milliseconds.
    pub latency: f64,
    /// Channel throughput in KB/s.
    pub throughput: f64,
}

/// Active harness session row from `GET /api/sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub client: String,
    pub state: String,
    pub algorithm: String,
    pub messages: u64,
    /// Session age in seconds.
    pub duration: f64,
    pub status: String,
}

/// Shared cache for the latest snapshots.
///
/// Writers are the message router (push path), the polling fallback and the
/// static feed (pull paths); at most one pull source is active at a time.
#[derive(Debug, Default)]
pub struct SystemCache {
    metrics: RwLock<Option<SystemMetrics>>,
    state: RwLock<SystemState>,
    refreshed_at: RwLock<Option<DateTime<Utc>>>,
}

impl SystemCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the metrics snapshot wholesale and stamp the refresh time.
    pub fn replace_metrics(&self, metrics: SystemMetrics) {
        *self.metrics.write() = Some(metrics);
        *self.refreshed_at.write() = Some(Utc::now());
    }

    /// Latest metrics snapshot, if any refresh has completed yet.
    pub fn metrics(&self) -> Option<SystemMetrics> {
        self.metrics.read().clone()
    }

    /// Replace the cached crypto posture wholesale.
    pub fn replace_state(&self, state: SystemState) {
        *self.state.write() = state;
    }

    pub fn state(&self) -> SystemState {
        self.state.read().clone()
    }

    /// When the metrics snapshot was last replaced.
    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        *self.refreshed_at.read()
    }
}
