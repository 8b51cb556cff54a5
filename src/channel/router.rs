//! Inbound frame dispatch.
//!
//! A single consumer task keeps frames strictly in arrival order. Nothing a
//! frame does can stop the router: unknown types are dropped on purpose and
//! malformed payloads cost only the offending frame.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::protocol::{decode_frame, ServerFrame};
use crate::api::HarnessApi;
use crate::eventlog::EventLog;
use crate::registry::TestRegistry;
use crate::system::SystemCache;
use crate::telemetry;

/// Dispatches inbound push frames to the registry, event log, and system
/// cache.
pub struct MessageRouter {
    registry: Arc<TestRegistry>,
    log: Arc<EventLog>,
    cache: Arc<SystemCache>,
    api: Arc<dyn HarnessApi>,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<TestRegistry>,
        log: Arc<EventLog>,
        cache: Arc<SystemCache>,
        api: Arc<dyn HarnessApi>,
    ) -> Self {
        Self {
            registry,
            log,
            cache,
            api,
        }
    }

    /// Consume frames until the channel closes or the monitor shuts down.
    pub fn spawn(self, inbound: mpsc::Receiver<String>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(inbound, cancel))
    }

    async fn run(self, mut inbound: mpsc::Receiver<String>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                text = inbound.recv() => {
                    let Some(text) = text else { return };
                    self.route(&text).await;
                }
            }
        }
    }

    /// Dispatch one frame. Failures never escape.
    pub async fn route(&self, text: &str) {
        match decode_frame(text) {
            Ok(Some(frame)) => {
                telemetry::record_frame_routed();
                self.dispatch(frame).await;
            }
            Ok(None) => {
                telemetry::record_frame_dropped();
                debug!("unrecognized frame type ignored");
            }
            Err(err) => {
                telemetry::record_frame_dropped();
                warn!(error = %err, "malformed frame dropped");
            }
        }
    }

    async fn dispatch(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::TestEvent(event) => self.log.append(event.into_log_entry()),
            ServerFrame::TestStatusUpdate(update) => {
                // Illegal edges are ignored by the registry guard.
                self.registry.transition(&update.test_id, update.status);
            }
            ServerFrame::TestCreated(test) => self.registry.upsert(test),
            ServerFrame::SystemStateUpdate(state) => {
                self.cache.replace_state(state);
                // A state push also means the server-side counters moved.
                match self.api.system_metrics().await {
                    Ok(metrics) => self.cache.replace_metrics(metrics),
                    Err(err) => {
                        warn!(error = %err, "metrics refresh after state update failed");
                    }
                }
            }
            ServerFrame::Log(draft) => self.log.ingest(draft),
        }
    }
}
