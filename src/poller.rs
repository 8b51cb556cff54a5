//! Pull-based metrics fallback for when the push channel is down.
//!
//! A fixed-interval timer that refreshes the metrics snapshot only while
//! connectivity reports `Disconnected`. While the push channel is active the
//! tick is skipped entirely so two sources never race on the same fields.
//! The fallback covers metrics only; it does not resynchronize the test
//! catalog.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::HarnessApi;
use crate::channel::ConnectivityState;
use crate::system::SystemCache;
use crate::telemetry;

/// Fixed refresh interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Timer-driven metrics refresh gated on connectivity.
pub struct PollingFallback {
    api: Arc<dyn HarnessApi>,
    cache: Arc<SystemCache>,
    connectivity: watch::Receiver<ConnectivityState>,
    interval: Duration,
}

impl PollingFallback {
    pub fn new(
        api: Arc<dyn HarnessApi>,
        cache: Arc<SystemCache>,
        connectivity: watch::Receiver<ConnectivityState>,
    ) -> Self {
        Self {
            api,
            cache,
            connectivity,
            interval: POLL_INTERVAL,
        }
    }

    /// Override the interval. Exists for tests; deployments use the default.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The gating predicate: refresh only while disconnected.
    pub fn should_poll(state: ConnectivityState) -> bool {
        state == ConnectivityState::Disconnected
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let state = *self.connectivity.borrow();
            if !Self::should_poll(state) {
                continue;
            }

            match self.api.system_metrics().await {
                Ok(metrics) => {
                    telemetry::record_metrics_poll();
                    self.cache.replace_metrics(metrics);
                    debug!("metrics refreshed via polling fallback");
                }
                Err(err) => warn!(error = %err, "metrics poll failed"),
            }
        }
    }
}
