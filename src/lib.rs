//! QuantumShield dashboard synchronization core.
//!
//! Reconciles two independent update channels from a post-quantum test
//! harness into one consistent in-memory model: a WebSocket push feed and a
//! connectivity-gated pull fallback. On top of that model it drives the
//! bounded test-lifecycle state machine, sequences batch execution, and
//! scores the advertised crypto posture.
//!
//! # Structure
//!
//! - [`registry`]: keyed test store and the lifecycle state machine
//! - [`channel`]: push-channel protocol, connection ownership, dispatch
//! - [`api`]: REST surface of the harness
//! - [`orchestrator`]: single and batch run sequencing
//! - [`poller`]: metrics pull fallback while the push channel is down
//! - [`staticfeed`]: socketless deployment mode over published artifacts
//! - [`risk`]: pure posture scoring
//! - [`eventlog`]: bounded FIFO event feed
//!
//! All state lives in the [`Monitor`] context constructed at startup; there
//! are no module-level globals. The view layer consumes snapshots and watch
//! channels and is otherwise out of scope here.

pub mod api;
pub mod channel;
pub mod config;
pub mod eventlog;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod risk;
pub mod staticfeed;
pub mod system;
pub mod telemetry;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use api::{ApiError, HarnessApi, HttpApi};
use channel::{ConnectionHandle, ConnectionManager, ConnectivityState, MessageRouter};
pub use config::MonitorConfig;
use eventlog::{EventLog, LogLevel};
use orchestrator::TestRunner;
use poller::PollingFallback;
use registry::{default_catalog, TestRegistry};
use risk::RiskAssessment;
use staticfeed::StaticFeed;
use system::{SessionInfo, SystemCache};

/// Buffered inbound frames between the socket task and the router.
const INBOUND_BUFFER: usize = 256;

/// The monitor application context.
///
/// Owns every component and the shared cancellation token for the background
/// tasks. Constructed once at startup and passed around explicitly.
pub struct Monitor {
    pub registry: Arc<TestRegistry>,
    pub log: Arc<EventLog>,
    pub cache: Arc<SystemCache>,
    pub api: Arc<dyn HarnessApi>,
    pub runner: TestRunner,
    channel: ConnectionHandle,
    connection: Option<ConnectionManager>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Monitor {
    /// Context wired against the configured harness origin.
    pub fn new(config: MonitorConfig) -> Self {
        let api: Arc<dyn HarnessApi> = Arc::new(HttpApi::new(config.endpoint.http_base()));
        Self::with_api(config, api)
    }

    /// Context with a caller-supplied API implementation. Tests wire an
    /// in-memory double through here.
    pub fn with_api(config: MonitorConfig, api: Arc<dyn HarnessApi>) -> Self {
        let registry = Arc::new(TestRegistry::new());
        let log = Arc::new(EventLog::with_capacity(config.log_capacity));
        let cache = Arc::new(SystemCache::new());
        let connection = ConnectionManager::new(config.endpoint.ws_url());
        let channel = connection.handle();
        let runner = TestRunner::new(
            Arc::clone(&registry),
            Arc::clone(&api),
            channel.clone(),
            Arc::clone(&log),
        );

        Self {
            registry,
            log,
            cache,
            api,
            runner,
            channel,
            connection: Some(connection),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Fetch the catalog once at startup. When the harness cannot be reached
    /// the embedded default catalog is installed instead; that is a warning,
    /// not a failure.
    pub async fn load_catalog(&self) {
        match self.api.list_tests().await {
            Ok(tests) => {
                let count = tests.len();
                self.registry.load(tests);
                self.log.record(
                    LogLevel::Info,
                    "system",
                    format!("Loaded {count} test cases from server"),
                );
            }
            Err(err) => {
                warn!(error = %err, "test listing unavailable, installing default catalog");
                self.registry.load(default_catalog());
                self.log.record(
                    LogLevel::Warn,
                    "system",
                    "Using default test cases (server not responding)",
                );
            }
        }
    }

    /// Spawn the connection, router, and polling fallback tasks.
    pub fn start(&mut self) {
        let Some(connection) = self.connection.take() else {
            return; // already started
        };

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let router = MessageRouter::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.log),
            Arc::clone(&self.cache),
            Arc::clone(&self.api),
        );
        let poller = PollingFallback::new(
            Arc::clone(&self.api),
            Arc::clone(&self.cache),
            self.channel.watch(),
        );

        self.tasks.push(connection.spawn(inbound_tx, self.cancel.child_token()));
        self.tasks.push(router.spawn(inbound_rx, self.cancel.child_token()));
        self.tasks.push(poller.spawn(self.cancel.child_token()));
    }

    /// Spawn the static-artifact feed instead of (or beside) the socket
    /// stack, for the socketless deployment mode.
    pub fn start_static_feed(&mut self, base: impl Into<String>) {
        let feed = StaticFeed::new(base, Arc::clone(&self.cache), Arc::clone(&self.log));
        self.tasks.push(feed.spawn(self.cancel.child_token()));
    }

    /// Current push-channel connectivity.
    pub fn connectivity(&self) -> ConnectivityState {
        self.channel.connectivity()
    }

    /// Handle for emitting frames and watching connectivity.
    pub fn channel(&self) -> ConnectionHandle {
        self.channel.clone()
    }

    /// Score the currently cached crypto posture.
    pub fn risk_assessment(&self) -> RiskAssessment {
        risk::assess(&self.cache.state())
    }

    /// Active harness sessions, fetched on demand for display.
    pub async fn active_sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
        self.api.sessions().await
    }

    /// Stop all background tasks and wait for them to exit.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}
