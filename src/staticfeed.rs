//! Static-file deployment sync.
//!
//! The simpler deployment mode has no socket and no REST API: the harness
//! publishes two JSON artifacts next to the page and the monitor polls them
//! with plain GETs every 3000 ms. `runtime_state.json` carries the crypto
//! posture wholesale; `events.json` is a growing ordered array of which only
//! the unseen tail is appended to the event log.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::eventlog::{EventLog, LogEntry, LogLevel};
use crate::system::{SystemCache, SystemState};

/// Fixed artifact poll interval.
pub const STATIC_POLL_INTERVAL: Duration = Duration::from_secs(3);

const STATE_ARTIFACT: &str = "runtime_state.json";
const EVENTS_ARTIFACT: &str = "events.json";

/// Event row in `events.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticEvent {
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub severity: String,
}

impl StaticEvent {
    /// Severity to feed level. Anything beyond warn (HIGH, CRITICAL, ...)
    /// lands as an error.
    pub fn level(&self) -> LogLevel {
        match self.severity.to_ascii_uppercase().as_str() {
            "INFO" => LogLevel::Info,
            "WARN" | "WARNING" => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }

    pub fn into_log_entry(self) -> LogEntry {
        let timestamp = DateTime::parse_from_rfc3339(&self.time)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let level = self.level();
        LogEntry {
            timestamp,
            level,
            source: self.category,
            message: format!("{} [{}]", self.event, self.result),
        }
    }
}

/// Polls the published artifacts and feeds the shared caches.
pub struct StaticFeed {
    client: reqwest::Client,
    base: String,
    cache: Arc<SystemCache>,
    log: Arc<EventLog>,
    interval: Duration,
    /// Rows of `events.json` already appended to the log.
    seen: usize,
}

impl StaticFeed {
    pub fn new(base: impl Into<String>, cache: Arc<SystemCache>, log: Arc<EventLog>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base,
            cache,
            log,
            interval: STATIC_POLL_INTERVAL,
            seen: 0,
        }
    }

    /// Override the interval. Exists for tests; deployments use the default.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }
            self.refresh().await;
        }
    }

    /// One poll pass. Either artifact failing costs only this pass.
    async fn refresh(&mut self) {
        match self.fetch::<SystemState>(STATE_ARTIFACT).await {
            Ok(state) => self.cache.replace_state(state),
            Err(err) => warn!(error = %err, artifact = STATE_ARTIFACT, "artifact fetch failed"),
        }
        match self.fetch::<Vec<StaticEvent>>(EVENTS_ARTIFACT).await {
            Ok(events) => self.ingest(events),
            Err(err) => warn!(error = %err, artifact = EVENTS_ARTIFACT, "artifact fetch failed"),
        }
    }

    /// Append rows past the last-seen cursor. A shrinking file means the
    /// harness rewrote it from scratch; the cursor resets.
    fn ingest(&mut self, events: Vec<StaticEvent>) {
        if events.len() < self.seen {
            self.seen = 0;
        }
        let fresh = events.len();
        for event in events.into_iter().skip(self.seen) {
            self.log.append(event.into_log_entry());
        }
        self.seen = fresh;
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, artifact: &str) -> Result<T, reqwest::Error> {
        self.client
            .get(format!("{}/{}", self.base, artifact))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event: &str, severity: &str) -> StaticEvent {
        StaticEvent {
            time: "2026-08-06T12:00:00Z".to_string(),
            category: "kemtls".to_string(),
            event: event.to_string(),
            result: "OK".to_string(),
            severity: severity.to_string(),
        }
    }

    fn feed() -> StaticFeed {
        StaticFeed::new(
            "http://127.0.0.1:9000/",
            Arc::new(SystemCache::new()),
            Arc::new(EventLog::new()),
        )
    }

    #[test]
    fn severity_mapping() {
        assert_eq!(event("e", "INFO").level(), LogLevel::Info);
        assert_eq!(event("e", "info").level(), LogLevel::Info);
        assert_eq!(event("e", "WARNING").level(), LogLevel::Warn);
        assert_eq!(event("e", "HIGH").level(), LogLevel::Error);
        assert_eq!(event("e", "CRITICAL").level(), LogLevel::Error);
    }

    #[test]
    fn log_entry_carries_artifact_fields() {
        let entry = event("kem_handshake", "INFO").into_log_entry();
        assert_eq!(entry.source, "kemtls");
        assert_eq!(entry.message, "kem_handshake [OK]");
        assert_eq!(entry.timestamp.to_rfc3339(), "2026-08-06T12:00:00+00:00");
    }

    #[test]
    fn unparseable_time_defaults_to_now() {
        let before = Utc::now();
        let entry = StaticEvent {
            time: "yesterday-ish".to_string(),
            ..event("e", "INFO")
        }
        .into_log_entry();
        assert!(entry.timestamp >= before);
    }

    #[test]
    fn ingest_appends_only_the_unseen_tail() {
        let mut feed = feed();
        feed.ingest(vec![event("a", "INFO"), event("b", "INFO")]);
        assert_eq!(feed.log.len(), 2);

        // Same two rows plus one new one: only the tail lands.
        feed.ingest(vec![event("a", "INFO"), event("b", "INFO"), event("c", "INFO")]);
        assert_eq!(feed.log.len(), 3);
        assert_eq!(feed.log.snapshot()[2].message, "c [OK]");
    }

    #[test]
    fn ingest_resets_cursor_on_rewritten_file() {
        let mut feed = feed();
        feed.ingest(vec![event("a", "INFO"), event("b", "INFO"), event("c", "INFO")]);
        assert_eq!(feed.log.len(), 3);

        feed.ingest(vec![event("fresh", "INFO")]);
        assert_eq!(feed.log.len(), 4);
        assert_eq!(feed.seen, 1);
    }
}
