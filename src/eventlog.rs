//! Bounded append-only buffer backing the dashboard event feed.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Retained entry count before FIFO eviction starts.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Severity of a feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One entry in the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
}

impl LogEntry {
    /// Entry stamped with the current time.
    pub fn new(level: LogLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            source: source.into(),
            message: message.into(),
        }
    }
}

/// Wire form of a `log` frame, where the timestamp may be absent.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntryDraft {
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
    pub level: LogLevel,
    #[serde(default)]
    pub source: String,
    pub message: String,
}

/// Append-only ring of feed entries. Entries leave only by FIFO eviction.
pub struct EventLog {
    capacity: usize,
    entries: RwLock<VecDeque<LogEntry>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    /// Append one entry, evicting the oldest when full.
    pub fn append(&self, entry: LogEntry) {
        let mut entries = self.entries.write();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Append, stamping the current time on drafts that carry none.
    pub fn ingest(&self, draft: LogEntryDraft) {
        self.append(LogEntry {
            timestamp: draft.timestamp.unwrap_or_else(Utc::now),
            level: draft.level,
            source: draft.source,
            message: draft.message,
        });
    }

    /// Convenience for locally produced entries.
    pub fn record(&self, level: LogLevel, source: &str, message: impl Into<String>) {
        self.append(LogEntry::new(level, source, message));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Oldest-first copy of the current entries.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}
