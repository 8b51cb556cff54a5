//! Keyed test-case store and lifecycle state machine.
//!
//! The registry is the single owner of test records. Status changes go
//! through [`TestStatus::can_transition`]: the only legal path is
//! `Pending -> Running -> {Passed, Failed}` and a test never re-enters
//! `Pending`. Illegal transitions are ignored rather than surfaced, which
//! keeps overlapping triggers (user runs, push updates, batch passes)
//! idempotent.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Category of a harness test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Protocol,
    Security,
    Performance,
    Failure,
}

/// Lifecycle state of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl TestStatus {
    /// Transition table for the lifecycle state machine.
    pub fn can_transition(self, next: TestStatus) -> bool {
        use TestStatus::*;
        matches!((self, next), (Pending, Running) | (Running, Passed) | (Running, Failed))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TestStatus::Passed | TestStatus::Failed)
    }
}

/// Fault to inject during a failure-category test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    None,
    InvalidSignature,
    CorruptCiphertext,
}

/// Per-test execution parameters, camelCase on the wire.
///
/// Optional fields default as follows when absent: `failure_mode` means no
/// fault injection, `symmetric_cipher` leaves the cipher to the harness,
/// `iterations` means a single iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfig {
    pub kem_algorithm: String,
    pub signature_algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symmetric_cipher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_mode: Option<FailureMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
}

impl TestConfig {
    pub fn new(kem_algorithm: impl Into<String>, signature_algorithm: impl Into<String>) -> Self {
        Self {
            kem_algorithm: kem_algorithm.into(),
            signature_algorithm: signature_algorithm.into(),
            symmetric_cipher: None,
            failure_mode: None,
            iterations: None,
        }
    }

    /// Absent means no fault injection.
    pub fn effective_failure_mode(&self) -> FailureMode {
        self.failure_mode.unwrap_or(FailureMode::None)
    }
}

/// Structured error carried by a failed run outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl ExecutionError {
    /// The code every locally caught execution failure is tagged with.
    pub const EXECUTION_ERROR: &'static str = "EXECUTION_ERROR";

    pub fn execution(message: impl Into<String>, trace: Option<String>) -> Self {
        Self {
            code: Self::EXECUTION_ERROR.to_string(),
            message: message.into(),
            trace,
        }
    }
}

/// Result payload of one run, stored verbatim on the test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

/// One test record. Ids are server-assigned; records are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    #[serde(rename = "type")]
    pub test_type: TestType,
    pub name: String,
    pub description: String,
    pub status: TestStatus,
    pub config: TestConfig,
    /// Set only by the orchestrator when the run starts.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set only by the orchestrator when the run completes.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<RunOutcome>,
}

impl TestCase {
    /// Wall-clock run duration, derived from the lifecycle timestamps.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some((completed - started).num_milliseconds()),
            _ => None,
        }
    }
}

/// Client-side draft posted to the harness, which assigns the id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDraft {
    #[serde(rename = "type")]
    pub test_type: TestType,
    pub name: String,
    pub description: String,
    pub status: TestStatus,
    pub config: TestConfig,
}

impl TestDraft {
    pub fn new(
        test_type: TestType,
        name: impl Into<String>,
        description: impl Into<String>,
        config: TestConfig,
    ) -> Self {
        Self {
            test_type,
            name: name.into(),
            description: description.into(),
            status: TestStatus::Pending,
            config,
        }
    }
}

/// Full-scan status counts. The four status buckets always sum to `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TestSummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Keyed store (id -> [`TestCase`]) plus lifecycle guard.
///
/// Every mutation republishes the summary on a watch channel so the view
/// layer can recount without polling.
pub struct TestRegistry {
    tests: DashMap<String, TestCase>,
    summary_tx: watch::Sender<TestSummary>,
}

impl TestRegistry {
    pub fn new() -> Self {
        let (summary_tx, _) = watch::channel(TestSummary::default());
        Self {
            tests: DashMap::new(),
            summary_tx,
        }
    }

    /// Merge a test list by id, replacing existing records. Used once at
    /// startup with either the server listing or the fallback catalog.
    pub fn load(&self, tests: Vec<TestCase>) {
        for test in tests {
            self.tests.insert(test.id.clone(), test);
        }
        self.publish_summary();
    }

    /// Insert or fully replace one record.
    pub fn upsert(&self, test: TestCase) {
        self.tests.insert(test.id.clone(), test);
        self.publish_summary();
    }

    pub fn get(&self, id: &str) -> Option<TestCase> {
        self.tests.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tests.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Apply a status change if the edge is legal. Illegal transitions and
    /// unknown ids are ignored and return `false`.
    pub fn transition(&self, id: &str, next: TestStatus) -> bool {
        let changed = {
            let Some(mut test) = self.tests.get_mut(id) else {
                return false;
            };
            if !test.status.can_transition(next) {
                return false;
            }
            test.status = next;
            true
        };
        self.publish_summary();
        changed
    }

    /// Guarded `Pending -> Running` plus start-time stamp, in one step.
    /// Returns the updated record, or `None` when the id is unknown or the
    /// test is not eligible to start.
    pub fn begin_run(&self, id: &str, at: DateTime<Utc>) -> Option<TestCase> {
        let updated = {
            let mut test = self.tests.get_mut(id)?;
            if !test.status.can_transition(TestStatus::Running) {
                return None;
            }
            test.status = TestStatus::Running;
            test.started_at = Some(at);
            test.value().clone()
        };
        self.publish_summary();
        Some(updated)
    }

    /// Guarded `Running -> {Passed, Failed}` plus completion stamp and result
    /// payload. The summary republish is the unconditional terminal step of
    /// both the success and failure paths.
    pub fn finish_run(
        &self,
        id: &str,
        status: TestStatus,
        outcome: RunOutcome,
        at: DateTime<Utc>,
    ) -> Option<TestCase> {
        let updated = {
            let mut test = self.tests.get_mut(id)?;
            if !status.is_terminal() || !test.status.can_transition(status) {
                return None;
            }
            test.status = status;
            test.completed_at = Some(at);
            test.results = Some(outcome);
            test.value().clone()
        };
        self.publish_summary();
        Some(updated)
    }

    /// Display query; `None` selects every test. No mutation.
    pub fn filter(&self, test_type: Option<TestType>) -> Vec<TestCase> {
        self.tests
            .iter()
            .filter(|entry| test_type.map_or(true, |t| entry.test_type == t))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Ids of tests currently `Pending`. Snapshot semantics: callers iterate
    /// the returned list, not the live map.
    pub fn pending_ids(&self) -> Vec<String> {
        self.tests
            .iter()
            .filter(|entry| entry.status == TestStatus::Pending)
            .map(|entry| entry.id.clone())
            .collect()
    }

    /// Recount by full scan. The catalog is test-count sized, not
    /// handshake-volume sized, so a scan is fine.
    pub fn summary(&self) -> TestSummary {
        let mut summary = TestSummary::default();
        for entry in self.tests.iter() {
            summary.total += 1;
            match entry.status {
                TestStatus::Pending => summary.pending += 1,
                TestStatus::Running => summary.running += 1,
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    /// Watch the summary recomputed after each mutation.
    pub fn summary_watch(&self) -> watch::Receiver<TestSummary> {
        self.summary_tx.subscribe()
    }

    fn publish_summary(&self) {
        let _ = self.summary_tx.send(self.summary());
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The predefined catalog installed when the initial server listing cannot be
/// fetched.
pub fn default_catalog() -> Vec<TestCase> {
    let base = TestConfig::new("Kyber768", "Dilithium3");
    let entry = |id: &str, test_type, name: &str, description: &str, config| TestCase {
        id: id.to_string(),
        test_type,
        name: name.to_string(),
        description: description.to_string(),
        status: TestStatus::Pending,
        config,
        started_at: None,
        completed_at: None,
        results: None,
    };

    vec![
        entry(
            "test-1",
            TestType::Protocol,
            "Basic KEMTLS Handshake",
            "Tests the complete KEMTLS handshake flow with Kyber768 and Dilithium3",
            TestConfig {
                symmetric_cipher: Some("AES-256-GCM".to_string()),
                ..base.clone()
            },
        ),
        entry(
            "test-2",
            TestType::Security,
            "Signature Verification",
            "Validates Dilithium3 signature verification in the handshake",
            base.clone(),
        ),
        entry(
            "test-3",
            TestType::Performance,
            "Handshake Performance",
            "Measures time taken for each phase of the handshake",
            TestConfig {
                iterations: Some(100),
                ..base.clone()
            },
        ),
        entry(
            "test-4",
            TestType::Failure,
            "Invalid Signature Test",
            "Tests server response to invalid signature",
            TestConfig {
                failure_mode: Some(FailureMode::InvalidSignature),
                ..base.clone()
            },
        ),
        entry(
            "test-5",
            TestType::Failure,
            "Corrupt Ciphertext Test",
            "Tests handling of corrupted KEM ciphertext",
            TestConfig {
                failure_mode: Some(FailureMode::CorruptCiphertext),
                ..base.clone()
            },
        ),
        entry(
            "test-6",
            TestType::Protocol,
            "OIDC over KEMTLS",
            "Tests OpenID Connect authentication flow over KEMTLS channel",
            base,
        ),
    ]
}
