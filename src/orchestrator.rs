//! Sequenced test execution against the harness.
//!
//! Every run, whatever triggered it, goes through the same path: a guarded
//! `Pending -> Running` start, one remote invocation, and a single terminal
//! step that records the outcome, logs, and republishes the summary. Any
//! error on the way is converted into a failed outcome; nothing escapes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::api::{ApiError, HarnessApi};
use crate::channel::{ClientFrame, ConnectionHandle};
use crate::eventlog::{EventLog, LogLevel};
use crate::registry::{
    ExecutionError, RunOutcome, TestCase, TestDraft, TestRegistry, TestStatus,
};
use crate::telemetry;

/// Fixed spacing between runs in a batch pass, bounding remote load.
pub const BATCH_SPACING: Duration = Duration::from_millis(500);

/// Drives single and batch test runs.
pub struct TestRunner {
    registry: Arc<TestRegistry>,
    api: Arc<dyn HarnessApi>,
    channel: ConnectionHandle,
    log: Arc<EventLog>,
}

impl TestRunner {
    pub fn new(
        registry: Arc<TestRegistry>,
        api: Arc<dyn HarnessApi>,
        channel: ConnectionHandle,
        log: Arc<EventLog>,
    ) -> Self {
        Self {
            registry,
            api,
            channel,
            log,
        }
    }

    /// Execute one test end to end. Unknown ids and tests that are not
    /// eligible to start (already running or terminal) are a no-op, which
    /// makes overlapping triggers on the same id safe.
    #[instrument(skip(self))]
    pub async fn run_test(&self, id: &str) -> Option<TestStatus> {
        let Some(test) = self.registry.begin_run(id, Utc::now()) else {
            debug!(id, "run request ignored");
            return None;
        };

        self.log.record(
            LogLevel::Info,
            "system",
            format!("Starting test: {}", test.name),
        );
        // Per-test subscription rides the push channel when it is up; the
        // handle drops the frame otherwise.
        self.channel.send(ClientFrame::SubscribeTest {
            test_id: id.to_string(),
        });

        let outcome = match self.api.run_test(id, &test.config).await {
            Ok(outcome) => outcome,
            Err(err) => failed_outcome(&err),
        };

        Some(self.finish(id, &test.name, outcome))
    }

    /// Terminal step shared by the success and failure paths.
    fn finish(&self, id: &str, name: &str, outcome: RunOutcome) -> TestStatus {
        let status = if outcome.success {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };
        // finish_run republishes the summary.
        self.registry.finish_run(id, status, outcome, Utc::now());
        telemetry::record_run_completed(status == TestStatus::Passed);

        let (level, verdict) = match status {
            TestStatus::Passed => (LogLevel::Info, "PASSED"),
            _ => (LogLevel::Error, "FAILED"),
        };
        self.log
            .record(level, "system", format!("Test {name} {verdict}"));
        status
    }

    /// Run every test pending at call time, strictly sequentially, with
    /// [`BATCH_SPACING`] between runs. Tests created after the snapshot wait
    /// for the next pass. There is no mid-batch cancellation.
    pub async fn run_all(&self) -> usize {
        let pending = self.registry.pending_ids();
        for id in &pending {
            self.run_test(id).await;
            tokio::time::sleep(BATCH_SPACING).await;
        }
        pending.len()
    }

    /// Create a test on the harness (id assignment is server-side) and adopt
    /// the returned record.
    pub async fn create_test(&self, draft: TestDraft) -> Result<TestCase, ApiError> {
        let created = self.api.create_test(&draft).await?;
        self.registry.upsert(created.clone());
        self.log.record(
            LogLevel::Info,
            "system",
            format!("Created new test: {}", created.name),
        );
        Ok(created)
    }
}

/// Map any execution error to the structured failed outcome.
fn failed_outcome(err: &ApiError) -> RunOutcome {
    RunOutcome {
        success: false,
        message: format!("Error: {err}"),
        error: Some(ExecutionError::execution(
            err.to_string(),
            Some(format!("{err:?}")),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_outcome_carries_execution_error() {
        let err = ApiError::Status {
            status: reqwest::StatusCode::BAD_GATEWAY,
            body: "upstream down".to_string(),
        };
        let outcome = failed_outcome(&err);
        assert!(!outcome.success);
        let error = outcome.error.unwrap();
        assert_eq!(error.code, ExecutionError::EXECUTION_ERROR);
        assert!(error.message.contains("502"));
        assert!(error.trace.is_some());
    }
}
