//! Tests for inbound frame dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use qshield_monitor::api::{ApiError, HarnessApi};
use qshield_monitor::channel::MessageRouter;
use qshield_monitor::eventlog::{EventLog, LogLevel};
use qshield_monitor::registry::{
    default_catalog, RunOutcome, TestCase, TestConfig, TestDraft, TestRegistry, TestStatus,
};
use qshield_monitor::system::{SessionInfo, SystemCache, SystemMetrics};

/// API double that serves a canned metrics snapshot and counts the calls.
struct StubApi {
    metrics_calls: AtomicUsize,
}

impl StubApi {
    fn new() -> Self {
        Self {
            metrics_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HarnessApi for StubApi {
    async fn list_tests(&self) -> Result<Vec<TestCase>, ApiError> {
        Ok(Vec::new())
    }

    async fn create_test(&self, _draft: &TestDraft) -> Result<TestCase, ApiError> {
        unreachable!("router never creates tests")
    }

    async fn run_test(&self, _id: &str, _config: &TestConfig) -> Result<RunOutcome, ApiError> {
        unreachable!("router never runs tests")
    }

    async fn system_metrics(&self) -> Result<SystemMetrics, ApiError> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SystemMetrics {
            total_handshakes: 42,
            ..SystemMetrics::default()
        })
    }

    async fn sessions(&self) -> Result<Vec<SessionInfo>, ApiError> {
        Ok(Vec::new())
    }
}

struct Fixture {
    registry: Arc<TestRegistry>,
    log: Arc<EventLog>,
    cache: Arc<SystemCache>,
    api: Arc<StubApi>,
    router: MessageRouter,
}

fn fixture() -> Fixture {
    let registry = Arc::new(TestRegistry::new());
    let log = Arc::new(EventLog::new());
    let cache = Arc::new(SystemCache::new());
    let api = Arc::new(StubApi::new());
    let router = MessageRouter::new(
        Arc::clone(&registry),
        Arc::clone(&log),
        Arc::clone(&cache),
        api.clone(),
    );
    Fixture {
        registry,
        log,
        cache,
        api,
        router,
    }
}

#[tokio::test]
async fn status_update_transitions_the_test() {
    let f = fixture();
    f.registry.load(default_catalog());

    f.router
        .route(r#"{"type":"test_status_update","data":{"testId":"test-1","status":"running"}}"#)
        .await;

    assert_eq!(f.registry.get("test-1").unwrap().status, TestStatus::Running);
}

#[tokio::test]
async fn status_update_with_illegal_edge_is_ignored() {
    let f = fixture();
    f.registry.load(default_catalog());

    f.router
        .route(r#"{"type":"test_status_update","data":{"testId":"test-1","status":"passed"}}"#)
        .await;

    // Pending cannot jump straight to passed.
    assert_eq!(f.registry.get("test-1").unwrap().status, TestStatus::Pending);
}

#[tokio::test]
async fn test_created_upserts_the_record() {
    let f = fixture();

    f.router
        .route(
            r#"{"type":"test_created","data":{"id":"test-9","type":"security","name":"Fresh","description":"","status":"pending","config":{"kemAlgorithm":"Kyber768","signatureAlgorithm":"Dilithium3"}}}"#,
        )
        .await;

    let created = f.registry.get("test-9").unwrap();
    assert_eq!(created.name, "Fresh");
    assert_eq!(f.registry.summary().total, 1);
}

#[tokio::test]
async fn log_frame_lands_in_the_feed() {
    let f = fixture();

    f.router
        .route(r#"{"type":"log","data":{"level":"error","source":"server","message":"handshake aborted"}}"#)
        .await;

    let entries = f.log.snapshot();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, LogLevel::Error);
    assert_eq!(entries[0].message, "handshake aborted");
}

#[tokio::test]
async fn test_event_is_formatted_into_the_feed() {
    let f = fixture();

    f.router
        .route(
            r#"{"type":"test_event","data":{"source":"kemtls","phase":"handshake","type":"kem_decapsulation","data":{"message":"shared secret derived"}}}"#,
        )
        .await;

    let entries = f.log.snapshot();
    assert_eq!(
        entries[0].message,
        "[handshake] kem_decapsulation: shared secret derived"
    );
    assert_eq!(entries[0].source, "kemtls");
}

#[tokio::test]
async fn system_state_update_caches_state_and_refreshes_metrics() {
    let f = fixture();

    f.router
        .route(
            r#"{"type":"system_state_update","data":{"transport":"KEMTLS","kem":"Kyber768","signature":"Dilithium3","hash":"SHA3-256"}}"#,
        )
        .await;

    assert_eq!(f.cache.state().transport.as_deref(), Some("KEMTLS"));
    assert_eq!(f.api.metrics_calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.cache.metrics().unwrap().total_handshakes, 42);
}

#[tokio::test]
async fn unknown_frame_type_is_a_no_op() {
    let f = fixture();
    f.registry.load(default_catalog());

    f.router
        .route(r#"{"type":"telemetry_v2","data":{"whatever":true}}"#)
        .await;

    assert!(f.log.is_empty());
    assert_eq!(f.registry.summary().total, 6);
    assert_eq!(f.api.metrics_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_frame_only_costs_itself() {
    let f = fixture();
    f.registry.load(default_catalog());

    // Envelope parse failure, then a payload that does not match its type,
    // then a well-formed frame. The last one must still apply.
    f.router.route("{{{ not json").await;
    f.router
        .route(r#"{"type":"test_status_update","data":{"status":[1,2,3]}}"#)
        .await;
    f.router
        .route(r#"{"type":"test_status_update","data":{"testId":"test-2","status":"running"}}"#)
        .await;

    assert_eq!(f.registry.get("test-2").unwrap().status, TestStatus::Running);
}

#[tokio::test]
async fn frames_apply_in_arrival_order() {
    let f = fixture();
    f.registry.load(default_catalog());

    f.router
        .route(r#"{"type":"test_status_update","data":{"testId":"test-3","status":"running"}}"#)
        .await;
    f.router
        .route(r#"{"type":"test_status_update","data":{"testId":"test-3","status":"failed"}}"#)
        .await;

    let summary = f.registry.summary();
    assert_eq!(f.registry.get("test-3").unwrap().status, TestStatus::Failed);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.running, 0);
}
