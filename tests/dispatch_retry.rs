#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sync_dispatcher::{
    clock::ManualClock,
    dispatcher::{
        DispatchExecutor, DispatchOutcome, FailureReason, Journal, RetryPolicy, TriggerClient,
        TriggerError, TriggerResponse, classify_attempt,
    },
    types::{AttemptOutcome, DeliveryOutcome, DispatchAttempt, SyncRequest, TargetApp},
};
use tokio_util::sync::CancellationToken;

type Scripted = Result<TriggerResponse, TriggerError>;

struct ScriptedClient {
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicU32,
}

impl ScriptedClient {
    fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TriggerClient for ScriptedClient {
    async fn trigger(&self, _request: &SyncRequest) -> Result<TriggerResponse, TriggerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(status(200)))
    }
}

fn status(code: u16) -> TriggerResponse {
    TriggerResponse {
        status: code,
        body: String::new(),
    }
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(100),
        factor: 2.0,
        max_delay: Duration::from_secs(10),
        jitter: 0.0,
    }
}

fn request() -> SyncRequest {
    SyncRequest {
        target: TargetApp::new("T").unwrap(),
        repository: "app".to_string(),
        git_ref: "refs/heads/main".to_string(),
        commit_sha: Some("abc123".to_string()),
        delivery_id: "d-1".to_string(),
        created_at: Utc::now(),
    }
}

struct Harness {
    executor: DispatchExecutor,
    client: Arc<ScriptedClient>,
    clock: Arc<ManualClock>,
    attempts: Arc<Journal<DispatchAttempt>>,
}

fn harness(max_attempts: u32, script: Vec<Scripted>) -> Harness {
    let client = ScriptedClient::new(script);
    let clock = Arc::new(ManualClock::new());
    let attempts = Arc::new(Journal::new(64));
    let executor = DispatchExecutor::new(
        client.clone(),
        policy(max_attempts),
        clock.clone(),
        attempts.clone(),
    );
    Harness {
        executor,
        client,
        clock,
        attempts,
    }
}

#[tokio::test]
async fn succeeds_on_fourth_attempt_when_cap_allows() {
    let h = harness(
        4,
        vec![Ok(status(503)), Ok(status(502)), Ok(status(500)), Ok(status(200))],
    );

    let report = h.executor.execute(request(), &CancellationToken::new()).await;

    assert_eq!(report.outcome, DispatchOutcome::Succeeded);
    assert_eq!(report.attempts, 4);
    assert_eq!(h.client.calls(), 4);
    assert_eq!(
        h.clock.sleeps(),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400)
        ]
    );
    assert_eq!(
        report.delivery_outcome(),
        DeliveryOutcome::Succeeded { attempts: 4 }
    );
}

#[tokio::test]
async fn gives_up_after_cap_without_extra_call() {
    let h = harness(
        3,
        vec![Ok(status(503)), Ok(status(503)), Ok(status(503)), Ok(status(200))],
    );

    let report = h.executor.execute(request(), &CancellationToken::new()).await;

    assert_eq!(report.attempts, 3);
    assert_eq!(h.client.calls(), 3);
    assert_eq!(h.clock.sleeps().len(), 2);
    match report.outcome {
        DispatchOutcome::PermanentFailure(FailureReason::RetriesExhausted { last_error }) => {
            assert!(last_error.contains("503"), "last error: {last_error}");
        }
        other => panic!("expected retries exhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let h = harness(3, vec![Ok(status(404))]);

    let report = h.executor.execute(request(), &CancellationToken::new()).await;

    assert_eq!(report.attempts, 1);
    assert_eq!(h.client.calls(), 1);
    assert!(h.clock.sleeps().is_empty());
    assert!(matches!(
        report.outcome,
        DispatchOutcome::PermanentFailure(FailureReason::Rejected { status: 404, .. })
    ));
    assert!(matches!(
        report.delivery_outcome(),
        DeliveryOutcome::PermanentlyFailed { attempts: 1, .. }
    ));
}

#[tokio::test]
async fn network_errors_are_retried() {
    let h = harness(
        3,
        vec![
            Err(TriggerError::Network("connection refused".to_string())),
            Err(TriggerError::Timeout),
            Ok(status(204)),
        ],
    );

    let report = h.executor.execute(request(), &CancellationToken::new()).await;

    assert_eq!(report.outcome, DispatchOutcome::Succeeded);
    assert_eq!(report.attempts, 3);
}

#[tokio::test]
async fn unbuildable_request_fails_immediately() {
    let h = harness(
        3,
        vec![Err(TriggerError::InvalidRequest("bad url".to_string()))],
    );

    let report = h.executor.execute(request(), &CancellationToken::new()).await;

    assert_eq!(report.attempts, 1);
    assert!(matches!(
        report.outcome,
        DispatchOutcome::PermanentFailure(FailureReason::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn shutdown_during_backoff_reports_unknown() {
    let h = harness(3, vec![Ok(status(503)), Ok(status(200))]);
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let report = h.executor.execute(request(), &shutdown).await;

    assert_eq!(report.outcome, DispatchOutcome::Unknown);
    assert_eq!(report.attempts, 1);
    assert_eq!(h.client.calls(), 1);
    assert_eq!(report.delivery_outcome(), DeliveryOutcome::Unknown);
}

#[tokio::test]
async fn every_attempt_is_journaled() {
    let h = harness(3, vec![Ok(status(500)), Ok(status(200))]);

    h.executor.execute(request(), &CancellationToken::new()).await;

    let attempts = h.attempts.recent(64);
    assert_eq!(attempts.len(), 2);
    // newest first
    assert_eq!(attempts[0].attempt, 2);
    assert_eq!(attempts[0].outcome, AttemptOutcome::Success);
    assert_eq!(attempts[0].status, Some(200));
    assert_eq!(attempts[0].error, None);
    assert_eq!(attempts[1].attempt, 1);
    assert_eq!(attempts[1].outcome, AttemptOutcome::TransientFailure);
    assert_eq!(attempts[1].target.as_str(), "T");
    assert!(attempts[1].error.as_deref().unwrap().contains("500"));
}

#[test]
fn status_taxonomy() {
    let cases = [
        (200, AttemptOutcome::Success),
        (204, AttemptOutcome::Success),
        (302, AttemptOutcome::PermanentFailure),
        (400, AttemptOutcome::PermanentFailure),
        (404, AttemptOutcome::PermanentFailure),
        (429, AttemptOutcome::PermanentFailure),
        (500, AttemptOutcome::TransientFailure),
        (503, AttemptOutcome::TransientFailure),
    ];
    for (code, expected) in cases {
        assert_eq!(classify_attempt(&Ok(status(code))), expected, "HTTP {code}");
    }
    assert_eq!(
        classify_attempt(&Err(TriggerError::Timeout)),
        AttemptOutcome::TransientFailure
    );
    assert_eq!(
        classify_attempt(&Err(TriggerError::InvalidRequest("x".to_string()))),
        AttemptOutcome::PermanentFailure
    );
}
