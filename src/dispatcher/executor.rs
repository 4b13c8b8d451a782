use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::dispatcher::{
    Journal, RetryPolicy, RetrySchedule, TriggerClient, TriggerError, TriggerResponse,
};
use crate::types::{AttemptOutcome, DeliveryOutcome, DispatchAttempt, SyncRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The engine answered with a non-retryable status.
    Rejected { status: u16, body: String },
    InvalidRequest(String),
    RetriesExhausted { last_error: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Rejected { status, body } if body.is_empty() => {
                write!(f, "rejected with HTTP {status}")
            }
            FailureReason::Rejected { status, body } => {
                write!(f, "rejected with HTTP {status}: {body}")
            }
            FailureReason::InvalidRequest(message) => write!(f, "invalid request: {message}"),
            FailureReason::RetriesExhausted { last_error } => {
                write!(f, "retries exhausted: {last_error}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Succeeded,
    PermanentFailure(FailureReason),
    /// Shutdown interrupted the retry loop before a success was confirmed.
    Unknown,
}

/// Structured result of dispatching one admitted request.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub request: SyncRequest,
    pub attempts: u32,
    pub outcome: DispatchOutcome,
}

impl DispatchReport {
    pub fn delivery_outcome(&self) -> DeliveryOutcome {
        match &self.outcome {
            DispatchOutcome::Succeeded => DeliveryOutcome::Succeeded {
                attempts: self.attempts,
            },
            DispatchOutcome::PermanentFailure(reason) => DeliveryOutcome::PermanentlyFailed {
                attempts: self.attempts,
                reason: reason.to_string(),
            },
            DispatchOutcome::Unknown => DeliveryOutcome::Unknown,
        }
    }
}

/// Maps one trigger result onto the retry taxonomy.
pub fn classify_attempt(result: &Result<TriggerResponse, TriggerError>) -> AttemptOutcome {
    match result {
        Ok(response) if (200..300).contains(&response.status) => AttemptOutcome::Success,
        Ok(response) if response.status >= 500 => AttemptOutcome::TransientFailure,
        Ok(_) => AttemptOutcome::PermanentFailure,
        Err(err) if err.is_transient() => AttemptOutcome::TransientFailure,
        Err(_) => AttemptOutcome::PermanentFailure,
    }
}

/// Sends admitted requests downstream with bounded retry.
pub struct DispatchExecutor {
    client: Arc<dyn TriggerClient>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    attempts: Arc<Journal<DispatchAttempt>>,
}

impl DispatchExecutor {
    pub fn new(
        client: Arc<dyn TriggerClient>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
        attempts: Arc<Journal<DispatchAttempt>>,
    ) -> Self {
        Self {
            client,
            policy,
            clock,
            attempts,
        }
    }

    /// Calls the trigger until it succeeds, fails permanently, or the attempt
    /// cap is reached. A cancelled `shutdown` stops further back-off waits; an
    /// attempt already on the wire is allowed to finish.
    pub async fn execute(
        &self,
        request: SyncRequest,
        shutdown: &CancellationToken,
    ) -> DispatchReport {
        let mut schedule = RetrySchedule::new(self.policy.clone());

        loop {
            let attempt = schedule.start_attempt();
            let started_at = Utc::now();
            let started = self.clock.now();
            let result = self.client.trigger(&request).await;
            let latency = self.clock.now().saturating_duration_since(started);
            let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);

            let outcome = classify_attempt(&result);
            let (status, error) = match &result {
                Ok(response) => (
                    Some(response.status),
                    (outcome != AttemptOutcome::Success)
                        .then(|| format!("HTTP {}: {}", response.status, response.body)),
                ),
                Err(err) => (None, Some(err.to_string())),
            };

            tracing::info!(
                app = %request.target,
                attempt,
                ?outcome,
                status,
                latency_ms,
                "trigger attempt finished"
            );
            self.attempts.push(DispatchAttempt {
                delivery_id: request.delivery_id.clone(),
                target: request.target.clone(),
                attempt,
                outcome,
                status,
                error: error.clone(),
                latency_ms,
                started_at,
            });

            match (outcome, result) {
                (AttemptOutcome::Success, _) => {
                    return report(request, attempt, DispatchOutcome::Succeeded);
                }
                (AttemptOutcome::PermanentFailure, Ok(response)) => {
                    let reason = FailureReason::Rejected {
                        status: response.status,
                        body: response.body,
                    };
                    return report(request, attempt, DispatchOutcome::PermanentFailure(reason));
                }
                (AttemptOutcome::PermanentFailure, Err(err)) => {
                    let reason = FailureReason::InvalidRequest(err.to_string());
                    return report(request, attempt, DispatchOutcome::PermanentFailure(reason));
                }
                (AttemptOutcome::TransientFailure, _) => {}
            }

            let last_error = error.unwrap_or_else(|| "unknown error".to_string());
            let Some(delay) = schedule.next_delay(rand::random::<f64>()) else {
                let reason = FailureReason::RetriesExhausted { last_error };
                return report(request, attempt, DispatchOutcome::PermanentFailure(reason));
            };

            tracing::debug!(
                app = %request.target,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying trigger"
            );
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    return report(request, attempt, DispatchOutcome::Unknown);
                }
                () = self.clock.sleep(delay) => {}
            }
        }
    }
}

fn report(request: SyncRequest, attempts: u32, outcome: DispatchOutcome) -> DispatchReport {
    DispatchReport {
        request,
        attempts,
        outcome,
    }
}
