use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::clock::Clock;
use crate::dispatcher::{
    Classification, DedupeWindow, DispatchExecutor, DispatchOutcome, DispatchReport,
    DispatcherConfig, EventClassifier, GateDecision, Journal, Ticket, TriggerClient,
    verify_event,
};
use crate::observability::{delivery_span, dispatch_span};
use crate::types::{
    DeliveryOutcome, DeliveryRecord, DispatchAttempt, SkipReason, SyncRequest, TargetApp,
    WebhookEvent,
};

/// What happened to a delivery before any dispatch started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Rejected,
    Skipped(SkipReason),
    Gated(Vec<GateResult>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    Admitted(TargetApp),
    /// Took over a pending request for the target.
    Coalesced(TargetApp),
    Superseded(TargetApp),
}

type InFlightKey = (String, TargetApp);

/// Verify → classify → gate → dispatch, for every delivery.
///
/// Owns the debounce state and every task it spawns; [`Pipeline::shutdown`]
/// tears all of it down.
pub struct Pipeline {
    config: DispatcherConfig,
    classifier: EventClassifier,
    gate: DedupeWindow,
    executor: DispatchExecutor,
    deliveries: Journal<DeliveryRecord>,
    attempts: Arc<Journal<DispatchAttempt>>,
    in_flight: Mutex<HashMap<InFlightKey, SyncRequest>>,
    clock: Arc<dyn Clock>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Pipeline {
    /// Builds the pipeline and starts the idle-entry sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: DispatcherConfig,
        client: Arc<dyn TriggerClient>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let attempts = Arc::new(Journal::new(config.journal_capacity));
        let pipeline = Arc::new(Self {
            classifier: EventClassifier::new(&config.targets),
            gate: DedupeWindow::new(config.debounce, config.idle_ttl, Arc::clone(&clock)),
            executor: DispatchExecutor::new(
                client,
                config.retry.clone(),
                Arc::clone(&clock),
                Arc::clone(&attempts),
            ),
            deliveries: Journal::new(config.journal_capacity),
            attempts,
            in_flight: Mutex::new(HashMap::new()),
            clock,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            config,
        });
        pipeline.spawn_sweeper();
        pipeline
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Delivery outcomes, newest first.
    pub fn deliveries(&self, limit: usize) -> Vec<DeliveryRecord> {
        self.deliveries.recent(limit)
    }

    /// Trigger attempts, newest first.
    pub fn attempts(&self, limit: usize) -> Vec<DispatchAttempt> {
        self.attempts.recent(limit)
    }

    pub fn journal_capacity(&self) -> usize {
        self.deliveries.capacity()
    }

    /// Hands a delivery to a background task and returns immediately.
    pub fn accept(self: &Arc<Self>, event: WebhookEvent) {
        let span = delivery_span(&event.delivery_id, event.repository.as_deref());
        let pipeline = Arc::clone(self);
        self.tracker.spawn(
            async move {
                pipeline.process(event).await;
            }
            .instrument(span),
        );
    }

    /// Runs verification, classification and gating for one delivery.
    ///
    /// Admitted requests are dispatched on their own tasks; this returns as
    /// soon as every target has a gate decision.
    pub async fn process(self: &Arc<Self>, event: WebhookEvent) -> ProcessOutcome {
        let Some(verified) = verify_event(self.config.webhook.secret.as_bytes(), &event) else {
            tracing::warn!("signature verification failed; delivery ignored");
            self.record_event(&event, DeliveryOutcome::Rejected);
            return ProcessOutcome::Rejected;
        };

        let requests = match self.classifier.classify(&verified) {
            Classification::Skip(reason) => {
                tracing::info!(%reason, "delivery skipped");
                self.record_event(
                    &event,
                    DeliveryOutcome::Skipped {
                        reason: reason.clone(),
                    },
                );
                return ProcessOutcome::Skipped(reason);
            }
            Classification::Accept(requests) => requests,
        };

        let results = requests
            .into_iter()
            .map(|request| self.gate_request(request))
            .collect();
        ProcessOutcome::Gated(results)
    }

    fn gate_request(self: &Arc<Self>, request: SyncRequest) -> GateResult {
        let target = request.target.clone();
        let delivery_id = request.delivery_id.clone();
        match self.gate.offer(request) {
            GateDecision::Admit(ticket) => {
                tracing::info!(app = %target, "sync request admitted");
                self.schedule_dispatch(ticket);
                GateResult::Admitted(target)
            }
            GateDecision::Coalesce { superseded } => {
                tracing::info!(
                    app = %target,
                    superseded_delivery = %superseded.delivery_id,
                    "pending sync request superseded by newer push"
                );
                self.record_request(
                    &superseded,
                    DeliveryOutcome::Superseded {
                        by_delivery: Some(delivery_id),
                    },
                );
                GateResult::Coalesced(target)
            }
            GateDecision::Supersede {
                request,
                dispatched,
            } => {
                tracing::info!(
                    app = %target,
                    dispatched_delivery = dispatched.as_deref().unwrap_or("-"),
                    "sync request coalesced into recent trigger"
                );
                self.record_request(
                    &request,
                    DeliveryOutcome::Superseded {
                        by_delivery: dispatched,
                    },
                );
                GateResult::Superseded(target)
            }
        }
    }

    fn schedule_dispatch(self: &Arc<Self>, ticket: Ticket) {
        let pipeline = Arc::clone(self);
        let span = tracing::info_span!("settle", app = %ticket.target);
        self.tracker.spawn(
            async move {
                tokio::select! {
                    biased;
                    () = pipeline.shutdown.cancelled() => {}
                    () = pipeline.clock.sleep(pipeline.config.settle) => {}
                }

                let Some(request) = pipeline.gate.take(&ticket) else {
                    return;
                };
                let key = (request.delivery_id.clone(), request.target.clone());
                pipeline.in_flight.lock().insert(key.clone(), request.clone());

                let span = dispatch_span(&request.delivery_id, request.target.as_str());
                let report = pipeline
                    .executor
                    .execute(request, &pipeline.shutdown)
                    .instrument(span)
                    .await;
                pipeline.gate.complete(&ticket);

                if pipeline.in_flight.lock().remove(&key).is_some() {
                    pipeline.finish(&report);
                }
            }
            .instrument(span),
        );
    }

    fn finish(&self, report: &DispatchReport) {
        let request = &report.request;
        match &report.outcome {
            DispatchOutcome::Succeeded => {
                tracing::info!(app = %request.target, attempts = report.attempts, "sync triggered");
            }
            DispatchOutcome::PermanentFailure(reason) => {
                tracing::error!(
                    app = %request.target,
                    delivery_id = %request.delivery_id,
                    commit = request.commit_sha.as_deref().unwrap_or("-"),
                    attempts = report.attempts,
                    last_error = %reason,
                    "sync trigger failed permanently"
                );
            }
            DispatchOutcome::Unknown => {
                tracing::warn!(
                    app = %request.target,
                    attempts = report.attempts,
                    "sync trigger unconfirmed at shutdown; safe to re-trigger"
                );
            }
        }
        self.record_request(request, report.delivery_outcome());
    }

    /// Stops accepting new back-off waits, sends anything still settling, and
    /// waits up to `grace` for in-flight dispatches.
    ///
    /// Whatever has not finished by then is recorded as unknown.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.cancel();
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            return;
        }

        let abandoned: Vec<SyncRequest> = self
            .in_flight
            .lock()
            .drain()
            .map(|(_, request)| request)
            .collect();
        for request in abandoned {
            tracing::warn!(
                app = %request.target,
                delivery_id = %request.delivery_id,
                "dispatch abandoned after shutdown grace; safe to re-trigger"
            );
            self.record_request(&request, DeliveryOutcome::Unknown);
        }
    }

    fn spawn_sweeper(self: &Arc<Self>) {
        let pipeline = Arc::downgrade(self);
        let shutdown = self.shutdown.clone();
        let period = (self.config.idle_ttl / 4).max(Duration::from_secs(1));

        // Paced by the runtime timer; eviction itself reads the pipeline clock.
        self.tracker.spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.tick().await;
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    _ = ticks.tick() => {}
                }
                let Some(pipeline) = pipeline.upgrade() else {
                    break;
                };
                let evicted = pipeline.gate.evict_idle();
                if evicted > 0 {
                    tracing::debug!(
                        evicted,
                        remaining = pipeline.gate.tracked_targets(),
                        "evicted idle debounce entries"
                    );
                }
            }
        });
    }

    fn record_event(&self, event: &WebhookEvent, outcome: DeliveryOutcome) {
        self.deliveries.push(DeliveryRecord {
            delivery_id: event.delivery_id.clone(),
            repository: event.repository.clone(),
            git_ref: event.git_ref.clone(),
            commit_sha: event.commit_sha.clone(),
            target: None,
            outcome,
            recorded_at: Utc::now(),
        });
    }

    fn record_request(&self, request: &SyncRequest, outcome: DeliveryOutcome) {
        self.deliveries.push(DeliveryRecord {
            delivery_id: request.delivery_id.clone(),
            repository: Some(request.repository.clone()),
            git_ref: Some(request.git_ref.clone()),
            commit_sha: request.commit_sha.clone(),
            target: Some(request.target.clone()),
            outcome,
            recorded_at: Utc::now(),
        });
    }
}
