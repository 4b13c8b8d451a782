mod classify;
mod config;
mod executor;
mod gate;
mod journal;
mod payload;
mod pipeline;
mod retry;
mod signature;
mod trigger;

pub use classify::{Classification, EventClassifier};
pub use config::{
    ConfigError, DispatcherConfig, DownstreamConfig, TargetMapping, WebhookConfig, normalize_ref,
    parse_targets,
};
pub use executor::{
    DispatchExecutor, DispatchOutcome, DispatchReport, FailureReason, classify_attempt,
};
pub use gate::{DedupeWindow, GateDecision, Ticket};
pub use journal::Journal;
pub use payload::{MalformedPayload, parse_event};
pub use pipeline::{GateResult, Pipeline, ProcessOutcome};
pub use retry::{RetryPolicy, RetrySchedule};
pub use signature::{
    SignatureCheck, VerifiedEvent, constant_time_eq, sign, verify_event, verify_signature,
};
pub use trigger::{HttpTriggerClient, TriggerClient, TriggerError, TriggerResponse};
