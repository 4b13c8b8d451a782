pub mod api_error;
pub mod delivery_record;
pub mod dispatch_attempt;
pub mod inspector;
pub mod sync_request;
pub mod webhook_event;

pub use api_error::{ApiErrorCode, ApiErrorResponse};
pub use delivery_record::{DeliveryOutcome, DeliveryRecord, SkipReason};
pub use dispatch_attempt::{AttemptOutcome, DispatchAttempt};
pub use inspector::{HealthResponse, ListAttemptsResponse, ListDeliveriesResponse, WebhookAck};
pub use sync_request::{SyncRequest, TargetApp};
pub use webhook_event::WebhookEvent;
