use axum::body::Bytes;
use chrono::{DateTime, Utc};

/// An inbound push notification as received by the front door.
///
/// Built once by the delivery extractor and never mutated afterwards. `payload`
/// keeps the exact bytes the sender signed.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub delivery_id: String,
    pub event_type: Option<String>,
    /// Absent for organization- or app-level events.
    pub repository: Option<String>,
    pub git_ref: Option<String>,
    pub commit_sha: Option<String>,
    /// Push removed the ref (explicit flag or an all-zero head SHA).
    pub deleted: bool,
    /// Files touched by the pushed commits, when the sender lists them.
    pub changed_paths: Option<Vec<String>>,
    pub signature: Option<String>,
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}
