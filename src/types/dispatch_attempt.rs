use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TargetApp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    PermanentFailure,
}

/// One outbound trigger call. Kept in memory for retry accounting and inspection only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchAttempt {
    pub delivery_id: String,
    pub target: TargetApp,
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: u64,
    pub started_at: DateTime<Utc>,
}
