use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TargetApp;

/// Why a verified delivery did not produce any sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    NonPushEvent { event_type: String },
    MissingEventType,
    MissingRepository,
    MissingRef,
    BranchDeleted,
    UntrackedRepository,
    UntrackedRef,
    NoMatchingPaths,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NonPushEvent { event_type } => write!(f, "non-push event '{event_type}'"),
            SkipReason::MissingEventType => f.write_str("missing event type"),
            SkipReason::MissingRepository => f.write_str("no repository in payload"),
            SkipReason::MissingRef => f.write_str("missing ref"),
            SkipReason::BranchDeleted => f.write_str("ref deleted"),
            SkipReason::UntrackedRepository => f.write_str("untracked repository"),
            SkipReason::UntrackedRef => f.write_str("untracked ref"),
            SkipReason::NoMatchingPaths => f.write_str("no changed path under a tracked prefix"),
        }
    }
}

/// Terminal state of a delivery (or of one of its per-target requests).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Signature did not verify.
    Rejected,
    Skipped { reason: SkipReason },
    /// Coalesced into the trigger caused by `by_delivery`.
    Superseded { by_delivery: Option<String> },
    Succeeded { attempts: u32 },
    PermanentlyFailed { attempts: u32, reason: String },
    /// Not confirmed before shutdown; safe to re-trigger.
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub delivery_id: String,
    pub repository: Option<String>,
    pub git_ref: Option<String>,
    pub commit_sha: Option<String>,
    pub target: Option<TargetApp>,
    pub outcome: DeliveryOutcome,
    pub recorded_at: DateTime<Utc>,
}
