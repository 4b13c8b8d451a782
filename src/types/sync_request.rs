use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Downstream-managed deployable unit a (repository, ref) pair maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetApp(String);

impl TargetApp {
    /// Creates a new identifier, returning `None` if the value is blank.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TargetApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized unit of work derived from an accepted push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub target: TargetApp,
    pub repository: String,
    pub git_ref: String,
    pub commit_sha: Option<String>,
    /// Delivery that caused this request.
    pub delivery_id: String,
    pub created_at: DateTime<Utc>,
}
