use std::collections::HashMap;

use chrono::Utc;

use crate::dispatcher::{TargetMapping, VerifiedEvent};
use crate::types::{SkipReason, SyncRequest, TargetApp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// One request per matching target; never empty.
    Accept(Vec<SyncRequest>),
    Skip(SkipReason),
}

/// Decides whether a verified delivery is a push to a tracked ref.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    routes: HashMap<String, Vec<TargetMapping>>,
}

impl EventClassifier {
    pub fn new(mappings: &[TargetMapping]) -> Self {
        let mut routes: HashMap<String, Vec<TargetMapping>> = HashMap::new();
        for mapping in mappings {
            routes
                .entry(mapping.repository.clone())
                .or_default()
                .push(mapping.clone());
        }
        Self { routes }
    }

    pub fn classify(&self, event: &VerifiedEvent<'_>) -> Classification {
        let event_type = match event.event_type.as_deref() {
            None => return Classification::Skip(SkipReason::MissingEventType),
            Some(kind) if !is_push(kind) => {
                return Classification::Skip(SkipReason::NonPushEvent {
                    event_type: kind.to_string(),
                });
            }
            Some(kind) => kind,
        };
        tracing::debug!(event_type, "classifying push");

        let Some(repository) = event.repository.as_deref() else {
            return Classification::Skip(SkipReason::MissingRepository);
        };
        let Some(git_ref) = event.git_ref.as_deref() else {
            return Classification::Skip(SkipReason::MissingRef);
        };
        if event.deleted {
            return Classification::Skip(SkipReason::BranchDeleted);
        }

        let Some(routes) = self.routes.get(&repository.to_ascii_lowercase()) else {
            return Classification::Skip(SkipReason::UntrackedRepository);
        };

        let on_ref: Vec<&TargetMapping> = routes
            .iter()
            .filter(|mapping| mapping.git_ref == git_ref)
            .collect();
        if on_ref.is_empty() {
            return Classification::Skip(SkipReason::UntrackedRef);
        }

        let mut targets: Vec<&TargetApp> = on_ref
            .into_iter()
            .filter(|mapping| {
                touches_prefix(mapping.path_prefix.as_deref(), event.changed_paths.as_deref())
            })
            .map(|mapping| &mapping.target)
            .collect();
        targets.sort();
        targets.dedup();
        if targets.is_empty() {
            return Classification::Skip(SkipReason::NoMatchingPaths);
        }

        let created_at = Utc::now();
        Classification::Accept(
            targets
                .into_iter()
                .map(|target| SyncRequest {
                    target: target.clone(),
                    repository: repository.to_string(),
                    git_ref: git_ref.to_string(),
                    commit_sha: event.commit_sha.clone(),
                    delivery_id: event.delivery_id.clone(),
                    created_at,
                })
                .collect(),
        )
    }
}

// GitHub and Gitea send "push"; GitLab sends "Push Hook".
fn is_push(kind: &str) -> bool {
    kind.eq_ignore_ascii_case("push") || kind.eq_ignore_ascii_case("push hook")
}

/// A mapping without a prefix always matches, as does a payload without file lists.
fn touches_prefix(prefix: Option<&str>, changed: Option<&[String]>) -> bool {
    let (Some(prefix), Some(changed)) = (prefix, changed) else {
        return true;
    };
    changed.iter().any(|path| {
        path.strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}
