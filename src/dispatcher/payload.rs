use axum::{body::Bytes, http::HeaderMap};
use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::dispatcher::WebhookConfig;
use crate::types::WebhookEvent;

#[derive(Debug, Error)]
pub enum MalformedPayload {
    #[error("body is not valid JSON: {0}")]
    NotJson(String),
    #[error("body must be a JSON object")]
    NotAnObject,
}

/// Builds a [`WebhookEvent`] from the raw delivery.
///
/// Only a body that is not a JSON object fails here. Every push field is read
/// leniently: a missing or oddly shaped field is left empty and the classifier
/// decides what that means once the signature has been checked.
pub fn parse_event(
    config: &WebhookConfig,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<WebhookEvent, MalformedPayload> {
    let value: Value =
        serde_json::from_slice(&body).map_err(|err| MalformedPayload::NotJson(err.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(MalformedPayload::NotAnObject);
    };

    let commit_sha = text(fields.get("after"))
        .or_else(|| text(fields.get("sha")))
        .or_else(|| text(fields.get("head_commit").and_then(|commit| commit.get("id"))))
        .map(str::to_string);
    let deleted = fields
        .get("deleted")
        .and_then(Value::as_bool)
        .unwrap_or(false)
        || commit_sha
            .as_deref()
            .is_some_and(|sha| sha.chars().all(|c| c == '0'));

    let delivery_id = header_value(headers, &config.delivery_header)
        .or_else(|| text(fields.get("delivery_id")).map(str::to_string))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Ok(WebhookEvent {
        delivery_id,
        event_type: header_value(headers, &config.event_header),
        repository: repository(&fields),
        git_ref: text(fields.get("ref")).map(str::to_string),
        commit_sha,
        deleted,
        changed_paths: changed_paths(fields.get("commits")),
        signature: header_value(headers, &config.signature_header),
        payload: body,
        received_at: Utc::now(),
    })
}

/// `"repository": "name"` or `{"full_name": .., "name": ..}`.
fn repository(fields: &Map<String, Value>) -> Option<String> {
    let name = match fields.get("repository")? {
        Value::String(name) => Some(name.trim()).filter(|name| !name.is_empty()),
        Value::Object(repo) => text(repo.get("full_name")).or_else(|| text(repo.get("name"))),
        _ => None,
    };
    name.map(str::to_string)
}

/// Sorted union of the files added, modified or removed by the pushed commits.
fn changed_paths(commits: Option<&Value>) -> Option<Vec<String>> {
    let commits = commits?.as_array().filter(|commits| !commits.is_empty())?;
    let mut paths: Vec<String> = commits
        .iter()
        .flat_map(|commit| {
            ["added", "modified", "removed"]
                .into_iter()
                .filter_map(move |key| commit.get(key).and_then(Value::as_array))
        })
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect();
    paths.sort();
    paths.dedup();
    Some(paths)
}

fn text(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
