use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use thiserror::Error;

use crate::dispatcher::DownstreamConfig;
use crate::types::{SyncRequest, TargetApp};

const MAX_BODY_CHARS: usize = 512;

/// Unreserved characters stay as-is; everything else is escaped so an
/// application name always fills exactly one path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerResponse {
    pub status: u16,
    /// Response body, truncated for logging.
    pub body: String,
}

#[derive(Debug, Clone, Error)]
pub enum TriggerError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("could not build trigger request: {0}")]
    InvalidRequest(String),
}

impl TriggerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TriggerError::Timeout | TriggerError::Network(_))
    }
}

/// The downstream engine's "sync now" operation.
#[async_trait]
pub trait TriggerClient: Send + Sync {
    async fn trigger(&self, request: &SyncRequest) -> Result<TriggerResponse, TriggerError>;
}

#[derive(Serialize)]
struct SyncBody<'a> {
    prune: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    revision: Option<&'a str>,
    infos: Vec<SyncInfo<'a>>,
}

#[derive(Serialize)]
struct SyncInfo<'a> {
    name: &'static str,
    value: &'a str,
}

/// Calls `POST {base_url}{trigger_path}` on the reconciliation engine.
#[derive(Debug, Clone)]
pub struct HttpTriggerClient {
    http: reqwest::Client,
    config: DownstreamConfig,
}

impl HttpTriggerClient {
    pub fn new(config: DownstreamConfig) -> Result<Self, TriggerError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| TriggerError::InvalidRequest(err.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn trigger_url(&self, target: &TargetApp) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.trigger_path.replace(
                "{app}",
                &utf8_percent_encode(target.as_str(), PATH_SEGMENT).to_string()
            )
        )
    }
}

#[async_trait]
impl TriggerClient for HttpTriggerClient {
    async fn trigger(&self, request: &SyncRequest) -> Result<TriggerResponse, TriggerError> {
        let mut infos = vec![
            SyncInfo {
                name: "ref",
                value: &request.git_ref,
            },
            SyncInfo {
                name: "delivery",
                value: &request.delivery_id,
            },
        ];
        if let Some(sha) = request.commit_sha.as_deref() {
            infos.push(SyncInfo {
                name: "commit",
                value: sha,
            });
        }
        let body = SyncBody {
            prune: false,
            revision: if self.config.pin_revision {
                request.commit_sha.as_deref()
            } else {
                None
            },
            infos,
        };

        let mut builder = self
            .http
            .post(self.trigger_url(&request.target))
            .json(&body);
        if let Some(token) = &self.config.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();

        Ok(TriggerResponse {
            status,
            body: text.chars().take(MAX_BODY_CHARS).collect(),
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TriggerError {
    if err.is_timeout() {
        TriggerError::Timeout
    } else if err.is_builder() {
        TriggerError::InvalidRequest(err.to_string())
    } else {
        TriggerError::Network(err.to_string())
    }
}
