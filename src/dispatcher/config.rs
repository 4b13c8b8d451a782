use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::dispatcher::RetryPolicy;
use crate::observability::LogFormat;
use crate::types::TargetApp;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// One `<repository>@<ref>[:<path>]=<application>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMapping {
    /// Lower-cased repository identifier.
    pub repository: String,
    /// Fully qualified ref, e.g. `refs/heads/main`.
    pub git_ref: String,
    pub path_prefix: Option<String>,
    pub target: TargetApp,
}

#[derive(Clone)]
pub struct WebhookConfig {
    pub path: String,
    pub secret: String,
    pub signature_header: String,
    pub event_header: String,
    pub delivery_header: String,
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("path", &self.path)
            .field("secret", &"<redacted>")
            .field("signature_header", &self.signature_header)
            .field("event_header", &self.event_header)
            .field("delivery_header", &self.delivery_header)
            .finish()
    }
}

#[derive(Clone)]
pub struct DownstreamConfig {
    pub base_url: String,
    pub token: Option<String>,
    /// Path template; `{app}` is replaced by the target application.
    pub trigger_path: String,
    /// Send the commit SHA as the sync revision instead of letting the engine resolve it.
    pub pin_revision: bool,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for DownstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownstreamConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("trigger_path", &self.trigger_path)
            .field("pin_revision", &self.pin_revision)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Clone)]
pub struct DispatcherConfig {
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
    /// Bearer token guarding `/internal/*`; open when unset.
    pub inspector_token: Option<String>,
    pub webhook: WebhookConfig,
    pub targets: Vec<TargetMapping>,
    pub debounce: Duration,
    /// How long an admitted request waits for newer pushes before it is sent.
    pub settle: Duration,
    pub idle_ttl: Duration,
    pub retry: RetryPolicy,
    pub downstream: DownstreamConfig,
    pub shutdown_grace: Duration,
    pub journal_capacity: usize,
}

impl std::fmt::Debug for DispatcherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherConfig")
            .field("bind_addr", &self.bind_addr)
            .field("log_format", &self.log_format)
            .field(
                "inspector_token",
                &self.inspector_token.as_ref().map(|_| "<redacted>"),
            )
            .field("webhook", &self.webhook)
            .field("targets", &self.targets)
            .field("debounce", &self.debounce)
            .field("settle", &self.settle)
            .field("idle_ttl", &self.idle_ttl)
            .field("retry", &self.retry)
            .field("downstream", &self.downstream)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("journal_capacity", &self.journal_capacity)
            .finish()
    }
}

impl DispatcherConfig {
    pub fn new(
        secret: impl Into<String>,
        downstream_url: impl Into<String>,
        targets: Vec<TargetMapping>,
    ) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Pretty,
            inspector_token: None,
            webhook: WebhookConfig {
                path: "/webhook".to_string(),
                secret: secret.into(),
                signature_header: "x-hub-signature-256".to_string(),
                event_header: "x-github-event".to_string(),
                delivery_header: "x-github-delivery".to_string(),
            },
            targets,
            debounce: Duration::from_millis(5_000),
            settle: Duration::from_millis(500),
            idle_ttl: Duration::from_millis(600_000),
            retry: RetryPolicy::default(),
            downstream: DownstreamConfig {
                base_url: downstream_url.into(),
                token: None,
                trigger_path: "/api/v1/applications/{app}/sync".to_string(),
                pin_revision: false,
                request_timeout: Duration::from_millis(10_000),
            },
            shutdown_grace: Duration::from_millis(10_000),
            journal_capacity: 512,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = required(&lookup, "DISPATCHER_WEBHOOK_SECRET")?;
        let downstream_url = required(&lookup, "DISPATCHER_DOWNSTREAM_URL")?;
        if !(downstream_url.starts_with("http://") || downstream_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "DISPATCHER_DOWNSTREAM_URL",
                message: "must be an http(s) URL".to_string(),
            });
        }
        let targets = parse_targets(&required(&lookup, "DISPATCHER_TARGETS")?)?;

        let mut config = Self::new(secret, downstream_url, targets);

        if let Some(value) = non_blank(&lookup, "DISPATCHER_BIND_ADDR") {
            config.bind_addr = value.parse().map_err(|_| ConfigError::Invalid {
                key: "DISPATCHER_BIND_ADDR",
                message: format!("'{value}' is not a socket address"),
            })?;
        }
        if let Some(value) = lookup("DISPATCHER_LOG_FORMAT") {
            config.log_format = LogFormat::parse(&value);
        }
        config.inspector_token = non_blank(&lookup, "DISPATCHER_INSPECTOR_TOKEN");

        if let Some(value) = lookup("DISPATCHER_WEBHOOK_PATH") {
            if !value.starts_with('/') {
                return Err(ConfigError::Invalid {
                    key: "DISPATCHER_WEBHOOK_PATH",
                    message: "must start with '/'".to_string(),
                });
            }
            config.webhook.path = value;
        }
        if let Some(value) = non_blank(&lookup, "DISPATCHER_SIGNATURE_HEADER") {
            config.webhook.signature_header = value.to_ascii_lowercase();
        }
        if let Some(value) = non_blank(&lookup, "DISPATCHER_EVENT_HEADER") {
            config.webhook.event_header = value.to_ascii_lowercase();
        }
        if let Some(value) = non_blank(&lookup, "DISPATCHER_DELIVERY_HEADER") {
            config.webhook.delivery_header = value.to_ascii_lowercase();
        }

        if let Some(value) = lookup("DISPATCHER_DEBOUNCE_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.debounce = Duration::from_millis(parsed);
        }
        if let Some(value) = lookup("DISPATCHER_SETTLE_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.settle = Duration::from_millis(parsed);
        }
        if let Some(value) = lookup("DISPATCHER_IDLE_TTL_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.idle_ttl = Duration::from_millis(parsed);
        }
        config.idle_ttl = config.idle_ttl.max(config.debounce);

        if let Some(value) = lookup("DISPATCHER_MAX_ATTEMPTS")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.retry.max_attempts = parsed.max(1);
        }
        if let Some(value) = lookup("DISPATCHER_BACKOFF_BASE_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.retry.base_delay = Duration::from_millis(parsed);
        }
        if let Some(value) = lookup("DISPATCHER_BACKOFF_FACTOR")
            && let Ok(parsed) = value.parse::<f64>()
        {
            config.retry.factor = parsed.max(1.0);
        }
        if let Some(value) = lookup("DISPATCHER_BACKOFF_MAX_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.retry.max_delay = Duration::from_millis(parsed);
        }
        if let Some(value) = lookup("DISPATCHER_BACKOFF_JITTER")
            && let Ok(parsed) = value.parse::<f64>()
            && parsed.is_finite()
        {
            config.retry.jitter = parsed.clamp(0.0, 1.0);
        }

        config.downstream.token = non_blank(&lookup, "DISPATCHER_DOWNSTREAM_TOKEN");
        if let Some(value) = lookup("DISPATCHER_TRIGGER_PATH") {
            if !value.starts_with('/') || !value.contains("{app}") {
                return Err(ConfigError::Invalid {
                    key: "DISPATCHER_TRIGGER_PATH",
                    message: "must start with '/' and contain '{app}'".to_string(),
                });
            }
            config.downstream.trigger_path = value;
        }
        if let Some(value) = lookup("DISPATCHER_PIN_REVISION") {
            config.downstream.pin_revision = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }
        if let Some(value) = lookup("DISPATCHER_REQUEST_TIMEOUT_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.downstream.request_timeout = Duration::from_millis(parsed.max(1));
        }
        if let Some(value) = lookup("DISPATCHER_SHUTDOWN_GRACE_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.shutdown_grace = Duration::from_millis(parsed);
        }
        if let Some(value) = lookup("DISPATCHER_JOURNAL_CAPACITY")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.journal_capacity = parsed.max(1);
        }

        Ok(config)
    }
}

/// Parses the comma-separated `<repository>@<ref>[:<path>]=<application>` list.
pub fn parse_targets(raw: &str) -> Result<Vec<TargetMapping>, ConfigError> {
    let mut mappings = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (source, app) = entry
            .split_once('=')
            .ok_or_else(|| invalid_target(entry, "expected <repository>@<ref>=<application>"))?;
        let (repository, rest) = source
            .split_once('@')
            .ok_or_else(|| invalid_target(entry, "missing @<ref>"))?;
        let (git_ref, path_prefix) = match rest.split_once(':') {
            Some((git_ref, path)) => {
                let path = path.trim().trim_matches('/');
                (git_ref, (!path.is_empty()).then(|| path.to_string()))
            }
            None => (rest, None),
        };

        let repository = repository.trim();
        let git_ref = git_ref.trim();
        if repository.is_empty() || git_ref.is_empty() {
            return Err(invalid_target(entry, "repository and ref must be non-empty"));
        }
        let target = TargetApp::new(app.trim())
            .ok_or_else(|| invalid_target(entry, "application must be non-empty"))?;

        mappings.push(TargetMapping {
            repository: repository.to_ascii_lowercase(),
            git_ref: normalize_ref(git_ref),
            path_prefix,
            target,
        });
    }

    if mappings.is_empty() {
        return Err(ConfigError::Invalid {
            key: "DISPATCHER_TARGETS",
            message: "at least one mapping is required".to_string(),
        });
    }

    Ok(mappings)
}

/// Expands a short branch name to `refs/heads/<name>`; full refs pass through.
pub fn normalize_ref(git_ref: &str) -> String {
    if git_ref.starts_with("refs/") {
        git_ref.to_string()
    } else {
        format!("refs/heads/{git_ref}")
    }
}

fn invalid_target(entry: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key: "DISPATCHER_TARGETS",
        message: format!("'{entry}': {message}"),
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    non_blank(lookup, key).ok_or(ConfigError::Missing(key))
}

fn non_blank<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
