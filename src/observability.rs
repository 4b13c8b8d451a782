//! Logging setup and span constructors.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl LogFormat {
    /// Parses `json` / `pretty` (case-insensitive); anything else is `Pretty`.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Initializes the logging subsystem.
///
/// Honors `RUST_LOG` (default `info`). Subsequent calls are no-ops.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Span covering verification, classification and gating of one delivery.
#[must_use]
pub fn delivery_span(delivery_id: &str, repository: Option<&str>) -> Span {
    tracing::info_span!(
        "delivery",
        delivery_id = delivery_id,
        repository = repository.unwrap_or("-")
    )
}

/// Span covering the settle wait and every trigger attempt for one target.
#[must_use]
pub fn dispatch_span(delivery_id: &str, app: &str) -> Span {
    tracing::info_span!("dispatch", delivery_id = delivery_id, app = app)
}
