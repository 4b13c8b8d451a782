use std::sync::Arc;

use sync_dispatcher::{
    clock::SystemClock,
    dispatcher::{DispatcherConfig, HttpTriggerClient, Pipeline},
    observability::init_logging,
    router::build_router,
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = DispatcherConfig::from_env()?;
    init_logging(config.log_format);

    let bind_addr = config.bind_addr;
    let inspector_api_token = config.inspector_token.clone();
    let grace = config.shutdown_grace;
    let client = HttpTriggerClient::new(config.downstream.clone())?;
    tracing::info!(
        targets = config.targets.len(),
        downstream = %config.downstream.base_url,
        webhook_path = %config.webhook.path,
        inspector_auth = inspector_api_token.is_some(),
        "configuration loaded"
    );

    let pipeline = Pipeline::start(config, Arc::new(client), Arc::new(SystemClock));
    let state = AppState {
        pipeline: Arc::clone(&pipeline),
        inspector_api_token,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "dispatcher listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(grace_ms = grace.as_millis() as u64, "draining in-flight dispatches");
    pipeline.shutdown(grace).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
