use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::{
    auth::inspector_auth,
    handlers::{
        inspector::{health_handler, list_attempts_handler, list_deliveries_handler},
        webhook::webhook_handler,
    },
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    let webhook_path = state.pipeline.config().webhook.path.clone();

    let inspector_router = Router::new()
        .route("/deliveries", get(list_deliveries_handler))
        .route("/attempts", get(list_attempts_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inspector_auth,
        ));

    Router::new()
        .route(&webhook_path, post(webhook_handler))
        .route("/healthz", get(health_handler))
        .nest("/internal", inspector_router)
        .with_state(state)
}
