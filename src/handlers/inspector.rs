use axum::{Json, extract::State};
use serde::Deserialize;

use crate::{
    error::ApiError,
    extractors::ValidQuery,
    state::AppState,
    types::{HealthResponse, ListAttemptsResponse, ListDeliveriesResponse},
};

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn list_deliveries_handler(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ListQuery>,
) -> Result<Json<ListDeliveriesResponse>, ApiError> {
    let limit = parse_limit(query.limit, state.pipeline.journal_capacity())?;
    Ok(Json(ListDeliveriesResponse {
        deliveries: state.pipeline.deliveries(limit),
    }))
}

pub async fn list_attempts_handler(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ListQuery>,
) -> Result<Json<ListAttemptsResponse>, ApiError> {
    let limit = parse_limit(query.limit, state.pipeline.journal_capacity())?;
    Ok(Json(ListAttemptsResponse {
        attempts: state.pipeline.attempts(limit),
    }))
}

fn parse_limit(limit: Option<usize>, max: usize) -> Result<usize, ApiError> {
    match limit {
        None => Ok(DEFAULT_LIMIT.min(max)),
        Some(0) => Err(ApiError::BadRequest("limit must be > 0".to_string())),
        Some(value) if value > max => Err(ApiError::BadRequest(format!(
            "limit must be <= {max}"
        ))),
        Some(value) => Ok(value),
    }
}
