use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::{handlers::AdminApiError, router::AdminState};

pub async fn healthy() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn ready(
    State(state): State<Arc<AdminState>>,
) -> Result<Json<ReadyResponse>, AdminApiError> {
    Ok(Json(ReadyResponse {
        families: state.aggregate.len()?,
        ttl_seconds: state
            .aggregate
            .options()
            .metric_ttl()
            .map(|ttl| ttl.as_secs_f64()),
    }))
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub families: usize,
    pub ttl_seconds: Option<f64>,
}
