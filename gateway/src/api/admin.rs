use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use super::{ApiError, ApiResult, AppState};
use crate::error::ErrorResponse;
use crate::types::CacheInfoResponse;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = state.gateway.config().admin_token.as_deref();
    let presented = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    match (expected, presented) {
        (Some(expected), Some(presented)) if expected == presented => Ok(()),
        _ => {
            warn!("Rejected operator request without a valid admin token");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized", "missing or invalid admin token")),
            ))
        }
    }
}

/// GET /api/cache/info - Cache counters
pub async fn cache_info(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<CacheInfoResponse> {
    authorize(&state, &headers)?;

    Ok(Json(CacheInfoResponse {
        success: true,
        stats: state.gateway.cache_stats(),
        default_ttl_secs: state.gateway.config().cache.default_ttl_secs,
    }))
}

/// POST /api/cache/clear - Drop every cached entry
pub async fn cache_clear(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Value> {
    authorize(&state, &headers)?;
    state.gateway.cache_flush();

    Ok(Json(json!({"success": true, "message": "Cache cleared"})))
}
