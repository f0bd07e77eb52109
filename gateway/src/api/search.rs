use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::{gateway_error, validate_identifier, ApiResult, AppState};
use crate::types::{IndexStatusResponse, SearchResponse};

/// GET /api/search/:identifier - Find a node by node id or wallet
pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
) -> ApiResult<SearchResponse> {
    let identifier = validate_identifier("identifier", &identifier)?;

    let found = state
        .gateway
        .lookup_node(identifier)
        .await
        .map_err(gateway_error)?;

    Ok(Json(SearchResponse {
        success: true,
        data: found.record,
        stale: found.stale,
        fetched_at: Some(found.fetched_at),
    }))
}

/// GET /api/index/status - Node index state and snapshot age
pub async fn index_status(State(state): State<Arc<AppState>>) -> Json<IndexStatusResponse> {
    let index = state.gateway.node_index();
    let summary = index.summary();

    Json(IndexStatusResponse {
        success: true,
        state: index.state().as_str().to_string(),
        node_count: summary.as_ref().map_or(0, |s| s.node_count),
        fetched_at: summary.as_ref().and_then(|s| s.fetched_at),
        stale: summary.as_ref().is_some_and(|s| s.stale),
        refresh_in_flight: index.refresh_in_flight(),
    })
}
