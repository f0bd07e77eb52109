use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::{gateway_error, validate_identifier, ApiResult, AppState};
use crate::types::DashboardResponse;

/// GET /api/dashboard/:node_id/:address - Every dashboard resource in one call
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Path((node_id, address)): Path<(String, String)>,
) -> ApiResult<DashboardResponse> {
    let node_id = validate_identifier("nodeId", &node_id)?;
    let address = validate_identifier("address", &address)?;

    let result = state
        .gateway
        .dashboard(node_id, address)
        .await
        .map_err(gateway_error)?;

    if result.failure_count() > 0 {
        info!(
            "Dashboard for {} served with {} unavailable resource(s)",
            node_id,
            result.failure_count()
        );
    }

    Ok(Json(result.into_response()))
}
