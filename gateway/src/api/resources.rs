use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use super::{fetch_error, validate_identifier, ApiResult, AppState};
use crate::services::ResourceKind;
use crate::types::{now_millis, ResourceResponse};

/// Serve one resource through the cache.
async fn serve(state: &AppState, kind: ResourceKind, param: Option<&str>) -> ApiResult<ResourceResponse> {
    let (data, from_cache) = state
        .gateway
        .cached(kind, param)
        .await
        .map_err(fetch_error)?;

    Ok(Json(ResourceResponse {
        success: true,
        data,
        from_cache,
        timestamp: now_millis(),
    }))
}

async fn serve_node(state: &AppState, kind: ResourceKind, node_id: &str) -> ApiResult<ResourceResponse> {
    let node_id = validate_identifier("nodeId", node_id)?;
    serve(state, kind, Some(node_id)).await
}

async fn serve_wallet(state: &AppState, kind: ResourceKind, address: &str) -> ApiResult<ResourceResponse> {
    let address = validate_identifier("address", address)?;
    serve(state, kind, Some(address)).await
}

/// GET /api/stats - Network-wide statistics
pub async fn network_stats(State(state): State<Arc<AppState>>) -> ApiResult<ResourceResponse> {
    serve(&state, ResourceKind::NetworkStats, None).await
}

/// GET /api/nodes/active
pub async fn active_nodes(State(state): State<Arc<AppState>>) -> ApiResult<ResourceResponse> {
    serve(&state, ResourceKind::ActiveNodes, None).await
}

/// GET /api/requirements - Minimum hardware requirements
pub async fn requirements(State(state): State<Arc<AppState>>) -> ApiResult<ResourceResponse> {
    serve(&state, ResourceKind::Requirements, None).await
}

/// GET /api/register/status
pub async fn register_status(State(state): State<Arc<AppState>>) -> ApiResult<ResourceResponse> {
    serve(&state, ResourceKind::RegisterStatus, None).await
}

/// GET /api/token-supply - Reward token supply from the block explorer
pub async fn token_supply(State(state): State<Arc<AppState>>) -> ApiResult<ResourceResponse> {
    serve(&state, ResourceKind::TokenSupply, None).await
}

/// GET /api/node/:node_id
pub async fn node_info(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> ApiResult<ResourceResponse> {
    serve_node(&state, ResourceKind::NodeInfo, &node_id).await
}

/// GET /api/node/:node_id/stats - Latest polling stats
pub async fn node_polling(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> ApiResult<ResourceResponse> {
    serve_node(&state, ResourceKind::NodePolling, &node_id).await
}

/// GET /api/mining/:node_id
pub async fn mining_status(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> ApiResult<ResourceResponse> {
    serve_node(&state, ResourceKind::MiningStatus, &node_id).await
}

/// GET /api/mining/:node_id/cooldown
pub async fn mining_cooldown(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> ApiResult<ResourceResponse> {
    serve_node(&state, ResourceKind::MiningCooldown, &node_id).await
}

/// GET /api/mining/:node_id/debug
pub async fn mining_debug(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> ApiResult<ResourceResponse> {
    serve_node(&state, ResourceKind::MiningDebug, &node_id).await
}

/// GET /api/metrics/:node_id/status
pub async fn metrics_status(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> ApiResult<ResourceResponse> {
    serve_node(&state, ResourceKind::MetricsStatus, &node_id).await
}

/// GET /api/metrics/:node_id/cooldown
pub async fn metrics_cooldown(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> ApiResult<ResourceResponse> {
    serve_node(&state, ResourceKind::MetricsCooldown, &node_id).await
}

/// GET /api/claim/:address/status
pub async fn claim_status(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<ResourceResponse> {
    serve_wallet(&state, ResourceKind::ClaimStatus, &address).await
}

/// GET /api/claim/:address/history
pub async fn claim_history(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<ResourceResponse> {
    serve_wallet(&state, ResourceKind::ClaimHistory, &address).await
}

/// GET /api/live-log/:address
pub async fn live_log(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<ResourceResponse> {
    serve_wallet(&state, ResourceKind::LiveLog, &address).await
}

/// GET /api/token/:address - Claim summary built from token transfers
pub async fn token_transfers(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> ApiResult<ResourceResponse> {
    serve_wallet(&state, ResourceKind::TokenTransfers, &address).await
}
