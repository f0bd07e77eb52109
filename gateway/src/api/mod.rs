pub mod admin;
pub mod dashboard;
pub mod resources;
pub mod search;
pub mod stream;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::{ErrorResponse, FetchFailure, GatewayError};
use crate::services::Gateway;
use crate::types::{now_millis, HealthResponse};

pub struct AppState {
    pub gateway: Arc<Gateway>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<Json<T>, ApiError>;

const MAX_IDENTIFIER_LEN: usize = 128;

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Health check
        .route("/api/health", get(health))
        // Network-wide resources
        .route("/api/stats", get(resources::network_stats))
        .route("/api/nodes/active", get(resources::active_nodes))
        .route("/api/requirements", get(resources::requirements))
        .route("/api/register/status", get(resources::register_status))
        .route("/api/token-supply", get(resources::token_supply))
        // Per-node resources
        .route("/api/node/:node_id", get(resources::node_info))
        .route("/api/node/:node_id/stats", get(resources::node_polling))
        .route("/api/mining/:node_id", get(resources::mining_status))
        .route("/api/mining/:node_id/cooldown", get(resources::mining_cooldown))
        .route("/api/mining/:node_id/debug", get(resources::mining_debug))
        .route("/api/metrics/:node_id/status", get(resources::metrics_status))
        .route("/api/metrics/:node_id/cooldown", get(resources::metrics_cooldown))
        // Per-wallet resources
        .route("/api/claim/:address/status", get(resources::claim_status))
        .route("/api/claim/:address/history", get(resources::claim_history))
        .route("/api/live-log/:address", get(resources::live_log))
        .route("/api/token/:address", get(resources::token_transfers))
        // Composite views
        .route("/api/dashboard/:node_id/:address", get(dashboard::dashboard))
        .route("/api/search/:identifier", get(search::search))
        .route("/api/index/status", get(search::index_status))
        // Live updates
        .route("/api/stream", get(stream::stream));

    // Operator routes exist only when a token is configured.
    if state.gateway.config().admin_token.is_some() {
        router = router
            .route("/api/cache/info", get(admin::cache_info))
            .route("/api/cache/clear", post(admin::cache_clear));
    }

    router.with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

/// GET /api/health - Health check endpoint
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: now_millis(),
        uptime_secs: state.gateway.uptime().as_secs(),
    })
}

pub(crate) fn fetch_error(failure: FetchFailure) -> ApiError {
    let status = match failure {
        FetchFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, Json(ErrorResponse::new(failure.code(), failure.to_string())))
}

pub(crate) fn gateway_error(err: GatewayError) -> ApiError {
    let status = match &err {
        GatewayError::AllUpstreamsFailed { .. } => StatusCode::BAD_GATEWAY,
        GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
    };
    let mut body = ErrorResponse::new(err.code(), err.to_string());
    if let GatewayError::AllUpstreamsFailed { failures } = &err {
        if let Ok(details) = serde_json::to_value(failures) {
            body = body.with_details(details);
        }
    }
    (status, Json(body))
}

/// Reject identifiers that cannot name a node or wallet before they reach
/// an upstream URL.
pub(crate) fn validate_identifier<'a>(field: &str, raw: &'a str) -> Result<&'a str, ApiError> {
    let value = raw.trim();
    let problem = if value.is_empty() {
        Some("must not be empty")
    } else if value == "." || value == ".." {
        Some("is not a valid identifier")
    } else if value.len() > MAX_IDENTIFIER_LEN {
        Some("is too long")
    } else if value.chars().any(|c| c.is_control() || c == '/') {
        Some("contains invalid characters")
    } else {
        None
    };

    match problem {
        Some(problem) => {
            let err = GatewayError::InvalidInput(format!("{} {}", field, problem));
            Err(gateway_error(err))
        }
        None => Ok(value),
    }
}
