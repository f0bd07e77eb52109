use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use netrum_gateway::api::{create_router, AppState};
use netrum_gateway::{Gateway, GatewayConfig};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const ADMIN_TOKEN: &str = "test-admin";
pub const ALICE_NODE: &str = "netrum.lite.alice.base.eth";
pub const ALICE_WALLET: &str = "0x828F40DcCD14FAd59F7dCfb5C57F3642Ec37f89f";

/// Bind an ephemeral local port and return the listener with its address
async fn bind_local() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to port 0");
    let addr = listener.local_addr().unwrap();
    (listener, format!("http://{}", addr))
}

/// Call counters shared with the mock upstream handlers
#[derive(Default)]
pub struct MockState {
    pub node_count: usize,
    pub mining_debug_delay: Duration,
    pub fail_listing: AtomicBool,
    pub listing_calls: AtomicUsize,
    pub stats_calls: AtomicUsize,
    pub explorer_calls: AtomicUsize,
}

impl MockState {
    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn explorer_calls(&self) -> usize {
        self.explorer_calls.load(Ordering::SeqCst)
    }
}

/// In-process stand-in for the node registry and the block explorer
pub struct MockUpstream {
    pub url: String,
    pub state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start(node_count: usize, mining_debug_delay: Duration) -> Self {
        let state = Arc::new(MockState {
            node_count,
            mining_debug_delay,
            ..Default::default()
        });

        let router = Router::new()
            .route("/lite/nodes/active", get(listing))
            .route("/lite/nodes/stats", get(stats))
            .route("/lite/nodes/id/:id", get(node_info))
            .route("/mining/status/:id", get(mining_status))
            .route("/mining/cooldown/:id", get(echo_ok))
            .route("/mining/debug/:id", get(mining_debug))
            .route("/metrics/node-status/:id", get(echo_ok))
            .route("/claim/status/:wallet", get(echo_ok))
            .route("/claim/history/:wallet", get(echo_ok))
            .route("/live-log/status/:wallet", get(echo_ok))
            .route("/explorer/api", get(explorer))
            .with_state(state.clone());

        let (listener, url) = bind_local().await;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { url, state, server }
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn node_entry(i: usize) -> Value {
    let (node_id, wallet) = if i == 0 {
        (ALICE_NODE.to_string(), ALICE_WALLET.to_string())
    } else {
        (format!("netrum.lite.node{}.base.eth", i), format!("0x{:040x}", i))
    };
    json!({
        "nodeId": node_id,
        "wallet": wallet,
        "nodeStatus": if i % 4 == 0 { "Inactive" } else { "Active" },
        "taskCount": i,
        "nodeMetrics": {"cpu": 4, "ram": 8192, "disk": 200, "speed": 50, "uploadSpeed": 20},
        "createdAt": "2025-03-01T10:00:00Z"
    })
}

async fn listing(State(state): State<Arc<MockState>>) -> Result<Json<Value>, StatusCode> {
    state.listing_calls.fetch_add(1, Ordering::SeqCst);
    if state.fail_listing.load(Ordering::SeqCst) {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    // Large listings take a moment, which gives concurrent callers a chance to overlap.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let nodes: Vec<Value> = (0..state.node_count).map(node_entry).collect();
    Ok(Json(json!({"success": true, "total": nodes.len(), "nodes": nodes})))
}

async fn stats(State(state): State<Arc<MockState>>) -> Json<Value> {
    let n = state.stats_calls.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({"success": true, "totalNodes": state.node_count, "activeNodes": 1200, "served": n}))
}

async fn node_info(Path(id): Path<String>) -> Json<Value> {
    Json(json!({"success": true, "node": {"nodeId": id, "nodeStatus": "Active"}}))
}

async fn mining_status(Path(id): Path<String>) -> Json<Value> {
    Json(json!({"success": true, "nodeId": id, "isMining": true, "minedTokens": 12.5}))
}

async fn mining_debug(State(state): State<Arc<MockState>>, Path(id): Path<String>) -> Json<Value> {
    tokio::time::sleep(state.mining_debug_delay).await;
    Json(json!({"success": true, "nodeId": id, "debug": "ok"}))
}

async fn echo_ok(Path(param): Path<String>) -> Json<Value> {
    Json(json!({"success": true, "param": param}))
}

async fn explorer(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.explorer_calls.fetch_add(1, Ordering::SeqCst);
    if query.get("apikey").map(String::as_str) != Some("test-key") {
        return Json(json!({"status": "0", "message": "NOTOK", "result": "Invalid API Key"}));
    }
    match query.get("action").map(String::as_str) {
        Some("tokentx") => {
            let address = query.get("address").cloned().unwrap_or_default();
            Json(json!({"status": "1", "message": "OK", "result": [
                {"hash": "0x01", "blockNumber": "200", "timeStamp": "1735689800", "to": address.to_lowercase(), "value": "3000000000000000000"},
                {"hash": "0x02", "blockNumber": "100", "timeStamp": "1735689600", "to": address, "value": "1000000000000000000"},
                {"hash": "0x03", "blockNumber": "150", "timeStamp": "1735689700", "to": "0xelsewhere", "value": "7000000000000000000"}
            ]}))
        }
        Some("tokensupply") => {
            Json(json!({"status": "1", "message": "OK", "result": "1000000000000000000000000"}))
        }
        _ => Json(json!({"status": "0", "message": "NOTOK", "result": "Unknown action"})),
    }
}

/// A gateway wired to a mock upstream, serving on an ephemeral port.
/// Configuration goes through a TOML file like a real deployment.
pub struct TestGateway {
    pub url: String,
    pub gateway: Arc<Gateway>,
    pub upstream: MockUpstream,
    cancel: CancellationToken,
    server: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl TestGateway {
    pub async fn start(upstream: MockUpstream) -> Self {
        Self::start_with(upstream, |_| {}).await
    }

    pub async fn start_with<F>(upstream: MockUpstream, adjust: F) -> Self
    where
        F: FnOnce(&mut GatewayConfig),
    {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("gateway.toml");
        let toml = format!(
            r#"
admin_token = "{admin}"

[registry]
base_url = "{upstream}"

[explorer]
base_url = "{upstream}/explorer/api"
api_key = "test-key"

[upstream]
default_timeout_ms = 2000

[upstream.timeout_ms]
"mining-debug" = 500

[broadcast]
interval_secs = 1
"#,
            admin = ADMIN_TOKEN,
            upstream = upstream.url,
        );
        std::fs::write(&config_path, toml).expect("Failed to write config");

        let mut config = GatewayConfig::load(Some(&config_path)).expect("Failed to load config");
        adjust(&mut config);

        let gateway = Arc::new(Gateway::new(config).expect("Failed to build gateway"));
        let cancel = CancellationToken::new();
        gateway.start(&cancel);

        let app = create_router(Arc::new(AppState {
            gateway: gateway.clone(),
        }));
        let (listener, url) = bind_local().await;
        let shutdown = cancel.clone();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
        });

        Self {
            url,
            gateway,
            upstream,
            cancel,
            server,
            _temp_dir: temp_dir,
        }
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    pub async fn get_json(&self, path: &str) -> (u16, Value) {
        let resp = reqwest::get(self.api(path))
            .await
            .expect("Request failed");
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.expect("Failed to parse response");
        (status, body)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.server.abort();
    }
}

/// Response types for deserialization
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub success: bool,
    pub data: NodeRecord,
    pub stale: bool,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub node_id: String,
    pub wallet: String,
    pub status: String,
    pub task_count: u64,
}
