use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{join_segments, join_url, UpstreamClient};
use crate::error::FetchFailure;
use crate::services::node_index::NodeSource;
use crate::types::{timestamp, NodeMetrics, NodeRecord, NodeStatus, NodeTimestamps};

/// Node registry adapter. Every registry response passes through here, so
/// the shape quirks of the provider are handled once.
#[derive(Clone)]
pub struct RegistryClient {
    upstream: UpstreamClient,
    base_url: Url,
    listing_path: String,
    listing_timeout: Duration,
}

impl RegistryClient {
    pub fn new(
        upstream: UpstreamClient,
        base_url: &str,
        listing_path: &str,
        listing_timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).context("Invalid registry base URL")?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Registry base URL cannot carry a path: {}", base_url);
        }

        Ok(Self {
            upstream,
            base_url,
            listing_path: listing_path.to_string(),
            listing_timeout,
        })
    }

    /// GET a registry resource addressed by path segments.
    pub async fn fetch(&self, segments: &[&str], timeout: Duration) -> Result<Value, FetchFailure> {
        let url = join_segments(&self.base_url, segments.iter().copied())
            .map_err(|e| FetchFailure::unreachable(e.to_string()))?;
        let body = self.upstream.fetch_json(url, timeout).await?;
        check_success_flag(body)
    }

    /// Fetch the bulk listing and turn it into validated node records.
    pub async fn fetch_nodes(&self) -> Result<Vec<NodeRecord>, FetchFailure> {
        let url = join_url(&self.base_url, &self.listing_path)
            .map_err(|e| FetchFailure::unreachable(e.to_string()))?;
        let body = self.upstream.fetch_json(url, self.listing_timeout).await?;
        let body = check_success_flag(body)?;
        parse_node_listing(&body)
    }
}

#[async_trait]
impl NodeSource for RegistryClient {
    async fn fetch_nodes(&self) -> Result<Vec<NodeRecord>, FetchFailure> {
        RegistryClient::fetch_nodes(self).await
    }
}

/// A 2xx body that says `"success": false` is a refusal, not data.
fn check_success_flag(body: Value) -> Result<Value, FetchFailure> {
    if body.get("success") == Some(&Value::Bool(false)) {
        let message = first_str(&body, &["error", "message"])
            .unwrap_or("registry reported failure")
            .to_string();
        return Err(FetchFailure::rejected(message));
    }
    Ok(body)
}

pub fn parse_node_listing(body: &Value) -> Result<Vec<NodeRecord>, FetchFailure> {
    let entries = body
        .as_array()
        .or_else(|| body.get("nodes").and_then(Value::as_array))
        .or_else(|| body.get("data").and_then(Value::as_array))
        .or_else(|| body.pointer("/data/nodes").and_then(Value::as_array))
        .ok_or_else(|| FetchFailure::invalid_body("node listing has no nodes array"))?;

    let records: Vec<NodeRecord> = entries.iter().filter_map(parse_node).collect();

    let skipped = entries.len() - records.len();
    if skipped > 0 {
        warn!("Skipped {} malformed node entries out of {}", skipped, entries.len());
    }
    debug!("Parsed {} node records", records.len());

    Ok(records)
}

/// Build a record from one registry entry. Entries without a node id are
/// unusable and yield `None`; every other missing field gets a default.
pub fn parse_node(entry: &Value) -> Option<NodeRecord> {
    let obj = entry
        .get("node")
        .filter(|n| n.is_object())
        .unwrap_or(entry)
        .as_object()?;

    let node_id = first_str_in(obj, &["nodeId", "node_id", "id"])?.trim();
    if node_id.is_empty() {
        return None;
    }

    let wallet = first_str_in(obj, &["wallet", "walletAddress", "owner", "address"])
        .unwrap_or_default()
        .trim()
        .to_string();

    let status = match first_str_in(obj, &["nodeStatus", "status"]) {
        Some(raw) => NodeStatus::from_registry(raw),
        None => match first_in(obj, &["isActive", "is_active"]).and_then(Value::as_bool) {
            Some(true) => NodeStatus::Active,
            _ => NodeStatus::Inactive,
        },
    };

    let metrics = first_in(obj, &["nodeMetrics", "metrics"])
        .and_then(Value::as_object)
        .map(|m| NodeMetrics {
            cpu: first_f64(m, &["cpu"]),
            ram_mb: first_f64(m, &["ram", "ramMB", "ram_mb"]),
            disk_gb: first_f64(m, &["disk", "diskGB", "disk_gb"]),
            down_mbps: first_f64(m, &["speed", "downloadSpeed", "download_speed"]),
            up_mbps: first_f64(m, &["uploadSpeed", "upload_speed"]),
        })
        .unwrap_or_default();

    let ts = |keys: &[&str]| first_in(obj, keys).and_then(timestamp::parse);
    let timestamps = NodeTimestamps {
        created_at: ts(&["createdAt", "created_at", "registeredAt", "registered_at"]),
        last_polled_at: ts(&["lastPolledAt", "last_polled_at"]),
        last_claim_time: ts(&["lastClaimTime", "last_claim_time"]),
        last_mining_start: ts(&["lastMiningStart", "last_mining_start"]),
    };

    Some(NodeRecord {
        node_id: node_id.to_string(),
        wallet,
        status,
        task_count: first_f64(obj, &["taskCount", "task_count"]).map_or(0, |n| n.max(0.0) as u64),
        sync_count: first_f64(obj, &["syncCount", "sync_count"]).map_or(0, |n| n.max(0.0) as u64),
        metrics,
        timestamps,
    })
}

fn first_in<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn first_str_in<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(Value::as_str)
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    value.as_object().and_then(|obj| first_str_in(obj, keys))
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn first_f64(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}
