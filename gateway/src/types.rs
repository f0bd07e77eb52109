use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use time::OffsetDateTime;

// ============================================================================
// Node Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Active,
    Inactive,
}

impl NodeStatus {
    /// Anything the registry does not explicitly call active is inactive.
    pub fn from_registry(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("active") {
            NodeStatus::Active
        } else {
            NodeStatus::Inactive
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetrics {
    pub cpu: Option<f64>,
    pub ram_mb: Option<f64>,
    pub disk_gb: Option<f64>,
    pub down_mbps: Option<f64>,
    pub up_mbps: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTimestamps {
    #[serde(default, with = "timestamp")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "timestamp")]
    pub last_polled_at: Option<OffsetDateTime>,
    #[serde(default, with = "timestamp")]
    pub last_claim_time: Option<OffsetDateTime>,
    #[serde(default, with = "timestamp")]
    pub last_mining_start: Option<OffsetDateTime>,
}

/// One node as served to the dashboard. Built once at ingestion and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub node_id: String,
    pub wallet: String,
    pub status: NodeStatus,
    pub task_count: u64,
    pub sync_count: u64,
    pub metrics: NodeMetrics,
    pub timestamps: NodeTimestamps,
}

/// Compact view of the node index pushed to live viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub node_count: usize,
    pub active: usize,
    pub inactive: usize,
    #[serde(default, with = "timestamp")]
    pub fetched_at: Option<OffsetDateTime>,
    pub stale: bool,
}

// ============================================================================
// Token Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaim {
    pub tx_hash: String,
    pub block_number: u64,
    pub amount: f64,
    #[serde(default, with = "timestamp")]
    pub timestamp: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSummary {
    pub total_claims: usize,
    pub total_npt_claimed: f64,
    #[serde(default, with = "timestamp")]
    pub last_claim_time: Option<OffsetDateTime>,
    pub recent_claims: Vec<TokenClaim>,
    /// Set when the history was longer than the configured page cap.
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSupply {
    pub raw: String,
    pub formatted: f64,
}

// ============================================================================
// Route Envelopes
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceResponse {
    pub success: bool,
    pub data: Value,
    pub from_cache: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub success: bool,
    pub timestamp: i64,
    pub data: BTreeMap<String, Value>,
    pub errors: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub success: bool,
    pub data: NodeRecord,
    pub stale: bool,
    #[serde(default, with = "timestamp")]
    pub fetched_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatusResponse {
    pub success: bool,
    pub state: String,
    pub node_count: usize,
    #[serde(default, with = "timestamp")]
    pub fetched_at: Option<OffsetDateTime>,
    pub stale: bool,
    pub refresh_in_flight: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfoResponse {
    pub success: bool,
    pub stats: crate::services::cache_store::CacheStats,
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub uptime_secs: u64,
}

/// Milliseconds since the unix epoch, as used in every envelope.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Optional timestamps are written as RFC 3339 strings. Reading accepts
/// RFC 3339 strings and unix seconds or milliseconds; anything else becomes
/// `None` instead of failing the whole record.
pub mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    pub fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(t) => {
                let text = t.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
                serializer.serialize_str(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(parse))
    }

    pub fn parse(value: &Value) -> Option<OffsetDateTime> {
        match value {
            Value::String(s) => {
                let s = s.trim();
                if let Ok(t) = OffsetDateTime::parse(s, &Rfc3339) {
                    return Some(t);
                }
                s.parse::<i64>().ok().and_then(from_epoch)
            }
            Value::Number(n) => n.as_i64().and_then(from_epoch),
            _ => None,
        }
    }

    fn from_epoch(n: i64) -> Option<OffsetDateTime> {
        if n <= 0 {
            return None;
        }
        // Values past ~2001 in milliseconds are above 1e12.
        if n >= 1_000_000_000_000 {
            OffsetDateTime::from_unix_timestamp_nanos(n as i128 * 1_000_000).ok()
        } else {
            OffsetDateTime::from_unix_timestamp(n).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_from_registry() {
        assert_eq!(NodeStatus::from_registry("Active"), NodeStatus::Active);
        assert_eq!(NodeStatus::from_registry(" active "), NodeStatus::Active);
        assert_eq!(NodeStatus::from_registry("Inactive"), NodeStatus::Inactive);
        assert_eq!(NodeStatus::from_registry("pending"), NodeStatus::Inactive);
    }

    #[test]
    fn test_timestamp_parse_accepts_mixed_shapes() {
        let iso = timestamp::parse(&json!("2025-01-02T03:04:05Z")).unwrap();
        let secs = timestamp::parse(&json!(iso.unix_timestamp())).unwrap();
        let millis = timestamp::parse(&json!(iso.unix_timestamp() * 1000)).unwrap();
        assert_eq!(iso, secs);
        assert_eq!(iso, millis);
        assert!(timestamp::parse(&json!("yesterday")).is_none());
        assert!(timestamp::parse(&json!(null)).is_none());
    }

    #[test]
    fn test_node_record_serializes_camel_case() {
        let record = NodeRecord {
            node_id: "netrum.lite.a".into(),
            wallet: "0xabc".into(),
            status: NodeStatus::Active,
            task_count: 3,
            sync_count: 4,
            metrics: NodeMetrics::default(),
            timestamps: NodeTimestamps {
                created_at: timestamp::parse(&json!("2025-01-02T03:04:05Z")),
                ..Default::default()
            },
        };
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["nodeId"], "netrum.lite.a");
        assert_eq!(v["taskCount"], 3);
        assert_eq!(v["timestamps"]["createdAt"], "2025-01-02T03:04:05Z");
        assert!(v["timestamps"]["lastPolledAt"].is_null());

        let back: NodeRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, record);
    }
}
