use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;

use super::aggregator::{FetchFuture, ResourceSpec};
use crate::config::GatewayConfig;
use crate::error::FetchFailure;
use crate::upstream::{ExplorerClient, RegistryClient};

/// Identifier a resource is scoped to, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceParam {
    None,
    NodeId,
    Wallet,
}

/// Every upstream resource the gateway serves. The kebab-case name doubles
/// as the config key for per-kind TTL and timeout overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    NetworkStats,
    ActiveNodes,
    NodeInfo,
    NodePolling,
    MiningStatus,
    MiningCooldown,
    MiningDebug,
    MetricsStatus,
    MetricsCooldown,
    Requirements,
    RegisterStatus,
    ClaimStatus,
    ClaimHistory,
    LiveLog,
    TokenTransfers,
    TokenSupply,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 16] = [
        ResourceKind::NetworkStats,
        ResourceKind::ActiveNodes,
        ResourceKind::NodeInfo,
        ResourceKind::NodePolling,
        ResourceKind::MiningStatus,
        ResourceKind::MiningCooldown,
        ResourceKind::MiningDebug,
        ResourceKind::MetricsStatus,
        ResourceKind::MetricsCooldown,
        ResourceKind::Requirements,
        ResourceKind::RegisterStatus,
        ResourceKind::ClaimStatus,
        ResourceKind::ClaimHistory,
        ResourceKind::LiveLog,
        ResourceKind::TokenTransfers,
        ResourceKind::TokenSupply,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::NetworkStats => "network-stats",
            ResourceKind::ActiveNodes => "active-nodes",
            ResourceKind::NodeInfo => "node-info",
            ResourceKind::NodePolling => "node-polling",
            ResourceKind::MiningStatus => "mining-status",
            ResourceKind::MiningCooldown => "mining-cooldown",
            ResourceKind::MiningDebug => "mining-debug",
            ResourceKind::MetricsStatus => "metrics-status",
            ResourceKind::MetricsCooldown => "metrics-cooldown",
            ResourceKind::Requirements => "requirements",
            ResourceKind::RegisterStatus => "register-status",
            ResourceKind::ClaimStatus => "claim-status",
            ResourceKind::ClaimHistory => "claim-history",
            ResourceKind::LiveLog => "live-log",
            ResourceKind::TokenTransfers => "token-transfers",
            ResourceKind::TokenSupply => "token-supply",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    pub fn param(&self) -> ResourceParam {
        match self {
            ResourceKind::NetworkStats
            | ResourceKind::ActiveNodes
            | ResourceKind::Requirements
            | ResourceKind::RegisterStatus
            | ResourceKind::TokenSupply => ResourceParam::None,
            ResourceKind::NodeInfo
            | ResourceKind::NodePolling
            | ResourceKind::MiningStatus
            | ResourceKind::MiningCooldown
            | ResourceKind::MiningDebug
            | ResourceKind::MetricsStatus
            | ResourceKind::MetricsCooldown => ResourceParam::NodeId,
            ResourceKind::ClaimStatus
            | ResourceKind::ClaimHistory
            | ResourceKind::LiveLog
            | ResourceKind::TokenTransfers => ResourceParam::Wallet,
        }
    }

    /// Registry path segments preceding the parameter. `None` for resources
    /// served by the block explorer.
    pub fn registry_path(&self) -> Option<&'static [&'static str]> {
        let path: &'static [&'static str] = match self {
            ResourceKind::NetworkStats => &["lite", "nodes", "stats"],
            ResourceKind::ActiveNodes => &["lite", "nodes", "active"],
            ResourceKind::NodeInfo => &["lite", "nodes", "id"],
            ResourceKind::NodePolling => &["polling", "node-stats"],
            ResourceKind::MiningStatus => &["mining", "status"],
            ResourceKind::MiningCooldown => &["mining", "cooldown"],
            ResourceKind::MiningDebug => &["mining", "debug"],
            ResourceKind::MetricsStatus => &["metrics", "node-status"],
            ResourceKind::MetricsCooldown => &["metrics", "check-cooldown"],
            ResourceKind::Requirements => &["metrics", "requirements"],
            ResourceKind::RegisterStatus => &["register", "status"],
            ResourceKind::ClaimStatus => &["claim", "status"],
            ResourceKind::ClaimHistory => &["claim", "history"],
            ResourceKind::LiveLog => &["live-log", "status"],
            ResourceKind::TokenTransfers | ResourceKind::TokenSupply => return None,
        };
        Some(path)
    }

    fn cache_prefix(&self) -> &'static str {
        match self {
            ResourceKind::NodeInfo => "node",
            ResourceKind::NodePolling => "polling",
            ResourceKind::MiningStatus => "mining",
            ResourceKind::MiningCooldown => "cooldown",
            ResourceKind::TokenTransfers => "token",
            other => other.name(),
        }
    }

    /// Case variants of one identifier share a cache entry.
    pub fn cache_key(&self, param: Option<&str>) -> String {
        match param {
            Some(p) => format!("{}-{}", self.cache_prefix(), p.trim().to_lowercase()),
            None => self.cache_prefix().to_string(),
        }
    }
}

/// Slots of the dashboard aggregate and the resource behind each.
pub const DASHBOARD_SLOTS: [(&str, ResourceKind); 10] = [
    ("nodeInfo", ResourceKind::NodeInfo),
    ("miningStatus", ResourceKind::MiningStatus),
    ("miningCooldown", ResourceKind::MiningCooldown),
    ("miningDebug", ResourceKind::MiningDebug),
    ("metricsStatus", ResourceKind::MetricsStatus),
    ("claimStatus", ResourceKind::ClaimStatus),
    ("claimHistory", ResourceKind::ClaimHistory),
    ("liveLog", ResourceKind::LiveLog),
    ("networkStats", ResourceKind::NetworkStats),
    ("tokenData", ResourceKind::TokenTransfers),
];

/// Turns a resource kind plus identifier into a ready-to-run fetch against
/// the right upstream, with the configured timeout.
#[derive(Clone)]
pub struct ResourceFetcher {
    config: Arc<GatewayConfig>,
    registry: RegistryClient,
    explorer: ExplorerClient,
}

impl ResourceFetcher {
    pub fn new(config: Arc<GatewayConfig>, registry: RegistryClient, explorer: ExplorerClient) -> Self {
        Self {
            config,
            registry,
            explorer,
        }
    }

    pub fn fetch(&self, kind: ResourceKind, param: Option<&str>) -> FetchFuture {
        let timeout = self.config.timeout_for(kind);
        let param = param.map(|p| p.trim().to_string());

        if kind.param() != ResourceParam::None && param.as_deref().map_or(true, str::is_empty) {
            let failure = FetchFailure::rejected(format!("{} requires an identifier", kind.name()));
            return async move { Err(failure) }.boxed();
        }

        match kind.registry_path() {
            Some(path) => {
                let registry = self.registry.clone();
                async move {
                    let segments: Vec<&str> = path.iter().copied().chain(param.as_deref()).collect();
                    registry.fetch(&segments, timeout).await
                }
                .boxed()
            }
            None => {
                let explorer = self.explorer.clone();
                async move {
                    if kind == ResourceKind::TokenSupply {
                        let supply = explorer.token_supply(timeout).await?;
                        to_json(&supply)
                    } else {
                        let wallet = param.unwrap_or_default();
                        let summary = explorer.token_summary(&wallet, timeout).await?;
                        to_json(&summary)
                    }
                }
                .boxed()
            }
        }
    }

    pub fn spec(&self, slot: &str, kind: ResourceKind, param: Option<&str>) -> ResourceSpec {
        let fetcher = self.clone();
        let owned = param.map(str::to_string);
        ResourceSpec::new(
            slot,
            kind.cache_key(param),
            self.config.ttl_for(kind),
            move || fetcher.fetch(kind, owned.as_deref()),
        )
    }

    pub fn dashboard_specs(&self, node_id: &str, wallet: &str) -> Vec<ResourceSpec> {
        DASHBOARD_SLOTS
            .iter()
            .map(|&(slot, kind)| {
                let param = match kind.param() {
                    ResourceParam::NodeId => Some(node_id),
                    ResourceParam::Wallet => Some(wallet),
                    ResourceParam::None => None,
                };
                self.spec(slot, kind, param)
            })
            .collect()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, FetchFailure> {
    serde_json::to_value(value).map_err(|e| FetchFailure::invalid_body(e.to_string()))
}
