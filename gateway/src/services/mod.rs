pub mod aggregator;
pub mod background;
pub mod broadcast_hub;
pub mod cache_store;
pub mod node_index;
pub mod resources;

pub use aggregator::{AggregateResult, Aggregator, ResourceSpec, SlotOutcome};
pub use broadcast_hub::{BroadcastEvent, BroadcastHub, Subscription, TickSource};
pub use cache_store::{CacheStats, CacheStore};
pub use node_index::{IndexState, NodeIndex, NodeIndexSnapshot, NodeSource};
pub use resources::{ResourceFetcher, ResourceKind};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::error::{FetchFailure, GatewayError};
use crate::types::{now_millis, NodeRecord};
use crate::upstream::{ExplorerClient, RegistryClient, UpstreamClient};

pub const STATS_UPDATE_EVENT: &str = "stats-update";

/// A node found through the index, with the age of the snapshot it came from.
#[derive(Debug, Clone)]
pub struct NodeMatch {
    pub record: NodeRecord,
    pub fetched_at: OffsetDateTime,
    pub stale: bool,
}

/// Owns every component. Built once per process (or per test) and handed to
/// the route layer by reference.
pub struct Gateway {
    config: Arc<GatewayConfig>,
    cache: Arc<CacheStore<Value>>,
    resources: ResourceFetcher,
    node_index: NodeIndex,
    aggregator: Aggregator,
    hub: Arc<BroadcastHub>,
    started_at: Instant,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let upstream = UpstreamClient::new()?;
        let registry = RegistryClient::new(
            upstream.clone(),
            &config.registry.base_url,
            &config.registry.listing_path,
            config.listing_timeout(),
        )?;
        let explorer = ExplorerClient::new(upstream, &config.explorer)?;
        if !explorer.has_api_key() {
            warn!("No explorer API key configured, token data will be unavailable");
        }

        let cache = Arc::new(CacheStore::new());
        let node_index = NodeIndex::new(Arc::new(registry.clone()), config.refresh_interval());
        let aggregator = Aggregator::new(cache.clone());
        let hub = Arc::new(BroadcastHub::new(config.broadcast.subscriber_buffer));
        let resources = ResourceFetcher::new(config.clone(), registry, explorer);

        info!(
            "Gateway initialized: registry={}, cache ttl={}s, index refresh={}s, broadcast={}s",
            config.registry.base_url,
            config.cache.default_ttl_secs,
            config.index.refresh_interval_secs,
            config.broadcast.interval_secs
        );

        Ok(Self {
            config,
            cache,
            resources,
            node_index,
            aggregator,
            hub,
            started_at: Instant::now(),
        })
    }

    /// Spawn the index warm-up and the background drivers. Cancelling
    /// `cancel` stops the drivers.
    pub fn start(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let warm_index = self.node_index.clone();
        let warm_cancel = cancel.clone();
        let warm_up = tokio::spawn(async move {
            tokio::select! {
                _ = warm_cancel.cancelled() => {
                    info!("Node index warm-up abandoned at shutdown");
                }
                outcome = warm_index.refresh() => {
                    if let Ok(snapshot) = outcome {
                        info!("Node index warmed up with {} nodes", snapshot.len());
                    }
                }
            }
        });

        vec![
            warm_up,
            tokio::spawn(background::refresh_loop(
                self.node_index.clone(),
                self.config.refresh_interval(),
                cancel.clone(),
            )),
            tokio::spawn(background::sweep_loop(
                self.cache.clone(),
                self.config.sweep_interval(),
                cancel.clone(),
            )),
            tokio::spawn(background::broadcast_loop(
                self.hub.clone(),
                self.clone(),
                self.config.broadcast_interval(),
                cancel.clone(),
            )),
        ]
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn node_index(&self) -> &NodeIndex {
        &self.node_index
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Cached fetch of one resource. The boolean is `true` when served from
    /// cache.
    pub async fn cached(
        &self,
        kind: ResourceKind,
        param: Option<&str>,
    ) -> Result<(Value, bool), FetchFailure> {
        let key = kind.cache_key(param);
        let ttl = self.config.ttl_for(kind);
        self.cache
            .get_or_fetch(&key, ttl, || self.resources.fetch(kind, param))
            .await
    }

    pub async fn dashboard(&self, node_id: &str, wallet: &str) -> Result<AggregateResult, GatewayError> {
        let specs = self.resources.dashboard_specs(node_id.trim(), wallet.trim());
        self.aggregator.aggregate(node_id, wallet, specs).await
    }

    pub async fn lookup_node(&self, identifier: &str) -> Result<NodeMatch, GatewayError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(GatewayError::InvalidInput("identifier is required".into()));
        }

        let not_found = || GatewayError::NotFound(format!("no node matches {}", identifier));
        let snapshot = self.node_index.ensure_loaded().await.ok_or_else(not_found)?;
        let record = snapshot.lookup(identifier).cloned().ok_or_else(not_found)?;

        Ok(NodeMatch {
            record,
            fetched_at: snapshot.fetched_at(),
            stale: self.node_index.is_stale(&snapshot),
        })
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.stream()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_flush(&self) {
        self.cache.flush_all();
        info!("Cache cleared by operator");
    }
}

#[async_trait]
impl TickSource for Gateway {
    async fn next_event(&self) -> Option<BroadcastEvent> {
        let network_stats = match self.cached(ResourceKind::NetworkStats, None).await {
            Ok((stats, _)) => Some(stats),
            Err(e) => {
                warn!("Background refresh error: {}", e);
                None
            }
        };
        let index = self.node_index.summary();

        if network_stats.is_none() && index.is_none() {
            return None;
        }

        Some(BroadcastEvent::new(
            STATS_UPDATE_EVENT,
            json!({
                "networkStats": network_stats,
                "index": index,
                "timestamp": now_millis(),
            }),
        ))
    }
}
