use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::services::resources::ResourceKind;

pub const DEFAULT_REGISTRY_URL: &str = "https://node.netrumlabs.dev";
pub const DEFAULT_EXPLORER_URL: &str = "https://api.etherscan.io/v2/api";
pub const DEFAULT_TOKEN_CONTRACT: &str = "0xb8c2ce84f831175136cebbfd48ce4bab9c7a6424";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub bind: String,
    pub admin_token: Option<String>,
    pub registry: RegistryConfig,
    pub explorer: ExplorerConfig,
    pub cache: CacheConfig,
    pub upstream: UpstreamConfig,
    pub index: IndexConfig,
    pub broadcast: BroadcastConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3001".to_string(),
            admin_token: None,
            registry: RegistryConfig::default(),
            explorer: ExplorerConfig::default(),
            cache: CacheConfig::default(),
            upstream: UpstreamConfig::default(),
            index: IndexConfig::default(),
            broadcast: BroadcastConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub base_url: String,
    /// Bulk listing used to build the node index.
    pub listing_path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REGISTRY_URL.to_string(),
            listing_path: "/lite/nodes/active".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplorerConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chain_id: u64,
    pub token_contract: String,
    pub token_decimals: u32,
    pub transfer_page_size: u32,
    /// Upper bound on transfer pages read per wallet summary.
    pub max_transfer_pages: u32,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EXPLORER_URL.to_string(),
            api_key: None,
            chain_id: 8453,
            token_contract: DEFAULT_TOKEN_CONTRACT.to_string(),
            token_decimals: 18,
            transfer_page_size: 100,
            max_transfer_pages: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub default_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Per resource kind overrides, keyed by kind name (e.g. "network-stats").
    pub ttl_secs: BTreeMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 30,
            sweep_interval_secs: 10,
            ttl_secs: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    pub default_timeout_ms: u64,
    pub timeout_ms: BTreeMap<String, u64>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        let mut timeout_ms = BTreeMap::new();
        timeout_ms.insert(ResourceKind::MiningDebug.name().to_string(), 15_000);
        Self {
            default_timeout_ms: 10_000,
            timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    pub refresh_interval_secs: u64,
    pub listing_timeout_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 300,
            listing_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BroadcastConfig {
    pub interval_secs: u64,
    pub subscriber_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval_secs: 35,
            subscriber_buffer: 16,
        }
    }
}

impl GatewayConfig {
    /// Load from a TOML file. A missing path yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {:?}", path))?;
                Self::from_toml(&text).with_context(|| format!("Failed to parse {:?}", path))?
            }
            None => Self::default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        for key in self.cache.ttl_secs.keys().chain(self.upstream.timeout_ms.keys()) {
            if ResourceKind::from_name(key).is_none() {
                anyhow::bail!("Unknown resource kind in config: {}", key);
            }
        }
        if self.index.refresh_interval_secs == 0 {
            anyhow::bail!("index.refresh_interval_secs must be greater than zero");
        }
        if self.broadcast.interval_secs == 0 {
            anyhow::bail!("broadcast.interval_secs must be greater than zero");
        }
        if self.cache.sweep_interval_secs == 0 {
            anyhow::bail!("cache.sweep_interval_secs must be greater than zero");
        }
        if self.explorer.transfer_page_size == 0 || self.explorer.max_transfer_pages == 0 {
            anyhow::bail!("explorer paging limits must be greater than zero");
        }
        if self.broadcast.subscriber_buffer == 0 {
            anyhow::bail!("broadcast.subscriber_buffer must be greater than zero");
        }
        Ok(())
    }

    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        let secs = self
            .cache
            .ttl_secs
            .get(kind.name())
            .copied()
            .unwrap_or(self.cache.default_ttl_secs);
        Duration::from_secs(secs)
    }

    pub fn timeout_for(&self, kind: ResourceKind) -> Duration {
        let ms = self
            .upstream
            .timeout_ms
            .get(kind.name())
            .copied()
            .unwrap_or(self.upstream.default_timeout_ms);
        Duration::from_millis(ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.index.refresh_interval_secs)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_millis(self.index.listing_timeout_ms)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast.interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }
}
