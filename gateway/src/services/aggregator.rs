use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::cache_store::CacheStore;
use crate::error::{FetchFailure, GatewayError};
use crate::types::{now_millis, DashboardResponse};

pub type FetchFuture = BoxFuture<'static, Result<Value, FetchFailure>>;

/// One slot of an aggregate: where its result lands, how it is cached and
/// how to fetch it on a miss.
pub struct ResourceSpec {
    pub slot: String,
    pub cache_key: String,
    pub ttl: Duration,
    pub fetch: Box<dyn FnOnce() -> FetchFuture + Send>,
}

impl ResourceSpec {
    pub fn new<F>(slot: impl Into<String>, cache_key: impl Into<String>, ttl: Duration, fetch: F) -> Self
    where
        F: FnOnce() -> FetchFuture + Send + 'static,
    {
        Self {
            slot: slot.into(),
            cache_key: cache_key.into(),
            ttl,
            fetch: Box::new(fetch),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotOutcome {
    Success { data: Value, from_cache: bool },
    Failure(FetchFailure),
}

impl SlotOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SlotOutcome::Success { .. })
    }
}

/// Per-slot outcomes of one aggregate call. Holds at least one success.
#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    slots: BTreeMap<String, SlotOutcome>,
}

impl AggregateResult {
    pub fn get(&self, slot: &str) -> Option<&SlotOutcome> {
        self.slots.get(slot)
    }

    pub fn slots(&self) -> impl Iterator<Item = (&str, &SlotOutcome)> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn success_count(&self) -> usize {
        self.slots.values().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.slots.len() - self.success_count()
    }

    /// Every slot appears in `data`; failed slots are `null` there and carry
    /// their reason in `errors`.
    pub fn into_response(self) -> DashboardResponse {
        let mut data = BTreeMap::new();
        let mut errors = BTreeMap::new();

        for (slot, outcome) in self.slots {
            match outcome {
                SlotOutcome::Success { data: value, .. } => {
                    data.insert(slot, value);
                }
                SlotOutcome::Failure(reason) => {
                    let reason = serde_json::to_value(&reason).unwrap_or(Value::Null);
                    errors.insert(slot.clone(), reason);
                    data.insert(slot, Value::Null);
                }
            }
        }

        DashboardResponse {
            success: true,
            timestamp: now_millis(),
            data,
            errors,
        }
    }
}

/// Settle-all fan-out over cached resources.
#[derive(Clone)]
pub struct Aggregator {
    cache: Arc<CacheStore<Value>>,
}

impl Aggregator {
    pub fn new(cache: Arc<CacheStore<Value>>) -> Self {
        Self { cache }
    }

    /// Start every slot, then wait for all of them. A slow or failing slot
    /// never holds back or blanks out the others; only a call where no slot
    /// succeeds is an error.
    pub async fn aggregate(
        &self,
        node_id: &str,
        wallet: &str,
        specs: Vec<ResourceSpec>,
    ) -> Result<AggregateResult, GatewayError> {
        if node_id.trim().is_empty() {
            return Err(GatewayError::InvalidInput("nodeId is required".into()));
        }
        if wallet.trim().is_empty() {
            return Err(GatewayError::InvalidInput("wallet address is required".into()));
        }
        if specs.is_empty() {
            return Err(GatewayError::InvalidInput("no resources requested".into()));
        }
        let mut seen = HashSet::with_capacity(specs.len());
        if let Some(dup) = specs.iter().find(|spec| !seen.insert(spec.slot.as_str())) {
            return Err(GatewayError::InvalidInput(format!(
                "slot {} requested more than once",
                dup.slot
            )));
        }

        let pending = specs.into_iter().map(|spec| {
            let cache = &self.cache;
            async move {
                let ResourceSpec {
                    slot,
                    cache_key,
                    ttl,
                    fetch,
                } = spec;
                let outcome = match cache.get_or_fetch(&cache_key, ttl, fetch).await {
                    Ok((data, from_cache)) => SlotOutcome::Success { data, from_cache },
                    Err(reason) => SlotOutcome::Failure(reason),
                };
                (slot, outcome)
            }
        });

        let slots: BTreeMap<String, SlotOutcome> = join_all(pending).await.into_iter().collect();
        let result = AggregateResult { slots };

        debug!(
            "Aggregate for node={} wallet={}: {} ok, {} failed",
            node_id,
            wallet,
            result.success_count(),
            result.failure_count()
        );

        if result.success_count() == 0 {
            warn!("Every upstream resource failed for node={} wallet={}", node_id, wallet);
            let failures = result
                .slots
                .into_iter()
                .filter_map(|(slot, outcome)| match outcome {
                    SlotOutcome::Failure(reason) => Some((slot, reason)),
                    SlotOutcome::Success { .. } => None,
                })
                .collect();
            return Err(GatewayError::AllUpstreamsFailed { failures });
        }

        Ok(result)
    }
}
