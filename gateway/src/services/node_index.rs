use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::FetchFailure;
use crate::types::{IndexSummary, NodeRecord, NodeStatus};

/// Where the full node population comes from.
#[async_trait]
pub trait NodeSource: Send + Sync + 'static {
    async fn fetch_nodes(&self) -> Result<Vec<NodeRecord>, FetchFailure>;
}

/// Immutable, fully built view of the node population. Replaced wholesale
/// on refresh, never edited.
#[derive(Debug)]
pub struct NodeIndexSnapshot {
    nodes: Vec<NodeRecord>,
    by_id: HashMap<String, usize>,
    by_wallet: HashMap<String, usize>,
    fetched_at: OffsetDateTime,
    built_at: Instant,
}

impl NodeIndexSnapshot {
    pub fn build(records: Vec<NodeRecord>) -> Self {
        let mut nodes = Vec::with_capacity(records.len());
        let mut by_id = HashMap::with_capacity(records.len());
        let mut by_wallet = HashMap::with_capacity(records.len());
        let mut duplicates = 0usize;

        for record in records {
            let id_key = record.node_id.to_lowercase();
            if by_id.contains_key(&id_key) {
                duplicates += 1;
                continue;
            }
            let idx = nodes.len();
            by_id.insert(id_key, idx);
            if !record.wallet.is_empty() {
                // A wallet may own several nodes; the first listed wins.
                by_wallet.entry(record.wallet.to_lowercase()).or_insert(idx);
            }
            nodes.push(record);
        }

        if duplicates > 0 {
            warn!("Dropped {} duplicate node ids while building index", duplicates);
        }

        Self {
            nodes,
            by_id,
            by_wallet,
            fetched_at: OffsetDateTime::now_utc(),
            built_at: Instant::now(),
        }
    }

    /// Case-insensitive match on node id first, then wallet.
    pub fn lookup(&self, identifier: &str) -> Option<&NodeRecord> {
        let key = identifier.trim().to_lowercase();
        self.by_id
            .get(&key)
            .or_else(|| self.by_wallet.get(&key))
            .map(|&idx| &self.nodes[idx])
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn fetched_at(&self) -> OffsetDateTime {
        self.fetched_at
    }

    pub fn age(&self) -> Duration {
        self.built_at.elapsed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Empty,
    Loading,
    Ready,
}

impl IndexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexState::Empty => "empty",
            IndexState::Loading => "loading",
            IndexState::Ready => "ready",
        }
    }
}

type RefreshOutcome = Result<Arc<NodeIndexSnapshot>, FetchFailure>;
type RefreshFuture = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlight {
    generation: u64,
    future: RefreshFuture,
}

struct Inner {
    source: Arc<dyn NodeSource>,
    snapshot: RwLock<Option<Arc<NodeIndexSnapshot>>>,
    in_flight: Mutex<Option<InFlight>>,
    generation: AtomicU64,
    refresh_interval: Duration,
}

/// Clears the in-flight slot when the refresh task ends, including on panic.
struct FlightGuard {
    inner: Arc<Inner>,
    generation: u64,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut slot = self.inner.in_flight.lock();
        if slot.as_ref().map(|f| f.generation) == Some(self.generation) {
            *slot = None;
        }
    }
}

/// Periodically refreshed, queryable snapshot of every node. Cheap to clone.
#[derive(Clone)]
pub struct NodeIndex {
    inner: Arc<Inner>,
}

impl NodeIndex {
    pub fn new(source: Arc<dyn NodeSource>, refresh_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                snapshot: RwLock::new(None),
                in_flight: Mutex::new(None),
                generation: AtomicU64::new(0),
                refresh_interval,
            }),
        }
    }

    /// Current snapshot, whatever its age.
    pub fn snapshot(&self) -> Option<Arc<NodeIndexSnapshot>> {
        self.inner.snapshot.read().clone()
    }

    pub fn state(&self) -> IndexState {
        if self.inner.in_flight.lock().is_some() {
            IndexState::Loading
        } else if self.inner.snapshot.read().is_some() {
            IndexState::Ready
        } else {
            IndexState::Empty
        }
    }

    pub fn refresh_in_flight(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Older than one refresh interval. Informational only.
    pub fn is_stale(&self, snapshot: &NodeIndexSnapshot) -> bool {
        snapshot.age() > self.inner.refresh_interval
    }

    /// Return the existing snapshot regardless of age, or load the first one.
    /// A failed first load yields `None`; the failure itself is only logged.
    pub async fn ensure_loaded(&self) -> Option<Arc<NodeIndexSnapshot>> {
        if let Some(snapshot) = self.snapshot() {
            if self.is_stale(&snapshot) {
                debug!(
                    "Serving stale node index snapshot (age {:?}, {} nodes)",
                    snapshot.age(),
                    snapshot.len()
                );
            }
            return Some(snapshot);
        }

        match self.refresh().await {
            Ok(snapshot) => Some(snapshot),
            Err(_) => self.snapshot(),
        }
    }

    pub async fn lookup(&self, identifier: &str) -> Option<NodeRecord> {
        let snapshot = self.ensure_loaded().await?;
        snapshot.lookup(identifier).cloned()
    }

    /// Single-flight refresh: joins the running refresh if there is one,
    /// otherwise starts a new one. The refresh runs in its own task, so it
    /// finishes even if every caller stops waiting.
    pub async fn refresh(&self) -> RefreshOutcome {
        let future = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(flight) => {
                    debug!("Joining in-flight node index refresh (generation {})", flight.generation);
                    flight.future.clone()
                }
                None => {
                    let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
                    let guard = FlightGuard {
                        inner: self.inner.clone(),
                        generation,
                    };
                    let task = tokio::spawn(async move {
                        let outcome = guard.inner.run_refresh(generation).await;
                        drop(guard);
                        outcome
                    });
                    let future = async move {
                        match task.await {
                            Ok(outcome) => outcome,
                            Err(e) => Err(FetchFailure::unreachable(format!(
                                "node index refresh task failed: {}",
                                e
                            ))),
                        }
                    }
                    .boxed()
                    .shared();

                    *slot = Some(InFlight {
                        generation,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        future.await
    }

    pub fn summary(&self) -> Option<IndexSummary> {
        let snapshot = self.snapshot()?;
        let active = snapshot
            .nodes()
            .iter()
            .filter(|n| n.status == NodeStatus::Active)
            .count();

        Some(IndexSummary {
            node_count: snapshot.len(),
            active,
            inactive: snapshot.len() - active,
            fetched_at: Some(snapshot.fetched_at()),
            stale: self.is_stale(&snapshot),
        })
    }
}

impl Inner {
    async fn run_refresh(&self, generation: u64) -> RefreshOutcome {
        info!("Refreshing node index (generation {})", generation);
        let started = Instant::now();

        let nodes = match self.source.fetch_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("Node index refresh failed, keeping previous snapshot: {}", e);
                return Err(e);
            }
        };

        let previous = self.snapshot.read().clone();
        if nodes.is_empty() && previous.as_ref().is_some_and(|p| !p.is_empty()) {
            warn!("Registry returned an empty node listing, keeping previous snapshot");
            return Err(FetchFailure::invalid_body("empty node listing"));
        }

        let snapshot = Arc::new(NodeIndexSnapshot::build(nodes));
        *self.snapshot.write() = Some(snapshot.clone());

        info!(
            "Node index refreshed: {} nodes in {:?} (generation {})",
            snapshot.len(),
            started.elapsed(),
            generation
        );
        Ok(snapshot)
    }
}
