use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::broadcast_hub::{BroadcastHub, TickSource};
use super::cache_store::CacheStore;
use super::node_index::NodeIndex;

fn ticker(period: Duration) -> tokio::time::Interval {
    // First tick after one full period, not immediately.
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Refreshes the node index on a fixed interval. Uses the same single-flight
/// path as on-demand refreshes.
pub async fn refresh_loop(index: NodeIndex, period: Duration, cancel: CancellationToken) {
    info!("Starting node index refresh loop (every {:?})", period);
    let mut interval = ticker(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                // Failures are logged inside the index.
                let _ = index.refresh().await;
            }
        }
    }

    info!("Node index refresh loop stopped");
}

/// Drops expired cache entries. Reads already treat them as misses.
pub async fn sweep_loop(cache: Arc<CacheStore<Value>>, period: Duration, cancel: CancellationToken) {
    info!("Starting cache sweep (every {:?})", period);
    let mut interval = ticker(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!("Cache sweep removed {} expired entries", removed);
                }
            }
        }
    }

    info!("Cache sweep stopped");
}

/// Pushes one event per tick to every subscriber. Ticks never overlap: the
/// next one is not awaited until the current one has been delivered.
pub async fn broadcast_loop(
    hub: Arc<BroadcastHub>,
    source: Arc<dyn TickSource>,
    period: Duration,
    cancel: CancellationToken,
) {
    info!("Starting broadcast loop (every {:?})", period);
    let mut interval = ticker(period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match source.next_event().await {
                    Some(event) => {
                        hub.publish(&event);
                    }
                    None => warn!("Background refresh produced no data, skipping broadcast tick"),
                }
            }
        }
    }

    let closed = hub.close_all();
    info!("Broadcast loop stopped, closed {} client stream(s)", closed);
}
