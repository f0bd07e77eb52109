use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A named event pushed to every live viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastEvent {
    pub name: String,
    pub data: Value,
}

impl BroadcastEvent {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle(Uuid);

impl SubscriberHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub removed: usize,
}

/// Produces the payload for each broadcast tick. `None` skips the tick.
#[async_trait]
pub trait TickSource: Send + Sync + 'static {
    async fn next_event(&self) -> Option<BroadcastEvent>;
}

/// Registry of live viewer connections. Each viewer owns a bounded queue;
/// a viewer whose queue is closed or full is dropped on the next publish.
pub struct BroadcastHub {
    subscribers: Mutex<HashMap<SubscriberHandle, mpsc::Sender<BroadcastEvent>>>,
    buffer: usize,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Register a viewer. Nothing is sent until the next tick.
    pub fn subscribe(&self) -> (SubscriberHandle, mpsc::Receiver<BroadcastEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let handle = SubscriberHandle::new();

        let count = {
            let mut subscribers = self.subscribers.lock();
            subscribers.insert(handle, tx);
            subscribers.len()
        };
        info!("Client connected ({}). Total clients: {}", handle, count);

        (handle, rx)
    }

    /// Register a viewer as a stream that unsubscribes itself when dropped.
    pub fn stream(self: &Arc<Self>) -> Subscription {
        let (handle, rx) = self.subscribe();
        Subscription {
            hub: self.clone(),
            handle,
            rx,
        }
    }

    /// Safe to call repeatedly or for a handle that is already gone.
    pub fn unsubscribe(&self, handle: SubscriberHandle) {
        let (removed, count) = {
            let mut subscribers = self.subscribers.lock();
            let removed = subscribers.remove(&handle).is_some();
            (removed, subscribers.len())
        };
        if removed {
            info!("Client disconnected ({}). Total clients: {}", handle, count);
        }
    }

    /// Drop every subscriber, ending their streams. Used at shutdown.
    pub fn close_all(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        let count = subscribers.len();
        subscribers.clear();
        count
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver `event` to every current viewer. Delivery runs over a copy of
    /// the subscriber set, so concurrent subscribe/unsubscribe is harmless.
    pub fn publish(&self, event: &BroadcastEvent) -> DeliveryReport {
        let targets: Vec<(SubscriberHandle, mpsc::Sender<BroadcastEvent>)> = self
            .subscribers
            .lock()
            .iter()
            .map(|(handle, tx)| (*handle, tx.clone()))
            .collect();

        let mut report = DeliveryReport::default();
        let mut failed = Vec::new();

        for (handle, tx) in targets {
            match tx.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Client {} is not keeping up, dropping it", handle);
                    failed.push(handle);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Client {} went away", handle);
                    failed.push(handle);
                }
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers.lock();
            for handle in &failed {
                if subscribers.remove(handle).is_some() {
                    report.removed += 1;
                }
            }
            info!(
                "Removed {} broken client(s). Total clients: {}",
                report.removed,
                subscribers.len()
            );
        }

        debug!(
            "Broadcast '{}' delivered to {} client(s)",
            event.name, report.delivered
        );
        report
    }
}

/// Event stream for one viewer.
pub struct Subscription {
    hub: Arc<BroadcastHub>,
    handle: SubscriberHandle,
    rx: mpsc::Receiver<BroadcastEvent>,
}

impl Subscription {
    pub fn handle(&self) -> SubscriberHandle {
        self.handle
    }
}

impl Stream for Subscription {
    type Item = BroadcastEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.handle);
    }
}
