//! Push subscriptions
//!
//! The dispatcher opens a slot in the `SubscriptionRegistry` as soon as a
//! subscribe call's response carries the node's subscription id, then pushes
//! every matching notification into that slot. The subscriber reads them
//! back through a `Subscription` stream.
//!
//! # Backpressure
//!
//! Each slot is a bounded `broadcast` ring. When a consumer falls behind,
//! the oldest queued notifications are overwritten; the consumer logs how
//! many it skipped and carries on. Delivery never waits on a consumer.
//!
//! # End of stream
//!
//! - `unsubscribe`, a local `close()` or a clean transport end: the stream
//!   ends after the notifications already queued.
//! - Abrupt transport loss: the stream yields one `Err(Error::Connection)`
//!   and then ends.

use crate::client::{Session, Web3Client};
use crate::methods::SubscriptionKind;
use crate::metrics::ClientMetrics;
use async_web3_core::{Error, Result};
use dashmap::DashMap;
use futures::stream::{BoxStream, Fuse, Stream, StreamExt};
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

/// Default queue capacity per subscription
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 1024;

struct Slot {
    kind: SubscriptionKind,
    tx: broadcast::Sender<Result<Value>>,
    /// Receiving end, parked until the subscriber claims it
    parked: Option<broadcast::Receiver<Result<Value>>>,
}

/// Open subscriptions of one session, keyed by node-assigned id
pub struct SubscriptionRegistry {
    slots: DashMap<String, Slot>,
    capacity: usize,
}

impl SubscriptionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Open a subscription with an empty queue
    ///
    /// Returns false and keeps the existing entry if `id` is already open.
    pub fn open(&self, id: &str, kind: SubscriptionKind) -> bool {
        if self.slots.contains_key(id) {
            tracing::warn!(subscription_id = %id, "Subscription id already open");
            return false;
        }
        let (tx, rx) = broadcast::channel(self.capacity);
        self.slots.insert(
            id.to_string(),
            Slot {
                kind,
                tx,
                parked: Some(rx),
            },
        );
        tracing::debug!(subscription_id = %id, kind = %kind, "Subscription opened");
        true
    }

    /// Claim the receiving end of an open subscription, once
    pub fn take_receiver(&self, id: &str) -> Option<broadcast::Receiver<Result<Value>>> {
        self.slots.get_mut(id)?.parked.take()
    }

    /// Queue a notification; false when `id` is not open or nobody listens
    pub fn deliver(&self, id: &str, value: Value) -> bool {
        match self.slots.get(id) {
            Some(slot) => slot.tx.send(Ok(value)).is_ok(),
            None => false,
        }
    }

    /// Close a subscription; its consumer sees the end of the stream
    pub fn close(&self, id: &str) -> bool {
        match self.slots.remove(id) {
            Some((_, slot)) => {
                tracing::debug!(subscription_id = %id, kind = %slot.kind, "Subscription closed");
                true
            }
            None => false,
        }
    }

    /// Close every subscription, first queueing `terminal` if given
    ///
    /// Returns the number of subscriptions closed.
    pub fn close_all(&self, terminal: Option<Error>) -> usize {
        let ids: Vec<String> = self.slots.iter().map(|entry| entry.key().clone()).collect();
        let mut closed = 0;
        for id in ids {
            if let Some((_, slot)) = self.slots.remove(&id) {
                if let Some(err) = &terminal {
                    let _ = slot.tx.send(Err(err.clone()));
                }
                closed += 1;
            }
        }
        closed
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    pub fn kind(&self, id: &str) -> Option<SubscriptionKind> {
        self.slots.get(id).map(|slot| slot.kind)
    }

    /// Number of open subscriptions
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIPTION_CAPACITY)
    }
}

/// Turn a slot receiver into a notification stream
fn notifications(
    rx: broadcast::Receiver<Result<Value>>,
    id: String,
    metrics: Option<Arc<ClientMetrics>>,
) -> BoxStream<'static, Result<Value>> {
    futures::stream::unfold((rx, id, metrics), |(mut rx, id, metrics)| async move {
        loop {
            match rx.recv().await {
                Ok(item) => return Some((item, (rx, id, metrics))),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        subscription_id = %id,
                        skipped,
                        "Subscriber lagging, dropped oldest notifications"
                    );
                    if let Some(ref m) = metrics {
                        m.record_notifications_dropped(skipped, "lagged");
                    }
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

/// Stream of notifications for one subscription
///
/// Items arrive in the order the node sent them. The stream is fused: once
/// it has ended it keeps returning `None`.
///
/// Dropping an open `Subscription` inside a Tokio runtime sends a
/// best-effort unsubscribe in the background. Call
/// [`Web3Client::unsubscribe`] to learn the node's answer.
pub struct Subscription {
    id: String,
    kind: SubscriptionKind,
    items: Fuse<BoxStream<'static, Result<Value>>>,
    session: Arc<Session>,
    client: Web3Client,
}

impl Subscription {
    pub(crate) fn new(
        id: String,
        kind: SubscriptionKind,
        rx: broadcast::Receiver<Result<Value>>,
        session: Arc<Session>,
        client: Web3Client,
    ) -> Self {
        let items = notifications(rx, id.clone(), client.metrics().cloned()).fuse();
        Self {
            id,
            kind,
            items,
            session,
            client,
        }
    }

    /// Node-assigned subscription id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// Whether the node side is still considered open
    pub fn is_open(&self) -> bool {
        self.session.subscriptions.is_open(&self.id)
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Stream for Subscription {
    type Item = Result<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.items.poll_next_unpin(cx)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.is_open() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                let session = Arc::clone(&self.session);
                let kind = self.kind;
                let id = self.id.clone();
                handle.spawn(async move {
                    if let Err(e) = client.unsubscribe_in(&session, kind, &id).await {
                        tracing::debug!(subscription_id = %id, error = %e, "Background unsubscribe failed");
                    }
                });
            }
            Err(_) => {
                self.session.subscriptions.close(&self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_deliver_in_order() {
        let registry = SubscriptionRegistry::new(16);
        assert!(registry.open("0x1", SubscriptionKind::NewHeads));
        let rx = registry.take_receiver("0x1").unwrap();
        let mut stream = notifications(rx, "0x1".into(), None);

        assert!(registry.deliver("0x1", json!(1)));
        assert!(registry.deliver("0x1", json!(2)));

        assert_eq!(stream.next().await.unwrap().unwrap(), json!(1));
        assert_eq!(stream.next().await.unwrap().unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_deliver_to_unknown_id() {
        let registry = SubscriptionRegistry::new(16);
        assert!(!registry.deliver("0xdead", json!(1)));
    }

    #[tokio::test]
    async fn test_receiver_claimed_once() {
        let registry = SubscriptionRegistry::new(16);
        registry.open("0x1", SubscriptionKind::Logs);

        assert!(registry.take_receiver("0x1").is_some());
        assert!(registry.take_receiver("0x1").is_none());
        assert!(registry.take_receiver("0x2").is_none());
    }

    #[tokio::test]
    async fn test_reopen_keeps_existing() {
        let registry = SubscriptionRegistry::new(16);
        assert!(registry.open("0x1", SubscriptionKind::Logs));
        assert!(!registry.open("0x1", SubscriptionKind::NewHeads));
        assert_eq!(registry.kind("0x1"), Some(SubscriptionKind::Logs));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let registry = SubscriptionRegistry::new(16);
        registry.open("0x1", SubscriptionKind::NewHeads);
        let rx = registry.take_receiver("0x1").unwrap();
        let mut stream = notifications(rx, "0x1".into(), None).fuse();

        registry.deliver("0x1", json!("queued"));
        assert!(registry.close("0x1"));
        assert!(!registry.close("0x1"));
        assert!(!registry.deliver("0x1", json!("late")));

        assert_eq!(stream.next().await.unwrap().unwrap(), json!("queued"));
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_close_all_with_terminal_error() {
        let registry = SubscriptionRegistry::new(16);
        registry.open("0x1", SubscriptionKind::NewHeads);
        registry.open("0x2", SubscriptionKind::Syncing);
        let mut s1 = notifications(registry.take_receiver("0x1").unwrap(), "0x1".into(), None);
        let mut s2 = notifications(registry.take_receiver("0x2").unwrap(), "0x2".into(), None);

        let closed = registry.close_all(Some(Error::Connection("reset".into())));
        assert_eq!(closed, 2);
        assert!(registry.is_empty());

        for stream in [&mut s1, &mut s2] {
            assert!(stream.next().await.unwrap().unwrap_err().is_connection_error());
            assert!(stream.next().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_close_all_graceful() {
        let registry = SubscriptionRegistry::new(16);
        registry.open("0x1", SubscriptionKind::NewHeads);
        let mut stream = notifications(registry.take_receiver("0x1").unwrap(), "0x1".into(), None);

        registry.close_all(None);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_consumer_loses_oldest() {
        let registry = SubscriptionRegistry::new(4);
        registry.open("0x1", SubscriptionKind::NewPendingTransactions);
        let mut stream = notifications(registry.take_receiver("0x1").unwrap(), "0x1".into(), None);

        // Never blocks even though nobody is reading.
        for n in 0..10 {
            assert!(registry.deliver("0x1", json!(n)));
        }
        registry.close("0x1");

        let mut seen = Vec::new();
        while let Some(item) = stream.next().await {
            seen.push(item.unwrap());
        }
        assert_eq!(seen, vec![json!(6), json!(7), json!(8), json!(9)]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        assert_eq!(SubscriptionRegistry::new(0).capacity(), 1);
        assert_eq!(
            SubscriptionRegistry::default().capacity(),
            DEFAULT_SUBSCRIPTION_CAPACITY
        );
    }
}
