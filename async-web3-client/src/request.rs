//! Pending request tracking
//!
//! Every outgoing call gets an id from a per-session counter and a oneshot
//! slot in the registry. The dispatcher resolves the slot when the response
//! with that id arrives; the caller awaits the matching `PendingCall`.
//!
//! # Request Lifecycle
//!
//! 1. **Register**: allocate id, store waiter
//! 2. **Send**: the client writes the request frame
//! 3. **Wait**: the caller awaits its `PendingCall`
//! 4. **Resolve**: the dispatcher matches the id and fulfils the waiter
//!
//! Dropping a `PendingCall` before it resolves (timeout, cancelled task)
//! removes its entry, so a late response is dropped as unknown.
//!
//! The map is a `DashMap` so that `Drop` can clean up synchronously without
//! an async lock.

use crate::methods::SubscriptionKind;
use async_web3_core::{Error, Result};
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Outstanding call waiting for its response
pub(crate) struct Waiter {
    tx: oneshot::Sender<Result<Value>>,
    kind: Option<SubscriptionKind>,
    created_at: Instant,
}

impl Waiter {
    /// Subscription feed requested by this call, if it is a subscribe call
    pub(crate) fn kind(&self) -> Option<SubscriptionKind> {
        self.kind
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Hand the outcome to the caller; false when the caller is gone
    pub(crate) fn complete(self, outcome: Result<Value>) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

/// Registry of in-flight calls for one session
#[derive(Clone)]
pub struct RequestRegistry {
    pending: Arc<DashMap<u64, Waiter>>,
    counter: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl RequestRegistry {
    /// Create an empty registry; the first id is 1
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            counter: Arc::new(AtomicU64::new(1)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Allocate an id and store a waiter for it
    ///
    /// Fails with `Error::ConnectionClosed` once `fail_all` has run.
    pub fn register(&self, kind: Option<SubscriptionKind>) -> Result<(u64, PendingCall)> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            Waiter {
                tx,
                kind,
                created_at: Instant::now(),
            },
        );

        // fail_all may have drained the map between the check and the insert.
        if self.closed.load(Ordering::SeqCst) {
            self.pending.remove(&id);
            return Err(Error::ConnectionClosed);
        }

        let call = PendingCall {
            id,
            rx,
            pending: Arc::clone(&self.pending),
            // A cancelled subscribe stays registered so the dispatcher can
            // unsubscribe the id the node hands back.
            keep_on_drop: kind.is_some(),
            done: false,
        };
        Ok((id, call))
    }

    /// Remove the waiter for `id`
    pub(crate) fn take(&self, id: u64) -> Option<Waiter> {
        self.pending.remove(&id).map(|(_, waiter)| waiter)
    }

    /// Resolve the waiter for `id`
    ///
    /// Returns false when no waiter is registered (late, duplicate or
    /// foreign response) or its caller has gone away.
    pub fn resolve(&self, id: u64, outcome: Result<Value>) -> bool {
        match self.take(id) {
            Some(waiter) => waiter.complete(outcome),
            None => {
                tracing::debug!(id, "Dropping response for unknown request id");
                false
            }
        }
    }

    /// Fail every outstanding waiter and refuse new registrations
    pub fn fail_all(&self, error: Error) {
        self.closed.store(true, Ordering::SeqCst);

        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0usize;
        for id in ids {
            if let Some((_, waiter)) = self.pending.remove(&id) {
                waiter.complete(Err(error.clone()));
                failed += 1;
            }
        }

        if failed > 0 {
            tracing::debug!(failed, error = %error, "Failed pending requests");
        }
    }

    /// Number of calls awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Id the next registration will receive
    pub fn next_id(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller's half of a registered call
///
/// Resolves to the call's outcome. If the registry goes away without
/// resolving it, the call fails with `Error::ConnectionClosed`.
pub struct PendingCall {
    id: u64,
    rx: oneshot::Receiver<Result<Value>>,
    pending: Arc<DashMap<u64, Waiter>>,
    keep_on_drop: bool,
    done: bool,
}

impl PendingCall {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(outcome) => {
                self.done = true;
                Poll::Ready(outcome.unwrap_or(Err(Error::ConnectionClosed)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.done && !self.keep_on_drop {
            self.pending.remove(&self.id);
        }
    }
}
