//! Message-framed transports
//!
//! A transport moves opaque text frames between the client and a node. The
//! client never looks below this trait, so websocket, IPC and in-memory
//! channels are interchangeable.
//!
//! # Contract
//!
//! - `connect()` opens the channel, replacing any previous one.
//! - `send()` writes one frame; it fails with `Error::NotConnected` when no
//!   channel is open and with `Error::Connection` when the write fails.
//! - `receive()` hands out the inbound frame stream, once per connection.
//!   The stream ends on graceful close and yields one `Err` on abrupt loss.
//! - `close()` is idempotent. It ends a pending inbound stream right away,
//!   even if the remote end never acknowledges the close, and a `send()`
//!   stuck on a peer that stopped reading fails with `Error::NotConnected`.

mod ipc;
mod memory;
mod websocket;

#[cfg(unix)]
pub use ipc::IpcTransport;
pub use memory::{MemoryPeer, MemoryTransport};
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use async_web3_core::Result;
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::{oneshot, watch};

/// Inbound frames of one connection
pub type FrameStream = BoxStream<'static, Result<String>>;

/// Duplex text-frame channel to a node
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the channel
    async fn connect(&self) -> Result<()>;

    /// Send one frame
    async fn send(&self, frame: String) -> Result<()>;

    /// Take the inbound frame stream of the current connection
    async fn receive(&self) -> Result<FrameStream>;

    /// Close the channel and release its resources
    async fn close(&self) -> Result<()>;

    /// Short name used in logs and metrics
    fn kind(&self) -> &'static str;
}

/// Per-connection close signal
///
/// The receiving half is raced against the socket so that a local `close()`
/// ends the frame stream without waiting on the remote end.
pub(crate) fn close_signal() -> (oneshot::Sender<()>, oneshot::Receiver<()>) {
    oneshot::channel()
}

/// Closed/open flag of the write side
///
/// Writes race `closed()`, so closing never waits behind a write the peer
/// is not draining. Starts closed.
pub(crate) struct CloseFlag(watch::Sender<bool>);

impl CloseFlag {
    pub(crate) fn new() -> Self {
        Self(watch::channel(true).0)
    }

    pub(crate) fn open(&self) {
        self.0.send_replace(false);
    }

    pub(crate) fn close(&self) {
        self.0.send_replace(true);
    }

    /// Resolves as soon as the flag is closed, immediately if it already is
    pub(crate) async fn closed(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Bound a frame stream by the connection's close signal
pub(crate) fn until_closed<S>(frames: S, closed: oneshot::Receiver<()>) -> FrameStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    frames.take_until(closed).boxed()
}
