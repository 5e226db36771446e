//! In-process transport
//!
//! `MemoryTransport::pair()` returns the client side and a `MemoryPeer` that
//! plays the node. Useful for tests and for embedding a node in-process.

use super::{close_signal, until_closed, FrameStream, Transport};
use async_trait::async_trait;
use async_web3_core::{codec, Error, JsonRpcRequest, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, oneshot, Mutex};

/// Client side of an in-process channel
///
/// The channel carries one connection only: after the frame stream has been
/// taken and the connection closed, `connect()` fails.
pub struct MemoryTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<Result<String>>>>,
    shutdown: Mutex<Option<(oneshot::Sender<()>, Option<oneshot::Receiver<()>>)>>,
    open: AtomicBool,
}

/// Node side of an in-process channel
pub struct MemoryPeer {
    to_client: Option<mpsc::UnboundedSender<Result<String>>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryTransport {
    /// Create a connected transport/peer pair
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let transport = MemoryTransport {
            outbound: outbound_tx,
            inbound: Mutex::new(Some(inbound_rx)),
            shutdown: Mutex::new(None),
            open: AtomicBool::new(false),
        };
        let peer = MemoryPeer {
            to_client: Some(inbound_tx),
            from_client: outbound_rx,
        };
        (transport, peer)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<()> {
        if self.inbound.lock().await.is_none() {
            return Err(Error::Connection("in-memory channel already consumed".to_string()));
        }
        let (tx, rx) = close_signal();
        *self.shutdown.lock().await = Some((tx, Some(rx)));
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, frame: String) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        self.outbound
            .send(frame)
            .map_err(|_| Error::Connection("in-memory peer dropped".to_string()))
    }

    async fn receive(&self) -> Result<FrameStream> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        let closed = self
            .shutdown
            .lock()
            .await
            .as_mut()
            .and_then(|(_, rx)| rx.take())
            .ok_or(Error::NotConnected)?;
        let rx = self.inbound.lock().await.take().ok_or(Error::NotConnected)?;

        let frames = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(until_closed(frames, closed))
    }

    async fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        if let Some((tx, _)) = self.shutdown.lock().await.take() {
            let _ = tx.send(());
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

impl MemoryPeer {
    /// Next frame sent by the client, `None` once the client side is gone
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame sent by the client, parsed as a request
    pub async fn recv_request(&mut self) -> Option<JsonRpcRequest> {
        let frame = self.recv().await?;
        match codec::decode_as(&frame) {
            Ok(request) => Some(request),
            Err(e) => {
                tracing::warn!(error = %e, frame = %frame, "Peer received a non-request frame");
                None
            }
        }
    }

    /// Push a frame to the client; false when the channel is closed
    pub fn send(&self, frame: impl Into<String>) -> bool {
        match &self.to_client {
            Some(tx) => tx.send(Ok(frame.into())).is_ok(),
            None => false,
        }
    }

    /// End the connection gracefully
    pub fn close(&mut self) {
        self.to_client = None;
    }

    /// End the connection with a transport error
    pub fn fail(&mut self, reason: impl Into<String>) {
        if let Some(tx) = self.to_client.take() {
            let _ = tx.send(Err(Error::Connection(reason.into())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (transport, mut peer) = MemoryTransport::pair();
        transport.connect().await.unwrap();
        let mut frames = transport.receive().await.unwrap();

        transport.send("out".to_string()).await.unwrap();
        assert_eq!(peer.recv().await.unwrap(), "out");

        assert!(peer.send("in"));
        assert_eq!(frames.next().await.unwrap().unwrap(), "in");
    }

    #[tokio::test]
    async fn test_peer_close_is_graceful() {
        let (transport, mut peer) = MemoryTransport::pair();
        transport.connect().await.unwrap();
        let mut frames = transport.receive().await.unwrap();

        peer.close();
        assert!(frames.next().await.is_none());
        assert!(!peer.send("late"));
    }

    #[tokio::test]
    async fn test_peer_fail_is_abrupt() {
        let (transport, mut peer) = MemoryTransport::pair();
        transport.connect().await.unwrap();
        let mut frames = transport.receive().await.unwrap();

        peer.fail("cable cut");
        assert!(frames.next().await.unwrap().unwrap_err().is_connection_error());
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_local_close_ends_stream() {
        let (transport, _peer) = MemoryTransport::pair();
        transport.connect().await.unwrap();
        let mut frames = transport.receive().await.unwrap();

        transport.close().await.unwrap();
        assert!(frames.next().await.is_none());
        assert!(matches!(
            transport.send("x".to_string()).await,
            Err(Error::NotConnected)
        ));
        assert!(transport.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_send_before_connect() {
        let (transport, _peer) = MemoryTransport::pair();
        assert!(matches!(
            transport.send("x".to_string()).await,
            Err(Error::NotConnected)
        ));
    }
}
