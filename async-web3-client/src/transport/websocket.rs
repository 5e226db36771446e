//! WebSocket transport (`ws://` and `wss://`)

use super::{close_signal, until_closed, CloseFlag, FrameStream, Transport};
use async_trait::async_trait;
use async_web3_core::{Error, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the close handshake; a peer that stopped reading never
/// takes the close frame.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// JSON-RPC over a WebSocket connection
///
/// Each frame is one text message. Binary messages carrying UTF-8 are
/// accepted as well since some nodes send them.
pub struct WebSocketTransport {
    url: String,
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
    write_side: CloseFlag,
    inbound: Mutex<Option<(SplitStream<WsStream>, oneshot::Receiver<()>)>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl WebSocketTransport {
    /// Create a transport for `url`; nothing is opened until `connect()`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sink: Mutex::new(None),
            write_side: CloseFlag::new(),
            inbound: Mutex::new(None),
            shutdown: Mutex::new(None),
        }
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn write_frame(&self, frame: String) -> Result<()> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(Error::NotConnected)?;
        sink.send(Message::Text(frame))
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }

    async fn release(&self) -> Option<SplitSink<WsStream, Message>> {
        // Fail blocked writes first so the sink lock frees up.
        self.write_side.close();
        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(());
        }
        self.inbound.lock().await.take();
        self.sink.lock().await.take()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<()> {
        if let Some(mut stale) = self.release().await {
            let _ = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, stale.close()).await;
        }

        let (ws_stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| Error::Connection(format!("{}: {}", self.url, e)))?;
        let (write, read) = ws_stream.split();
        let (shutdown_tx, shutdown_rx) = close_signal();

        *self.sink.lock().await = Some(write);
        *self.inbound.lock().await = Some((read, shutdown_rx));
        *self.shutdown.lock().await = Some(shutdown_tx);
        self.write_side.open();

        tracing::debug!(url = %self.url, "WebSocket connected");
        Ok(())
    }

    async fn send(&self, frame: String) -> Result<()> {
        tokio::select! {
            written = self.write_frame(frame) => written,
            _ = self.write_side.closed() => Err(Error::NotConnected),
        }
    }

    async fn receive(&self) -> Result<FrameStream> {
        let (read, closed) = self.inbound.lock().await.take().ok_or(Error::NotConnected)?;

        let frames = futures::stream::unfold(Some(read), |state| async move {
            let mut read = state?;
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => return Some((Ok(text), Some(read))),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => return Some((Ok(text), Some(read))),
                        Err(_) => tracing::warn!("Dropping non UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "WebSocket closed by peer");
                        return None;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return Some((Err(Error::Connection(e.to_string())), None));
                    }
                    None => return None,
                }
            }
        });

        Ok(until_closed(frames, closed))
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut sink) = self.release().await {
            match tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "WebSocket close handshake failed"),
                Err(_) => tracing::debug!("WebSocket close handshake timed out"),
            }
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "websocket"
    }
}
