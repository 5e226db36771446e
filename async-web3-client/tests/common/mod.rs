//! Shared helpers for async-web3-client integration tests
//!
//! Two kinds of fake node:
//!
//! - `MockWsServer`: a real websocket server on localhost driven by a
//!   request handler, with commands to push frames or drop the connection
//! - `memory_client()`: a client wired to a `MemoryPeer` that the test
//!   scripts frame by frame

#![allow(dead_code)]

use async_web3_client::{ClientBuilder, MemoryPeer, MemoryTransport, Web3Client};
use async_web3_core::{codec, JsonRpcRequest};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Command for every live connection of a `MockWsServer`
#[derive(Debug, Clone)]
pub enum ServerCommand {
    /// Send a frame to the client
    Push(String),
    /// Close with a websocket close handshake
    Close,
    /// Drop the socket without a close handshake
    Abort,
}

/// Mock node speaking JSON-RPC over websocket
pub struct MockWsServer {
    addr: SocketAddr,
    commands: broadcast::Sender<ServerCommand>,
    requests: mpsc::UnboundedReceiver<JsonRpcRequest>,
}

impl MockWsServer {
    /// Start a server answering every request with `handler`
    ///
    /// The handler returns the frames to send back, in order; an empty
    /// vector sends nothing.
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&JsonRpcRequest) -> Vec<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (commands, _) = broadcast::channel(64);
        let (request_tx, requests) = mpsc::unbounded_channel();
        let handler = Arc::new(handler);

        let command_tx = commands.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let request_tx = request_tx.clone();
                let mut command_rx = command_tx.subscribe();

                tokio::spawn(async move {
                    let Ok(ws_stream) = accept_async(stream).await else {
                        return;
                    };
                    let (mut write, mut read) = ws_stream.split();

                    loop {
                        tokio::select! {
                            message = read.next() => match message {
                                Some(Ok(Message::Text(text))) => {
                                    let Ok(request) = codec::decode_as::<JsonRpcRequest>(&text) else {
                                        continue;
                                    };
                                    for frame in handler(&request) {
                                        let _ = write.send(Message::Text(frame)).await;
                                    }
                                    let _ = request_tx.send(request);
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            command = command_rx.recv() => match command {
                                Ok(ServerCommand::Push(frame)) => {
                                    let _ = write.send(Message::Text(frame)).await;
                                }
                                Ok(ServerCommand::Close) => {
                                    let _ = write.send(Message::Close(None)).await;
                                    // Drain until the client answers the close.
                                    while let Some(Ok(_)) = read.next().await {}
                                    break;
                                }
                                Ok(ServerCommand::Abort) | Err(_) => break,
                            },
                        }
                    }
                });
            }
        });

        Self {
            addr,
            commands,
            requests,
        }
    }

    /// Server answering `web3_clientVersion`, `eth_blockNumber` and
    /// `eth_subscribe`/`eth_unsubscribe`
    pub async fn node() -> Self {
        Self::with_handler(|request| {
            let result = match request.method.as_str() {
                "web3_clientVersion" => json!("Geth/v1.13.0-mock"),
                "eth_blockNumber" => json!("0x10"),
                "eth_subscribe" => json!(format!("0xsub{}", request.id)),
                "eth_unsubscribe" => json!(true),
                _ => {
                    return vec![mock_error_response(
                        request.id,
                        -32601,
                        &format!("the method {} does not exist/is not available", request.method),
                    )]
                }
            };
            vec![mock_response(request.id, result)]
        })
        .await
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Send a frame on every open connection
    pub fn push(&self, frame: String) {
        let _ = self.commands.send(ServerCommand::Push(frame));
    }

    /// Close every open connection gracefully
    pub fn close_connections(&self) {
        let _ = self.commands.send(ServerCommand::Close);
    }

    /// Drop every open connection without a close handshake
    pub fn abort_connections(&self) {
        let _ = self.commands.send(ServerCommand::Abort);
    }

    /// Next request the server received, within five seconds
    pub async fn next_request(&mut self) -> Option<JsonRpcRequest> {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Connected client plus the peer playing the node
pub async fn memory_client() -> (Web3Client, MemoryPeer) {
    memory_client_with(ClientBuilder::new()).await
}

/// Same as `memory_client` on top of a pre-configured builder
pub async fn memory_client_with(builder: ClientBuilder) -> (Web3Client, MemoryPeer) {
    let (transport, peer) = MemoryTransport::pair();
    let client = builder
        .with_transport(Arc::new(transport))
        .connect()
        .await
        .unwrap();
    (client, peer)
}

/// Next request from the client, within five seconds
pub async fn expect_request(peer: &mut MemoryPeer) -> JsonRpcRequest {
    tokio::time::timeout(Duration::from_secs(5), peer.recv_request())
        .await
        .expect("timed out waiting for a request")
        .expect("client side closed")
}

/// Mock JSON-RPC success response
pub fn mock_response(id: u64, result: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
    .to_string()
}

/// Mock JSON-RPC error response
pub fn mock_error_response(id: u64, code: i64, message: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message
        }
    })
    .to_string()
}

/// Mock `eth_subscription` notification
pub fn mock_notification(subscription: &str, result: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": "eth_subscription",
        "params": {
            "subscription": subscription,
            "result": result
        }
    })
    .to_string()
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_response_format() {
        let response = mock_response(1, json!({"value": 42}));
        assert!(response.contains("\"jsonrpc\":\"2.0\""));
        assert!(response.contains("\"id\":1"));
        assert!(response.contains("\"result\""));
    }

    #[test]
    fn test_mock_notification_format() {
        let notification = mock_notification("0x1", json!({"number": "0x1"}));
        assert!(notification.contains("\"method\":\"eth_subscription\""));
        assert!(notification.contains("\"subscription\":\"0x1\""));
        assert!(!notification.contains("\"id\""));
    }
}
