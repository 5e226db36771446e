//! Async JSON-RPC client for blockchain nodes
//!
//! One connection carries any number of concurrent calls and push
//! subscriptions. Responses are matched to their callers by id, whatever
//! order the node answers in; subscription notifications are queued per
//! subscription and read back as streams.
//!
//! # Core Features
//!
//! - **Transports**: websocket, IPC (Unix socket), in-memory, or your own
//!   `Transport` implementation
//! - **Calls**: `invoke` with raw JSON values or typed `request`
//! - **Subscriptions**: `eth_subscribe` feeds as `futures::Stream`s with
//!   bounded queues
//! - **Lifecycle**: explicit `connect`/`close`, observable state, connection
//!   loss fails every waiter instead of hanging it
//! - **Observability**: tracing spans and OpenTelemetry metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use async_web3_client::{SubscriptionKind, Web3Client};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Web3Client::connect_websocket("ws://localhost:8546").await?;
//!
//!     let block: String = client.request("eth_blockNumber", ()).await?;
//!     println!("Head: {}", block);
//!
//!     let mut heads = client.subscribe(SubscriptionKind::NewHeads, vec![]).await?;
//!     while let Some(header) = heads.next().await {
//!         println!("New head: {}", header?["number"]);
//!     }
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod client_builder;
mod connection_state;
mod dispatcher;
pub mod methods;
mod metrics;
mod request;
mod retry;
mod subscription;
pub mod transport;

pub use client::Web3Client;
pub use client_builder::{ClientBuilder, ClientConfig};
pub use connection_state::{ConnectionManager, ConnectionState};
pub use methods::SubscriptionKind;
pub use metrics::ClientMetrics;
pub use request::{PendingCall, RequestRegistry};
pub use retry::{ExponentialBackoff, FixedDelay, NoRetry, RetryStrategy};
pub use subscription::{Subscription, SubscriptionRegistry, DEFAULT_SUBSCRIPTION_CAPACITY};
pub use transport::{FrameStream, MemoryPeer, MemoryTransport, Transport, WebSocketTransport};

#[cfg(unix)]
pub use transport::IpcTransport;
