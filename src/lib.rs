//! async-web3: multiplexed JSON-RPC for blockchain nodes
//!
//! This is the convenience crate that re-exports the async-web3 sub-crates.
//! Use it if you want a single dependency.
//!
//! # Architecture
//!
//! - **async-web3-core**: wire types, codec, errors, hex quantities,
//!   observability bootstrap
//! - **async-web3-client**: transports, request/subscription registries,
//!   the dispatcher and the `Web3Client` handle
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use async_web3::{SubscriptionKind, Web3Client};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Web3Client::connect_websocket("ws://localhost:8546").await?;
//!
//!     let head = client.invoke("eth_blockNumber", vec![]).await?;
//!     println!("Head: {}", async_web3::core::quantity::decode_quantity(&head)?);
//!
//!     let mut heads = client.subscribe(SubscriptionKind::NewHeads, vec![]).await?;
//!     if let Some(header) = heads.next().await {
//!         println!("Next head: {}", header?["number"]);
//!     }
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Demos
//!
//! Runnable programs live in `demos/` rather than the conventional
//! `examples/` directory and are registered as `[[example]]` targets in the
//! root manifest:
//!
//! ```text
//! cargo run --example block_watcher -- ws://localhost:8546
//! ```

pub use async_web3_client as client;
pub use async_web3_core as core;

pub use async_web3_client::{ClientBuilder, ConnectionState, Subscription, SubscriptionKind, Web3Client};
pub use async_web3_core::{Error, Result};
