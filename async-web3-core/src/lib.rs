//! Core types and codec for async-web3
//!
//! This crate holds everything that does not need a connection:
//!
//! - **Types**: request, response and subscription-notification envelopes
//! - **Codec**: frame encoding and inbound classification
//! - **Error handling**: the error type shared by the whole client
//! - **Quantities**: hex integer helpers for node results
//! - **Observability**: OpenTelemetry/tracing bootstrap
//!
//! The crate is transport-agnostic; `async-web3-client` builds the
//! connection, request and subscription machinery on top of it.
//!
//! # Example
//!
//! ```rust
//! use async_web3_core::{codec, InboundMessage, JsonRpcRequest};
//!
//! let frame = codec::encode_request(&JsonRpcRequest::new(1, "eth_blockNumber", vec![])).unwrap();
//! assert!(frame.contains("\"method\":\"eth_blockNumber\""));
//!
//! match codec::decode(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#).unwrap() {
//!     InboundMessage::Response(resp) => assert_eq!(resp.result.unwrap(), "0x10"),
//!     _ => unreachable!(),
//! }
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod quantity;
pub mod types;

pub use error::{Error, JsonRpcErrorData, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    Id, InboundMessage, JsonRpcRequest, JsonRpcResponse, SubscriptionNotification,
    SubscriptionParams,
};
