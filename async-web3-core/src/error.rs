//! Error types for async-web3
//!
//! Two kinds of error live here:
//!
//! - **Error**: everything a caller of the client can observe (uses thiserror)
//! - **JsonRpcErrorData**: the `error` object a node puts in a response
//!
//! # Error Classes
//!
//! Errors fall into three classes that callers usually want to tell apart:
//!
//! - **Connection errors** (`Connection`, `ConnectionClosed`, `NotConnected`,
//!   `AlreadyConnected`): the transport is gone or was never open. These are
//!   broadcast to every waiter when a connection drops.
//! - **RPC errors** (`JsonRpc`): the node answered a specific request with an
//!   error object. Only the caller of that request sees it.
//! - **Local errors** (`Protocol`, `Serialization`, `Timeout`, `Io`,
//!   `Config`): a frame or value could not be handled, the caller gave up
//!   waiting, or the client was built without what it needs.
//!
//! # Examples
//!
//! ```rust
//! use async_web3_core::{Error, JsonRpcErrorData};
//!
//! let rpc = Error::JsonRpc(JsonRpcErrorData::new(-32000, "header not found"));
//! assert!(rpc.is_rpc_error());
//! assert!(!rpc.is_connection_error());
//!
//! assert!(Error::ConnectionClosed.is_connection_error());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

const METHOD_NOT_FOUND: i64 = -32601;

/// Result type for async-web3 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type
///
/// `Clone` is required because a single connection failure is delivered to
/// every outstanding request and every open subscription.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The node returned an error object for this request
    ///
    /// Code, message and data are carried verbatim from the wire.
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcErrorData),

    /// The transport failed to open or was lost abruptly
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connection was closed while the operation was in flight
    #[error("Connection closed")]
    ConnectionClosed,

    /// An operation that needs an open connection was attempted without one
    #[error("Not connected")]
    NotConnected,

    /// `connect()` was called on a client that is not disconnected
    #[error("Already connected")]
    AlreadyConnected,

    /// A frame could not be decoded or routed
    ///
    /// The reader loop logs and drops such frames; the connection survives.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization or deserialization error
    ///
    /// Usually a mismatch between the expected and the actual shape of a
    /// result value.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Input/output error outside of an established connection
    #[error("IO error: {0}")]
    Io(String),

    /// The caller stopped waiting for a response
    #[error("Request timeout")]
    Timeout,

    /// The client was configured inconsistently
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for the variants that describe the state of the connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::ConnectionClosed | Error::NotConnected | Error::AlreadyConnected
        )
    }

    /// True when the node itself answered with an error object
    pub fn is_rpc_error(&self) -> bool {
        matches!(self, Error::JsonRpc(_))
    }

    /// The node's error object, if this is an RPC error
    pub fn rpc_error(&self) -> Option<&JsonRpcErrorData> {
        match self {
            Error::JsonRpc(data) => Some(data),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => Error::Connection(err.to_string()),
            _ => Error::Io(err.to_string()),
        }
    }
}

/// JSON-RPC 2.0 error object as sent by the node
///
/// # Standard Error Codes
///
/// - `-32700`: Parse error
/// - `-32600`: Invalid Request
/// - `-32601`: Method not found
/// - `-32602`: Invalid params
/// - `-32603`: Internal error
/// - `-32000 to -32099`: Server error (nodes use these for things like
///   "header not found" or "execution reverted")
///
/// # Examples
///
/// ```rust
/// use async_web3_core::JsonRpcErrorData;
/// use serde_json::json;
///
/// let reverted = JsonRpcErrorData::with_data(3, "execution reverted", json!("0x08c379a0"));
/// assert_eq!(reverted.code, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code
    pub code: i64,

    /// Human-readable error message
    pub message: String,

    /// Optional additional error information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcErrorData {
    /// Create an error object with code and message
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error object carrying extra data
    pub fn with_data(code: i64, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// The node does not implement the method (-32601)
    pub fn is_method_not_found(&self) -> bool {
        self.code == METHOD_NOT_FOUND
    }

    /// Node-defined error in the -32000 to -32099 range
    pub fn is_server_error(&self) -> bool {
        (-32099..=-32000).contains(&self.code)
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}
