//! JSON-RPC 2.0 envelopes spoken with an Ethereum-style node
//!
//! Three envelope shapes cross the wire:
//!
//! 1. **Request** (client -> node): `{"jsonrpc","id","method","params"}`
//! 2. **Response** (node -> client): `{"jsonrpc","id","result"}` or
//!    `{"jsonrpc","id","error"}`
//! 3. **Subscription notification** (node -> client, unsolicited):
//!    `{"jsonrpc","method":"eth_subscription","params":{"subscription","result"}}`
//!
//! Requests always carry a numeric id and a positional `params` array.
//! Responses echo the id; notifications have none and are routed by the
//! nested subscription id instead.

use crate::error::{Error, JsonRpcErrorData, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// JSON-RPC protocol version sent on every request
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation id as it appears on an inbound response
///
/// Outbound requests only ever use numbers, but a node (or a misbehaving
/// proxy) may echo anything, so the inbound side accepts every shape the
/// protocol allows and lets the router decide.
///
/// # Examples
///
/// ```rust
/// use async_web3_core::Id;
///
/// assert_eq!(Id::Number(7).as_request_id(), Some(7));
/// assert_eq!(Id::String("7".into()).as_request_id(), None);
/// assert_eq!(Id::Number(7).to_string(), "7");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// Numeric identifier
    Number(i64),
    /// String identifier
    String(String),
    /// Null identifier
    Null,
}

impl Id {
    /// The id as one of our own request ids, if it can be one
    pub fn as_request_id(&self) -> Option<u64> {
        match self {
            Id::Number(n) if *n >= 0 => Some(*n as u64),
            _ => None,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Null => write!(f, "null"),
        }
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n as i64)
    }
}

/// Outbound JSON-RPC request
///
/// # Examples
///
/// ```rust
/// use async_web3_core::JsonRpcRequest;
///
/// let request = JsonRpcRequest::new(1, "eth_blockNumber", vec![]);
/// assert_eq!(request.jsonrpc, "2.0");
/// assert!(request.params.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Client-assigned correlation id
    pub id: u64,
    /// Remote method name, e.g. `eth_getBalance`
    pub method: String,
    /// Positional parameters; an empty array when the method takes none
    pub params: Vec<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a request envelope
    pub fn new(id: u64, method: impl Into<String>, params: Vec<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Inbound JSON-RPC response
///
/// `result` distinguishes an absent field from an explicit `null`: nodes
/// answer `eth_getBlockByNumber` for an unknown block with `"result": null`,
/// which is a successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version echoed by the node
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Id of the request this answers
    pub id: Id,
    /// Result value (present only on success)
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<serde_json::Value>,
    /// Error object (present only on failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorData>,
}

impl JsonRpcResponse {
    /// Successful response
    pub fn success(id: impl Into<Id>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Error response
    pub fn error(id: impl Into<Id>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// Collapse the response into what the caller of `invoke` sees
    ///
    /// An error object wins over a result if a node sends both.
    pub fn into_outcome(self) -> Result<serde_json::Value> {
        match (self.error, self.result) {
            (Some(error), _) => Err(Error::JsonRpc(error)),
            (None, Some(result)) => Ok(result),
            (None, None) => Err(Error::Protocol(format!(
                "response {} carries neither result nor error",
                self.id
            ))),
        }
    }
}

/// Payload of a subscription notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionParams {
    /// Server-assigned subscription id
    pub subscription: String,
    /// The pushed value (a block header, a log, a transaction hash...)
    pub result: serde_json::Value,
}

/// Unsolicited push from the node for an open subscription
///
/// # Examples
///
/// ```rust
/// use async_web3_core::SubscriptionNotification;
/// use serde_json::json;
///
/// let notification = SubscriptionNotification::new("0xabc", json!({"number": "0x1"}));
/// assert_eq!(notification.method, "eth_subscription");
/// assert_eq!(notification.params.subscription, "0xabc");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionNotification {
    /// Protocol version echoed by the node
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// `<namespace>_subscription`, normally `eth_subscription`
    pub method: String,
    /// Subscription id and pushed value
    pub params: SubscriptionParams,
}

impl SubscriptionNotification {
    /// Build an `eth_subscription` notification
    pub fn new(subscription: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "eth_subscription".to_string(),
            params: SubscriptionParams {
                subscription: subscription.into(),
                result,
            },
        }
    }
}

/// A decoded inbound frame
///
/// Produced by [`crate::codec::decode`]. A batch holds one entry per array
/// element that could be classified; the codec logs and skips the others.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Answer to one of our requests
    Response(JsonRpcResponse),
    /// Push for an open subscription
    Notification(SubscriptionNotification),
    /// Array frame
    Batch(Vec<InboundMessage>),
}

impl InboundMessage {
    /// Check if this message is a response
    pub fn is_response(&self) -> bool {
        matches!(self, InboundMessage::Response(_))
    }

    /// Check if this message is a subscription notification
    pub fn is_notification(&self) -> bool {
        matches!(self, InboundMessage::Notification(_))
    }
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

// `Option<Value>` would read `null` as `None`; a present field must stay `Some`.
fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_display() {
        assert_eq!(Id::String("test".to_string()).to_string(), "\"test\"");
        assert_eq!(Id::Number(42).to_string(), "42");
        assert_eq!(Id::Null.to_string(), "null");
    }

    #[test]
    fn test_negative_id_is_not_ours() {
        assert_eq!(Id::Number(-1).as_request_id(), None);
        assert_eq!(Id::Null.as_request_id(), None);
    }

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::new(3, "eth_getBalance", vec![json!("0xdead"), json!("latest")]);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "eth_getBalance",
                "params": ["0xdead", "latest"]
            })
        );
    }

    #[test]
    fn test_empty_params_serialize_as_array() {
        let json = serde_json::to_string(&JsonRpcRequest::new(1, "eth_blockNumber", vec![])).unwrap();
        assert!(json.contains("\"params\":[]"));
    }

    #[test]
    fn test_null_result_is_success() {
        let resp: JsonRpcResponse =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 5, "result": null})).unwrap();
        assert_eq!(resp.result, Some(serde_json::Value::Null));
        assert_eq!(resp.into_outcome().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn test_error_response_outcome() {
        let resp = JsonRpcResponse::error(9u64, JsonRpcErrorData::new(-32000, "header not found"));
        let err = resp.into_outcome().unwrap_err();
        assert_eq!(err.rpc_error().map(|e| e.message.as_str()), Some("header not found"));
    }

    #[test]
    fn test_empty_response_is_protocol_error() {
        let resp: JsonRpcResponse = serde_json::from_value(json!({"jsonrpc": "2.0", "id": 5})).unwrap();
        assert!(matches!(resp.into_outcome(), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_notification_deserialization() {
        let notif: SubscriptionNotification = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {"subscription": "0xabc", "result": {"number": "0x10"}}
        }))
        .unwrap();

        assert_eq!(notif.params.subscription, "0xabc");
        assert_eq!(notif.params.result["number"], "0x10");
    }
}
