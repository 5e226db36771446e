//! Frame encoding and classification
//!
//! Outbound, a request is serialized to one text frame. Inbound, a text frame
//! is parsed and classified before anything is routed:
//!
//! - an object with a non-null `id` and a `result` or `error` is a
//!   **response**
//! - an object without an `id` whose `method` ends in `_subscription` and
//!   whose `params` carry a `subscription` id is a **notification**
//! - an array is a **batch** of the above
//! - everything else (invalid JSON, requests sent by the node, unknown
//!   notification methods) is a protocol error
//!
//! Classification never panics and never tears anything down: callers get
//! `Error::Protocol` and decide what to do with the frame.
//!
//! # Examples
//!
//! ```rust
//! use async_web3_core::{codec, InboundMessage};
//!
//! let frame = r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#;
//! assert!(codec::decode(frame).unwrap().is_response());
//!
//! let push = r#"{"jsonrpc":"2.0","method":"eth_subscription",
//!                "params":{"subscription":"0xabc","result":{}}}"#;
//! assert!(matches!(codec::decode(push).unwrap(), InboundMessage::Notification(_)));
//!
//! assert!(codec::decode("not json").is_err());
//! ```

use crate::error::{Error, Result};
use crate::types::{InboundMessage, JsonRpcRequest, JsonRpcResponse, SubscriptionNotification};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Encode any serializable message to a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode a request envelope into a text frame
///
/// # Examples
///
/// ```rust
/// use async_web3_core::{codec, JsonRpcRequest};
///
/// let frame = codec::encode_request(&JsonRpcRequest::new(1, "eth_blockNumber", vec![])).unwrap();
/// assert_eq!(frame, r#"{"jsonrpc":"2.0","id":1,"method":"eth_blockNumber","params":[]}"#);
/// ```
pub fn encode_request(req: &JsonRpcRequest) -> Result<String> {
    encode(req)
}

/// Decode a text frame into a specific type
pub fn decode_as<'de, T: Deserialize<'de>>(data: &'de str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode and classify one inbound frame
pub fn decode(data: &str) -> Result<InboundMessage> {
    let value: Value =
        serde_json::from_str(data).map_err(|e| Error::Protocol(format!("invalid JSON: {}", e)))?;
    classify(value)
}

/// Classify an already parsed JSON value
pub fn classify(value: Value) -> Result<InboundMessage> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(Error::Protocol("empty batch".to_string()));
            }

            let total = items.len();
            let mut messages = Vec::with_capacity(total);
            for item in items {
                match classify_single(item) {
                    Ok(message) => messages.push(message),
                    Err(e) => tracing::warn!(error = %e, "Dropping malformed batch element"),
                }
            }

            if messages.is_empty() {
                return Err(Error::Protocol(format!(
                    "none of the {} batch elements could be routed",
                    total
                )));
            }
            Ok(InboundMessage::Batch(messages))
        }
        other => classify_single(other),
    }
}

fn classify_single(value: Value) -> Result<InboundMessage> {
    let obj = value
        .as_object()
        .ok_or_else(|| Error::Protocol("frame is not a JSON object".to_string()))?;

    let has_id = obj.get("id").is_some_and(|id| !id.is_null());

    if let Some(method) = obj.get("method") {
        let method = method
            .as_str()
            .ok_or_else(|| Error::Protocol("method is not a string".to_string()))?;
        if has_id {
            return Err(Error::Protocol(format!("unexpected request from node: {}", method)));
        }
        if !method.ends_with("_subscription") {
            return Err(Error::Protocol(format!("unsupported notification: {}", method)));
        }
        let notification: SubscriptionNotification = serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("malformed notification: {}", e)))?;
        return Ok(InboundMessage::Notification(notification));
    }

    if has_id || obj.contains_key("result") || obj.contains_key("error") {
        let response: JsonRpcResponse = serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("malformed response: {}", e)))?;
        if response.result.is_none() && response.error.is_none() {
            return Err(Error::Protocol(format!(
                "response {} carries neither result nor error",
                response.id
            )));
        }
        return Ok(InboundMessage::Response(response));
    }

    Err(Error::Protocol(
        "frame is neither a response nor a notification".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Id;
    use serde_json::json;

    #[test]
    fn test_decode_success_response() {
        match decode(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#).unwrap() {
            InboundMessage::Response(resp) => {
                assert_eq!(resp.id, Id::Number(1));
                assert_eq!(resp.result, Some(json!("0x10")));
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_response() {
        let frame = r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"the method eth_foo does not exist"}}"#;
        match decode(frame).unwrap() {
            InboundMessage::Response(resp) => {
                let error = resp.error.unwrap();
                assert_eq!(error.code, -32601);
                assert_eq!(error.message, "the method eth_foo does not exist");
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_notification() {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {"subscription": "0xabc", "result": {"number": "0x1b4"}}
        })
        .to_string();

        match decode(&frame).unwrap() {
            InboundMessage::Notification(n) => {
                assert_eq!(n.params.subscription, "0xabc");
                assert_eq!(n.params.result["number"], "0x1b4");
            }
            other => panic!("expected notification, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_other_namespace_notification() {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": "parity_subscription",
            "params": {"subscription": "7", "result": 1}
        })
        .to_string();
        assert!(decode(&frame).unwrap().is_notification());
    }

    #[test]
    fn test_invalid_json_is_protocol_error() {
        assert!(matches!(decode("{\"id\":1,"), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_node_request_is_rejected() {
        let frame = r#"{"jsonrpc":"2.0","id":1,"method":"eth_accounts","params":[]}"#;
        assert!(matches!(decode(frame), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_unknown_notification_method_is_rejected() {
        let frame = r#"{"jsonrpc":"2.0","method":"server_shutdown","params":{}}"#;
        assert!(matches!(decode(frame), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_notification_without_subscription_is_rejected() {
        let frame = r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"result":1}}"#;
        assert!(matches!(decode(frame), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_scalar_frame_is_rejected() {
        assert!(matches!(decode("42"), Err(Error::Protocol(_))));
        assert!(matches!(decode(r#"{"jsonrpc":"2.0"}"#), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_batch_keeps_good_elements() {
        let frame = json!([
            {"jsonrpc": "2.0", "id": 1, "result": "0x1"},
            "garbage",
            {"jsonrpc": "2.0", "id": 2, "error": {"code": -32000, "message": "boom"}}
        ])
        .to_string();

        match decode(&frame).unwrap() {
            InboundMessage::Batch(items) => {
                assert_eq!(items.len(), 2);
                assert!(items.iter().all(InboundMessage::is_response));
            }
            other => panic!("expected batch, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        assert!(matches!(decode("[]"), Err(Error::Protocol(_))));
        assert!(matches!(decode("[1, 2]"), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_decode_as_request() {
        let request: JsonRpcRequest =
            decode_as(r#"{"jsonrpc":"2.0","id":2,"method":"eth_subscribe","params":["newHeads"]}"#)
                .unwrap();
        assert_eq!(request.id, 2);
        assert_eq!(request.params, vec![json!("newHeads")]);
    }
}
