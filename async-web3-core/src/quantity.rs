//! Hex-encoded quantities
//!
//! Nodes encode integers as `0x`-prefixed hex strings without leading zeros
//! (`"0x0"`, `"0x10"`, `"0x1b4"`). These helpers turn those strings into
//! native integers and back, so callers of `invoke` do not each reinvent
//! the parsing.
//!
//! ```rust
//! use async_web3_core::quantity;
//! use serde_json::json;
//!
//! assert_eq!(quantity::decode_quantity(&json!("0x10")).unwrap(), 16);
//! assert_eq!(quantity::encode_quantity(16), "0x10");
//! ```

use crate::error::{Error, Result};
use serde_json::Value;

/// Decode a hex quantity into a `u64`
pub fn decode_quantity(value: &Value) -> Result<u64> {
    let digits = hex_digits(value)?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| Error::Serialization(format!("invalid quantity {}: {}", value, e)))
}

/// Decode a hex quantity into a `u128` (balances and gas prices overflow `u64`)
pub fn decode_quantity_u128(value: &Value) -> Result<u128> {
    let digits = hex_digits(value)?;
    u128::from_str_radix(digits, 16)
        .map_err(|e| Error::Serialization(format!("invalid quantity {}: {}", value, e)))
}

/// Encode an integer as a hex quantity
pub fn encode_quantity(n: u128) -> String {
    format!("0x{:x}", n)
}

fn hex_digits(value: &Value) -> Result<&str> {
    let text = value
        .as_str()
        .ok_or_else(|| Error::Serialization(format!("quantity must be a string, got {}", value)))?;
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .ok_or_else(|| Error::Serialization(format!("quantity {} lacks 0x prefix", text)))?;
    if digits.is_empty() {
        return Err(Error::Serialization("empty quantity".to_string()));
    }
    Ok(digits)
}
