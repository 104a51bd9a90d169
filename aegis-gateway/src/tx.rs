//! Intercepted Transaction Parsing
//!
//! Pulls `{from, to, value}` out of the two intercepted methods. A
//! structured `eth_sendTransaction` reads fields from the params object;
//! a raw `eth_sendRawTransaction` decodes the signed envelope (sender
//! recovered from the signature). Amounts are parsed bit-exact as hex
//! quantities; a missing `value` is zero.

use alloy_primitives::U256;
use serde_json::Value;

use aegis_core::error::{AegisError, AegisResult};
use aegis_core::types::{parse_hex_quantity, EvmAddress};

/// Admission-relevant view of one intercepted call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTx {
    /// Sender, when the request carries one
    pub from: Option<EvmAddress>,
    /// Recipient, when present
    pub to: Option<EvmAddress>,
    /// Transfer value in wei
    pub value: U256,
}

/// Parse the params of an intercepted call.
pub fn parse_intercepted(method: &str, call: &Value) -> AegisResult<ParsedTx> {
    match method {
        "eth_sendTransaction" => parse_structured(call),
        "eth_sendRawTransaction" => parse_raw(call),
        other => Err(AegisError::ParseFailure(format!(
            "method {other} is not intercepted"
        ))),
    }
}

fn first_param(call: &Value) -> AegisResult<&Value> {
    call.get("params")
        .and_then(Value::as_array)
        .and_then(|params| params.first())
        .ok_or_else(|| AegisError::ParseFailure("params[0] is missing".into()))
}

fn parse_structured(call: &Value) -> AegisResult<ParsedTx> {
    let tx = first_param(call)?;
    if !tx.is_object() {
        return Err(AegisError::ParseFailure(
            "eth_sendTransaction params[0] is not an object".into(),
        ));
    }

    let from = optional_address(tx, "from")?;
    let to = optional_address(tx, "to")?;
    let value = match tx.get("value") {
        None | Some(Value::Null) => U256::ZERO,
        Some(Value::String(raw)) => parse_hex_quantity(raw).ok_or_else(|| {
            AegisError::ParseFailure(format!("value is not a hex quantity: {raw}"))
        })?,
        Some(other) => {
            return Err(AegisError::ParseFailure(format!(
                "value has unexpected type: {other}"
            )))
        }
    };

    Ok(ParsedTx { from, to, value })
}

fn parse_raw(call: &Value) -> AegisResult<ParsedTx> {
    let raw = first_param(call)?
        .as_str()
        .ok_or_else(|| AegisError::ParseFailure("raw transaction is not a string".into()))?;

    let envelope = aegis_chain::decode_raw_transaction(raw)
        .map_err(|e| AegisError::ParseFailure(e.to_string()))?;

    Ok(ParsedTx {
        from: Some(envelope.from),
        to: envelope.to,
        value: envelope.value,
    })
}

fn optional_address(tx: &Value, field: &str) -> AegisResult<Option<EvmAddress>> {
    match tx.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => EvmAddress::parse(raw)
            .map(Some)
            .map_err(|e| AegisError::ParseFailure(format!("{field}: {e}"))),
        Some(other) => Err(AegisError::ParseFailure(format!(
            "{field} has unexpected type: {other}"
        ))),
    }
}
