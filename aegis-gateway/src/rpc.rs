//! JSON-RPC Wire Shapes
//!
//! The gateway deliberately works on loosely-typed `serde_json::Value`
//! payloads: non-intercepted traffic must round-trip to the upstream node
//! without being reshaped, so only the fields the firewall actually reads
//! are pulled out.

use serde_json::{json, Value};

use aegis_core::error::AegisError;

/// Methods the firewall intercepts when they carry value.
pub const INTERCEPTED_METHODS: [&str; 2] = ["eth_sendTransaction", "eth_sendRawTransaction"];

/// Whether `method` is subject to admission control.
pub fn is_intercepted(method: &str) -> bool {
    INTERCEPTED_METHODS.contains(&method)
}

/// The request `id`, preserved verbatim (null when absent).
pub fn request_id(call: &Value) -> Value {
    call.get("id").cloned().unwrap_or(Value::Null)
}

/// The request `method`, when present and a string.
pub fn request_method(call: &Value) -> Option<&str> {
    call.get("method").and_then(Value::as_str)
}

/// Build the firewall's JSON-RPC error response shape:
/// `{"jsonrpc":"2.0","id":…,"error":{"code":…,"message":"Aegis: <KIND>",
/// "data":{"reason":…}}}`.
pub fn error_response(id: Value, err: &AegisError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": err.code(),
            "message": err.rpc_message(),
            "data": { "reason": err.to_string() }
        }
    })
}

/// Whether an upstream response carries a JSON-RPC-level error.
pub fn has_error(response: &Value) -> bool {
    response
        .get("error")
        .is_some_and(|e| !e.is_null())
}

/// Extract the settled transaction hash from an upstream success
/// response: a 32-byte hex `result`, or failing that the first 32-byte
/// hex substring anywhere in the response.
pub fn extract_tx_hash(response: &Value) -> Option<String> {
    if let Some(result) = response.get("result").and_then(Value::as_str) {
        if aegis_core::types::is_tx_hash(result) {
            return Some(result.to_ascii_lowercase());
        }
    }
    find_tx_hash_substring(&response.to_string())
}

/// First `0x` + exactly-64-hex-digit run in `text`.
fn find_tx_hash_substring(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i + 66 <= bytes.len() {
        if bytes[i] == b'0' && bytes[i + 1] == b'x' {
            let digits = bytes[i + 2..]
                .iter()
                .take_while(|b| b.is_ascii_hexdigit())
                .count();
            if digits == 64 {
                let hash = &text[i..i + 66];
                return Some(hash.to_ascii_lowercase());
            }
            // Skip past this run entirely; a longer blob cannot contain
            // a boundary-aligned 32-byte hash starting inside it.
            i += 2 + digits;
        } else {
            i += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interception_set() {
        assert!(is_intercepted("eth_sendTransaction"));
        assert!(is_intercepted("eth_sendRawTransaction"));
        assert!(!is_intercepted("eth_call"));
        assert!(!is_intercepted("eth_getBalance"));
    }

    #[test]
    fn test_error_response_shape() {
        let err = AegisError::LimitExceeded {
            requested: "2".into(),
            remaining: "1".into(),
        };
        let response = error_response(json!(7), &err);
        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], 7);
        assert_eq!(response["error"]["code"], -32001);
        assert_eq!(response["error"]["message"], "Aegis: LIMIT_EXCEEDED");
        assert!(response["error"]["data"]["reason"]
            .as_str()
            .unwrap()
            .contains("limit exceeded"));
    }

    #[test]
    fn test_extract_hash_from_result() {
        let hash = format!("0x{}", "AB".repeat(32));
        let response = json!({"jsonrpc": "2.0", "id": 1, "result": hash});
        assert_eq!(
            extract_tx_hash(&response),
            Some(format!("0x{}", "ab".repeat(32)))
        );
    }

    #[test]
    fn test_extract_hash_from_nested_response() {
        let hash = format!("0x{}", "cd".repeat(32));
        let response = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "transactionHash": hash, "blockNumber": "0x10" }
        });
        assert_eq!(extract_tx_hash(&response), Some(hash));
    }

    #[test]
    fn test_extract_hash_ignores_longer_blobs() {
        // 65 hex bytes: not a 32-byte hash
        let blob = format!("0x{}", "ef".repeat(65));
        let response = json!({"jsonrpc": "2.0", "id": 1, "result": blob});
        assert_eq!(extract_tx_hash(&response), None);
    }

    #[test]
    fn test_extract_hash_missing() {
        let response = json!({"jsonrpc": "2.0", "id": 1, "result": "0x1"});
        assert_eq!(extract_tx_hash(&response), None);
    }

    #[test]
    fn test_has_error() {
        assert!(has_error(&json!({"error": {"code": -32000}})));
        assert!(!has_error(&json!({"result": "0x1"})));
        assert!(!has_error(&json!({"error": null, "result": "0x1"})));
    }
}
