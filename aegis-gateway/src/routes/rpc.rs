//! The `/rpc` endpoint
//!
//! Accepts one JSON-RPC object or an ordered batch. Batch elements run
//! independent pipelines; responses preserve input order. A single
//! non-intercepted request takes the raw byte path so its upstream
//! response round-trips bit-for-bit.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;

use aegis_core::error::AegisError;

use crate::pipeline::process_call;
use crate::rpc::{error_response, is_intercepted, request_id, request_method};
use crate::state::AppState;

pub async fn rpc_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            let err = AegisError::MalformedRequest(format!("body is not JSON: {e}"));
            return Json(error_response(Value::Null, &err)).into_response();
        }
    };

    match payload {
        Value::Array(items) => {
            if items.is_empty() {
                let err = AegisError::MalformedRequest("empty batch".into());
                return Json(error_response(Value::Null, &err)).into_response();
            }
            let mut responses = Vec::with_capacity(items.len());
            for item in items {
                responses.push(process_call(&state, &headers, item).await);
            }
            Json(Value::Array(responses)).into_response()
        }
        payload @ Value::Object(_) => {
            // Byte-preserving fast path for single non-intercepted calls.
            if request_method(&payload).is_some_and(|m| !is_intercepted(m)) {
                return match state.forwarder.forward_bytes(body).await {
                    Ok((status, bytes)) => {
                        state.metrics.record_passthrough();
                        (
                            status,
                            [(header::CONTENT_TYPE, "application/json")],
                            bytes,
                        )
                            .into_response()
                    }
                    Err(err) => {
                        Json(error_response(request_id(&payload), &err)).into_response()
                    }
                };
            }

            let response = process_call(&state, &headers, payload).await;
            (StatusCode::OK, Json(response)).into_response()
        }
        _ => {
            let err =
                AegisError::MalformedRequest("request is neither an object nor a batch".into());
            Json(error_response(Value::Null, &err)).into_response()
        }
    }
}
