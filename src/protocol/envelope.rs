// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! JSON-RPC envelope codec.
//!
//! Decodes client calls and encodes the single response object each call
//! produces. Ids are echoed with the wire type they arrived with.

use crate::engine_core::errors::GatewayError;
use crate::engine_core::models::{Envelope, JsonRpcError, JsonRpcId, JsonRpcResponse};
use serde_json::Value;
use tracing::error;

/// Last-resort body when a response cannot be serialized.
const FALLBACK_ERROR_BODY: &[u8] =
    br#"{"jsonrpc":"2.0","id":0,"error":{"code":-32603,"message":"internal serialization failure"}}"#;

/// A decoded inbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCall {
    pub id: JsonRpcId,
    pub method: String,
    /// `Value::Null` when the call carried no params
    pub params: Value,
}

/// Decode a client call. A missing `id` decodes as `Int(0)`.
pub fn decode_envelope(bytes: &[u8]) -> Result<DecodedCall, GatewayError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| GatewayError::Parse(e.to_string()))?;

    match Envelope::from_value(value)? {
        Envelope::Request(req) => Ok(DecodedCall {
            id: req.id.unwrap_or_default(),
            method: req.method,
            params: req.params.unwrap_or(Value::Null),
        }),
        Envelope::Notification(req) => Ok(DecodedCall {
            id: JsonRpcId::default(),
            method: req.method,
            params: req.params.unwrap_or(Value::Null),
        }),
        Envelope::Success { .. } | Envelope::Failure { .. } => Err(GatewayError::InvalidRequest(
            "expected a request, got a response".to_string(),
        )),
    }
}

pub fn encode_success(id: &JsonRpcId, result: Value) -> Vec<u8> {
    encode_response(&JsonRpcResponse::success(id.clone(), result))
}

pub fn encode_error(id: &JsonRpcId, code: i64, message: &str) -> Vec<u8> {
    encode_failure(id, JsonRpcError::new(code, message))
}

/// Encode a full error object, `data` included. Used when forwarding a
/// backend error untouched.
pub fn encode_failure(id: &JsonRpcId, error: JsonRpcError) -> Vec<u8> {
    encode_response(&JsonRpcResponse::failure(id.clone(), error))
}

pub fn encode_gateway_error(id: &JsonRpcId, err: &GatewayError) -> Vec<u8> {
    encode_failure(id, JsonRpcError::from(err))
}

pub fn encode_response(response: &JsonRpcResponse) -> Vec<u8> {
    match serde_json::to_vec(response) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to serialize JSON-RPC response");
            FALLBACK_ERROR_BODY.to_vec()
        }
    }
}
