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

//! Backend response interpretation.
//!
//! Normalizes a backend body (plain JSON or a JSON payload wrapped in an
//! SSE frame) into one [`BackendResponse`]. Backend-reported failures are
//! classified, never rewritten.

use crate::engine_core::constants::headers;
use crate::engine_core::errors::GatewayError;
use crate::engine_core::models::{Envelope, JsonRpcError, JsonRpcId};
use crate::mcp::sse::extract_first_data;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    /// Top-level JSON-RPC `error`
    JsonRpcError,
    /// `result.isError == true`
    ResultIsError,
}

impl ResponseClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseClass::Success => "success",
            ResponseClass::JsonRpcError => "jsonrpc_error",
            ResponseClass::ResultIsError => "result_isError",
        }
    }
}

/// One parsed backend JSON-RPC response.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub id: JsonRpcId,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
    pub is_error_flagged: bool,
}

impl BackendResponse {
    pub fn from_value(value: Value) -> Result<Self, GatewayError> {
        let envelope = Envelope::from_value(value)
            .map_err(|e| GatewayError::backend(format!("invalid backend response: {}", e.client_message())))?;

        match envelope {
            Envelope::Success { id, result } => {
                let is_error_flagged = result.get("isError").and_then(Value::as_bool) == Some(true);
                Ok(Self {
                    id,
                    result: Some(result),
                    error: None,
                    is_error_flagged,
                })
            }
            Envelope::Failure { id, error } => Ok(Self {
                id,
                result: None,
                error: Some(error),
                is_error_flagged: false,
            }),
            Envelope::Request(_) | Envelope::Notification(_) => Err(GatewayError::backend(
                "backend sent a request where a response was expected",
            )),
        }
    }

    pub fn class(&self) -> ResponseClass {
        if self.error.is_some() {
            ResponseClass::JsonRpcError
        } else if self.is_error_flagged {
            ResponseClass::ResultIsError
        } else {
            ResponseClass::Success
        }
    }
}

pub fn is_event_stream(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains(headers::TEXT_EVENT_STREAM))
        .unwrap_or(false)
}

/// Parse a backend body according to its content type.
pub fn interpret(body: &[u8], content_type: Option<&str>) -> Result<BackendResponse, GatewayError> {
    let parsed: Result<Value, serde_json::Error> = if is_event_stream(content_type) {
        let data = extract_first_data(body)?;
        serde_json::from_str(&data)
    } else {
        serde_json::from_slice(body)
    };
    let value = parsed
        .map_err(|e| GatewayError::backend(format!("backend returned invalid JSON: {}", e)))?;

    BackendResponse::from_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_success() {
        let resp = interpret(br#"{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}"#, Some("application/json"))
            .unwrap();
        assert_eq!(resp.class(), ResponseClass::Success);
        assert_eq!(resp.id, JsonRpcId::Int(2));
        assert_eq!(resp.result, Some(json!({"tools": []})));
    }

    #[test]
    fn test_sse_wrapped_body() {
        let body = b"event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"protocolVersion\":\"2025-03-26\"}}\n\n";
        let resp = interpret(body, Some("text/event-stream; charset=utf-8")).unwrap();
        assert_eq!(resp.result.unwrap()["protocolVersion"], "2025-03-26");
    }

    #[test]
    fn test_jsonrpc_error_class() {
        let resp = interpret(
            br#"{"jsonrpc":"2.0","id":3,"error":{"code":-32602,"message":"Unknown tool"}}"#,
            None,
        )
        .unwrap();
        assert_eq!(resp.class(), ResponseClass::JsonRpcError);
        assert_eq!(resp.class().as_str(), "jsonrpc_error");
        let err = resp.error.unwrap();
        assert_eq!((err.code, err.message.as_str()), (-32602, "Unknown tool"));
    }

    #[test]
    fn test_result_is_error_class() {
        let resp = interpret(
            br#"{"jsonrpc":"2.0","id":3,"result":{"isError":true,"content":[{"type":"text","text":"boom"}]}}"#,
            None,
        )
        .unwrap();
        assert_eq!(resp.class(), ResponseClass::ResultIsError);
        assert_eq!(resp.result.unwrap()["isError"], true);
    }

    #[test]
    fn test_malformed_bodies_are_internal_errors() {
        assert_eq!(interpret(b"<html>", None).unwrap_err().code(), -32603);
        assert_eq!(interpret(b"event: x\n\n", Some("text/event-stream")).unwrap_err().code(), -32603);
        assert_eq!(interpret(br#"{"jsonrpc":"2.0","id":1}"#, None).unwrap_err().code(), -32603);
    }
}
