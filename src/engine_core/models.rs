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

//! JSON-RPC envelope types.
//!
//! Pure data structures with no I/O. The identifier keeps the type it was
//! received with so that echoing it back is byte-for-byte faithful.

use crate::engine_core::constants::{jsonrpc, methods};
use crate::engine_core::errors::GatewayError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

/// JSON-RPC request identifier, tagged by its wire type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JsonRpcId {
    Int(i64),
    Str(String),
}

impl Default for JsonRpcId {
    fn default() -> Self {
        JsonRpcId::Int(0)
    }
}

impl JsonRpcId {
    /// Read an id from an optional JSON value. Absent or null becomes `Int(0)`.
    /// Fractional numbers and integers outside `i64` are rejected rather
    /// than coerced, since the echoed id would no longer match.
    pub fn from_value(value: Option<&Value>) -> Result<Self, GatewayError> {
        match value {
            None | Some(Value::Null) => Ok(JsonRpcId::Int(0)),
            Some(Value::String(s)) => Ok(JsonRpcId::Str(s.clone())),
            Some(Value::Number(n)) => n.as_i64().map(JsonRpcId::Int).ok_or_else(|| {
                GatewayError::InvalidRequest(format!("id {} is not a 64-bit integer", n))
            }),
            Some(_) => Err(GatewayError::InvalidRequest(
                "id must be a string or an integer".to_string(),
            )),
        }
    }

    /// Tag-aware comparison against an outbound numeric request id.
    pub fn matches_int(&self, expected: i64) -> bool {
        matches!(self, JsonRpcId::Int(i) if *i == expected)
    }
}

impl From<i64> for JsonRpcId {
    fn from(i: i64) -> Self {
        JsonRpcId::Int(i)
    }
}

impl From<&str> for JsonRpcId {
    fn from(s: &str) -> Self {
        JsonRpcId::Str(s.to_string())
    }
}

impl std::fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonRpcId::Int(i) => write!(f, "{}", i),
            JsonRpcId::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl Serialize for JsonRpcId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JsonRpcId::Int(i) => serializer.serialize_i64(*i),
            JsonRpcId::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for JsonRpcId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        JsonRpcId::from_value(Some(&value)).map_err(|e| serde::de::Error::custom(e.client_message()))
    }
}

/// Outbound (or inbound) JSON-RPC request. `id: None` is a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<JsonRpcId>, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            method: method.to_string(),
            params: Some(params),
            id: Some(id.into()),
        }
    }

    pub fn notification(method: &str) -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            method: method.to_string(),
            params: None,
            id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<&GatewayError> for JsonRpcError {
    fn from(err: &GatewayError) -> Self {
        JsonRpcError::new(i64::from(err.code()), err.client_message())
    }
}

/// Response envelope. Field order matches the wire layout
/// `{"jsonrpc","id","result"|"error"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: JsonRpcId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: JsonRpcId, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: JsonRpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: jsonrpc::VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Any JSON-RPC message, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(JsonRpcRequest),
    Notification(JsonRpcRequest),
    Success { id: JsonRpcId, result: Value },
    Failure { id: JsonRpcId, error: JsonRpcError },
}

impl Envelope {
    /// Classify a decoded JSON tree. A non-null `error` wins over `result`.
    pub fn from_value(value: Value) -> Result<Self, GatewayError> {
        let Value::Object(mut obj) = value else {
            return Err(GatewayError::InvalidRequest(
                "JSON-RPC message must be an object".to_string(),
            ));
        };

        let id_value = obj.remove("id");
        let has_id = matches!(id_value, Some(ref v) if !v.is_null());
        let id = JsonRpcId::from_value(id_value.as_ref())?;

        if let Some(method) = obj.get("method") {
            let method = method
                .as_str()
                .ok_or_else(|| GatewayError::InvalidRequest("method must be a string".to_string()))?
                .to_string();
            let request = JsonRpcRequest {
                jsonrpc: jsonrpc::VERSION.to_string(),
                method,
                params: obj.remove("params"),
                id: has_id.then_some(id),
            };
            return Ok(if has_id {
                Envelope::Request(request)
            } else {
                Envelope::Notification(request)
            });
        }

        match obj.remove("error") {
            Some(Value::Null) | None => {}
            Some(error) => {
                let error: JsonRpcError = serde_json::from_value(error).map_err(|e| {
                    GatewayError::backend(format!("malformed JSON-RPC error object: {}", e))
                })?;
                return Ok(Envelope::Failure { id, error });
            }
        }

        match obj.remove("result") {
            Some(result) => Ok(Envelope::Success { id, result }),
            None => Err(GatewayError::InvalidRequest(
                "message has neither method, result nor error".to_string(),
            )),
        }
    }
}

/// The one backend operation a call context carries through the handshake.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOperation {
    ListTools { cursor: Option<String> },
    CallTool { name: String, arguments: Map<String, Value> },
}

impl PendingOperation {
    pub fn method(&self) -> &'static str {
        match self {
            PendingOperation::ListTools { .. } => methods::TOOLS_LIST,
            PendingOperation::CallTool { .. } => methods::TOOLS_CALL,
        }
    }

    pub fn params(&self) -> Value {
        match self {
            PendingOperation::ListTools { cursor: Some(c) } if !c.is_empty() => {
                json!({ "cursor": c })
            }
            PendingOperation::ListTools { .. } => json!({}),
            PendingOperation::CallTool { name, arguments } => json!({
                "name": name,
                "arguments": arguments,
            }),
        }
    }

    pub fn to_request(&self, id: i64) -> JsonRpcRequest {
        JsonRpcRequest::new(id, self.method(), self.params())
    }

    pub fn tool_name(&self) -> Option<&str> {
        match self {
            PendingOperation::CallTool { name, .. } => Some(name),
            PendingOperation::ListTools { .. } => None,
        }
    }
}
