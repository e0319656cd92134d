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

//! Handshake Manager.
//!
//! Builds the backend-facing `initialize` / `notifications/initialized`
//! pair and the gateway's own answer to a client `initialize`.

use crate::engine_core::constants::{jsonrpc, methods, protocol};
use crate::engine_core::models::{JsonRpcError, JsonRpcRequest};
use serde_json::{json, Value};
use tracing::info;

/// Protocol versions the gateway will echo back to a client unchanged.
const KNOWN_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18", "2025-11-25"];

/// Which capability set to declare to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientProfile {
    /// Plain request/response backend: no capabilities declared
    Direct,
    /// Push-channel backend: roots, sampling and elicitation declared
    Streaming,
}

pub struct HandshakeManager;

impl HandshakeManager {
    /// The backend `initialize` request.
    pub fn initialize_request(id: i64, protocol_version: &str, profile: ClientProfile) -> JsonRpcRequest {
        let (capabilities, client_info) = match profile {
            ClientProfile::Direct => (
                json!({}),
                json!({
                    "name": protocol::CLIENT_NAME,
                    "version": protocol::CLIENT_VERSION,
                }),
            ),
            ClientProfile::Streaming => (
                json!({
                    "roots": { "listChanged": true },
                    "sampling": {},
                    "elicitation": {},
                }),
                json!({
                    "name": protocol::CLIENT_NAME,
                    "title": protocol::CLIENT_TITLE,
                    "version": protocol::CLIENT_VERSION,
                }),
            ),
        };

        JsonRpcRequest::new(
            id,
            methods::INITIALIZE,
            json!({
                "protocolVersion": protocol_version,
                "capabilities": capabilities,
                "clientInfo": client_info,
            }),
        )
    }

    pub fn initialized_notification() -> JsonRpcRequest {
        JsonRpcRequest::notification(methods::NOTIFICATION_INITIALIZED)
    }

    /// A backend answers an unsupported protocol version with InvalidParams.
    pub fn is_version_rejection(error: &JsonRpcError) -> bool {
        error.code == i64::from(jsonrpc::ERROR_INVALID_PARAMS)
    }

    /// Pick the version to answer a client `initialize` with.
    pub fn negotiate(client_version: Option<&str>, preferred: &str) -> String {
        match client_version {
            Some(v) if KNOWN_VERSIONS.contains(&v) => v.to_string(),
            Some(v) => {
                info!("Unknown client protocol version '{}', offering {}", v, preferred);
                preferred.to_string()
            }
            None => preferred.to_string(),
        }
    }

    /// Result for a client `initialize`, answered locally by the gateway.
    pub fn server_initialize_result(params: &Value, server_name: &str, preferred: &str) -> Value {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        json!({
            "protocolVersion": Self::negotiate(requested, preferred),
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": {
                "name": server_name,
                "version": protocol::CLIENT_VERSION,
            },
        })
    }
}
