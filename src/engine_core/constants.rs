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

//! lilith-bridge constants - single source of truth for protocol values.
//!
//! Error codes, method names, header names, size limits and env var names
//! used across the gateway live here.

/// JSON-RPC 2.0 Error Codes
pub mod jsonrpc {
    /// Parse error (standard JSON-RPC)
    pub const ERROR_PARSE: i32 = -32700;
    /// Invalid request (standard JSON-RPC)
    pub const ERROR_INVALID_REQUEST: i32 = -32600;
    /// Method not found (standard JSON-RPC)
    pub const ERROR_METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params (standard JSON-RPC)
    pub const ERROR_INVALID_PARAMS: i32 = -32602;
    /// Internal error (standard JSON-RPC)
    pub const ERROR_INTERNAL: i32 = -32603;

    pub const VERSION: &str = "2.0";
}

/// MCP Protocol Methods
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
    pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";
    pub const NOTIFICATION_PREFIX: &str = "notifications/";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// MCP handshake values
pub mod protocol {
    pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-03-26";
    pub const CLIENT_NAME: &str = "lilith-bridge";
    pub const CLIENT_TITLE: &str = "Lilith Bridge";
    pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// HTTP header names and values not covered by `http::header`
pub mod headers {
    use http::HeaderName;

    pub const MCP_SESSION_ID: HeaderName = HeaderName::from_static("mcp-session-id");
    /// Per-request narrowing of the tool allow-list (comma separated)
    pub const ALLOW_TOOLS: HeaderName = HeaderName::from_static("x-envoy-allow-mcp-tools");

    pub const APPLICATION_JSON: &str = "application/json";
    pub const APPLICATION_JSON_UTF8: &str = "application/json; charset=utf-8";
    pub const TEXT_EVENT_STREAM: &str = "text/event-stream";
    pub const ACCEPT_MCP: &str = "application/json,text/event-stream";
}

/// SSE event names
pub mod sse {
    pub const EVENT_ENDPOINT: &str = "endpoint";
    pub const EVENT_MESSAGE: &str = "message";
}

/// Transport Limits (DoS Protection)
pub mod limits {
    /// Maximum length of a single unterminated SSE line (32 MiB)
    pub const MAX_SSE_LINE_BYTES: usize = 32 * 1024 * 1024;
    /// Maximum SSE receive buffer per call context (100 MiB)
    pub const MAX_SSE_BUFFER_BYTES: usize = 100 * 1024 * 1024;
    /// Default budget for one outbound backend call
    pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
    pub const ENV_GATEWAY_CONFIG: &str = "LILITH_BRIDGE_CONFIG";
    pub const ENV_LISTEN: &str = "LILITH_BRIDGE_LISTEN";

    pub const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
    pub const DEFAULT_MCP_PATH: &str = "/mcp";
}
