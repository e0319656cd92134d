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

//! Gateway error types.
//!
//! Every variant maps onto exactly one JSON-RPC error code so that any
//! failure can be turned into a well-formed client response.

use crate::engine_core::constants::jsonrpc;
use thiserror::Error;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Client sent bytes that are not JSON (-32700)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Client sent JSON that is not a JSON-RPC request (-32600)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Unrecognized method (-32601)
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Missing or disallowed parameter (-32602)
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Backend answered with an unusable status or payload (-32603)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Connection level failure talking to the backend (-32603)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Outbound call exceeded its budget (-32603)
    #[error("Backend call timed out after {0}ms")]
    Timeout(u64),

    /// SSE framing failure (-32603)
    #[error("SSE error: {0}")]
    Sse(#[from] SseError),

    /// Credential translation failure
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Invalid gateway configuration (-32603)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// JSON encoding failure (-32603)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Credential extraction and application errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Incoming Authorization header has the wrong shape for the scheme
    #[error("incoming Authorization header is not {expected} auth")]
    SchemeMismatch { expected: &'static str },

    /// Requirement refers to a scheme id that was never registered
    #[error("security scheme '{0}' not found")]
    UnknownScheme(String),

    /// Neither passthrough, override nor default credential is available
    #[error("no credential available for upstream security scheme '{0}'")]
    MissingCredential(String),

    /// Credential cannot be carried in an HTTP header
    #[error("credential for header '{name}' is not a valid header value")]
    InvalidHeader { name: String },

    /// Target URL could not be parsed or rebuilt
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// SSE reassembly errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SseError {
    /// A single unterminated line grew past the line cap
    #[error("SSE line exceeds maximum size of {limit} bytes")]
    LineTooLong { limit: usize },

    /// The per-context receive buffer grew past the buffer cap
    #[error("SSE buffer exceeds maximum size of {limit} bytes")]
    BufferOverflow { limit: usize },

    /// A single-shot SSE body carried no `data:` line
    #[error("no data field found in SSE response")]
    MissingData,

    /// Read failure underneath a framed SSE stream
    #[error("SSE stream I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SseError {
    fn from(err: std::io::Error) -> Self {
        SseError::Io(err.to_string())
    }
}

impl AuthError {
    /// JSON-RPC code for this error
    pub fn code(&self) -> i32 {
        match self {
            AuthError::MissingCredential(_) => jsonrpc::ERROR_INVALID_PARAMS,
            _ => jsonrpc::ERROR_INTERNAL,
        }
    }
}

impl GatewayError {
    /// JSON-RPC error code for this error
    pub fn code(&self) -> i32 {
        match self {
            GatewayError::Parse(_) => jsonrpc::ERROR_PARSE,
            GatewayError::InvalidRequest(_) => jsonrpc::ERROR_INVALID_REQUEST,
            GatewayError::MethodNotFound(_) => jsonrpc::ERROR_METHOD_NOT_FOUND,
            GatewayError::InvalidParams(_) => jsonrpc::ERROR_INVALID_PARAMS,
            GatewayError::Auth(e) => e.code(),
            GatewayError::Backend(_)
            | GatewayError::Transport(_)
            | GatewayError::Timeout(_)
            | GatewayError::Sse(_)
            | GatewayError::Configuration(_)
            | GatewayError::Serialization(_) => jsonrpc::ERROR_INTERNAL,
        }
    }

    /// Message delivered to the client (no credentials, no internal detail)
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::Parse(_) => "Parse error".to_string(),
            GatewayError::InvalidRequest(m) => m.clone(),
            GatewayError::MethodNotFound(m) => format!("Method not found: {}", m),
            GatewayError::InvalidParams(m) => m.clone(),
            GatewayError::Backend(m) => m.clone(),
            GatewayError::Transport(_) => "backend unreachable".to_string(),
            GatewayError::Timeout(ms) => format!("backend call timed out after {}ms", ms),
            GatewayError::Sse(e) => e.to_string(),
            GatewayError::Auth(e) => e.to_string(),
            GatewayError::Configuration(_) => "gateway misconfigured".to_string(),
            GatewayError::Serialization(_) => "internal serialization failure".to_string(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        GatewayError::Backend(message.into())
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        GatewayError::InvalidParams(message.into())
    }
}
