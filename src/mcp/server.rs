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

//! Client-facing HTTP front end and the outer JSON-RPC dispatch table.
//!
//! `initialize`, `ping` and notifications are answered locally; `tools/list`
//! and `tools/call` go through the [`McpGateway`].

use crate::engine_core::constants::methods;
use crate::engine_core::errors::GatewayError;
use crate::engine_core::models::JsonRpcId;
use crate::mcp::gateway::McpGateway;
use crate::mcp::http::{ClientReply, InboundRequest};
use crate::protocol::envelope::{decode_envelope, encode_gateway_error, encode_success};
use crate::protocol::negotiation::HandshakeManager;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::debug;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<McpGateway>,
}

pub fn create_router(gateway: Arc<McpGateway>) -> Router {
    let path = gateway.config().path.clone();
    Router::new()
        .route(&path, post(handle_mcp))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { gateway })
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, gateway: Arc<McpGateway>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(gateway))
        .with_graceful_shutdown(shutdown)
        .await
}

fn into_response(reply: ClientReply) -> Response {
    let mut response = Response::new(Body::from(reply.body));
    *response.status_mut() =
        StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    *response.headers_mut() = reply.headers;
    response
}

async fn handle_mcp(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let inbound = InboundRequest {
        path: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string()),
        headers,
    };
    into_response(dispatch(&state.gateway, inbound, &body).await)
}

/// Route one JSON-RPC message. Always produces exactly one reply.
pub async fn dispatch(gateway: &McpGateway, inbound: InboundRequest, body: &[u8]) -> ClientReply {
    let call = match decode_envelope(body) {
        Ok(call) => call,
        Err(e) => {
            debug!(error = %e, "Rejecting undecodable client message");
            return ClientReply::json(encode_gateway_error(&JsonRpcId::default(), &e));
        }
    };

    // id-less calls other than notifications are answered with id 0
    if call.method.starts_with(methods::NOTIFICATION_PREFIX) {
        debug!(method = %call.method, "Client notification acknowledged");
        return ClientReply::accepted();
    }

    let server = &gateway.config().server;
    match call.method.as_str() {
        methods::INITIALIZE => ClientReply::json(encode_success(
            &call.id,
            HandshakeManager::server_initialize_result(&call.params, &server.name, &server.protocol_version),
        )),
        methods::PING => ClientReply::json(encode_success(&call.id, json!({}))),
        methods::TOOLS_LIST => gateway.list_tools(inbound, call.id, &call.params).await,
        methods::TOOLS_CALL => gateway.call_tool(inbound, call.id, &call.params).await,
        other => ClientReply::json(encode_gateway_error(
            &call.id,
            &GatewayError::MethodNotFound(other.to_string()),
        )),
    }
}
