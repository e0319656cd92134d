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

//! Gateway: prepares a call context and drives the transport state machine.
//!
//! Preparation resolves security (tool, then server default, then the
//! no-security fallback), captures the passthrough credential, applies the
//! tool allow-list and snapshots the headers to forward. The drivers then
//! run the pure state machines against a [`BackendClient`].

use crate::auth::translator::{extract_and_strip_downstream, strip_unsecured};
use crate::auth::SchemeRegistry;
use crate::config::{BackendTransport, GatewayConfig};
use crate::engine_core::constants::headers;
use crate::engine_core::errors::GatewayError;
use crate::engine_core::models::{JsonRpcId, PendingOperation};
use crate::mcp::context::ProxyCallContext;
use crate::mcp::direct::DirectMachine;
use crate::mcp::filter::effective_allow_list;
use crate::mcp::http::{BackendClient, ClientReply, InboundRequest};
use crate::mcp::sse_proxy::SseMachine;
use crate::mcp::transition::{fail, Transition};
use crate::protocol::envelope::encode_gateway_error;
use futures::stream::{FuturesUnordered, StreamExt};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING};
use http::HeaderMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Drop inbound headers that never go onto a backend request. The SSE
/// GET carries no body, so it loses `content-type` too.
fn strip_hop_headers(headers: &mut HeaderMap, transport: BackendTransport) {
    for name in [CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION, HOST] {
        headers.remove(name);
    }
    if transport == BackendTransport::Sse {
        headers.remove(CONTENT_TYPE);
    }
}

pub struct McpGateway {
    config: Arc<GatewayConfig>,
    registry: Arc<SchemeRegistry>,
    client: Arc<dyn BackendClient>,
}

impl McpGateway {
    pub fn new(
        config: Arc<GatewayConfig>,
        registry: Arc<SchemeRegistry>,
        client: Arc<dyn BackendClient>,
    ) -> Self {
        Self {
            config,
            registry,
            client,
        }
    }

    /// Build the scheme registry from `config` and wrap both.
    pub fn from_config(config: GatewayConfig, client: Arc<dyn BackendClient>) -> Result<Self, GatewayError> {
        let registry = config.scheme_registry()?;
        Ok(Self::new(Arc::new(config), Arc::new(registry), client))
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Handle a client `tools/list`.
    pub async fn list_tools(&self, inbound: InboundRequest, id: JsonRpcId, params: &Value) -> ClientReply {
        let cursor = params
            .get("cursor")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.run(inbound, id, PendingOperation::ListTools { cursor }).await
    }

    /// Handle a client `tools/call`.
    pub async fn call_tool(&self, inbound: InboundRequest, id: JsonRpcId, params: &Value) -> ClientReply {
        match parse_call_params(params) {
            Ok(operation) => self.run(inbound, id, operation).await,
            Err(e) => error_reply(&id, &e),
        }
    }

    async fn run(&self, inbound: InboundRequest, id: JsonRpcId, operation: PendingOperation) -> ClientReply {
        match self.prepare(inbound, id.clone(), operation) {
            Ok(mut ctx) => self.forward(&mut ctx).await,
            Err(e) => {
                warn!(error = %e, "Rejected call before contacting backend");
                error_reply(&id, &e)
            }
        }
    }

    /// Create the call context for one client call.
    pub fn prepare(
        &self,
        inbound: InboundRequest,
        client_id: JsonRpcId,
        operation: PendingOperation,
    ) -> Result<ProxyCallContext, GatewayError> {
        let InboundRequest {
            path,
            headers: mut inbound_headers,
            ..
        } = inbound;
        let server = &self.config.server;

        let allow_header = inbound_headers
            .remove(headers::ALLOW_TOOLS)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
        let allow = effective_allow_list(self.config.allow_tools.as_deref(), allow_header.as_deref());
        let tool_name = operation.tool_name();
        if let (Some(name), Some(allow)) = (tool_name, &allow) {
            if !allow.allows(name) {
                return Err(GatewayError::invalid_params(format!("Tool not allowed: {}", name)));
            }
        }

        let tool = tool_name.and_then(|name| self.config.tool(name));
        if let (Some(name), None) = (tool_name, tool) {
            debug!(tool = name, "Tool has no local configuration, using server defaults");
        }

        let mut ctx = match server.transport {
            BackendTransport::Http => ProxyCallContext::direct(client_id),
            BackendTransport::Sse => ProxyCallContext::sse(client_id),
        };

        let downstream = tool
            .and_then(|t| t.security.as_ref())
            .or(server.default_downstream_security.as_ref());
        match downstream {
            Some(requirement) => match self.registry.get(&requirement.scheme_id) {
                Some(scheme) => match extract_and_strip_downstream(scheme, &mut inbound_headers, &path) {
                    Ok(credential) => {
                        if requirement.passthrough {
                            ctx.passthrough_credential = credential;
                        }
                    }
                    Err(e) => warn!(
                        call_id = %ctx.call_id,
                        scheme = %scheme.id,
                        error = %e,
                        "Client credential does not match downstream scheme"
                    ),
                },
                None => warn!(
                    call_id = %ctx.call_id,
                    scheme = %requirement.scheme_id,
                    "Downstream security scheme not found"
                ),
            },
            None => {
                if strip_unsecured(&mut inbound_headers, server.passthrough_auth_header) {
                    debug!(call_id = %ctx.call_id, "Removed client Authorization header");
                }
            }
        }

        ctx.upstream_security = tool
            .and_then(|t| t.request_template.security.clone())
            .or_else(|| server.default_upstream_security.clone());

        strip_hop_headers(&mut inbound_headers, server.transport);
        ctx.forward_headers = inbound_headers;
        ctx.allow_tools = allow;
        ctx.set_pending(operation);
        Ok(ctx)
    }

    /// Drive `ctx` through its transport until a client reply exists.
    ///
    /// A context left `Ready` by a previous call skips the handshake.
    /// Dropping the returned future abandons the call with no cleanup.
    pub async fn forward(&self, ctx: &mut ProxyCallContext) -> ClientReply {
        info!(
            call_id = %ctx.call_id,
            method = ctx.pending.as_ref().map(|op| op.method()).unwrap_or(""),
            tool = ctx.pending.as_ref().and_then(|op| op.tool_name()).unwrap_or(""),
            transport = ?self.config.server.transport,
            "Forwarding call to backend"
        );
        match ctx.sse_phase() {
            None => self.drive_direct(ctx).await,
            Some(_) => self.drive_sse(ctx).await,
        }
    }

    async fn drive_direct(&self, ctx: &mut ProxyCallContext) -> ClientReply {
        let machine = DirectMachine::new(&self.config.server, &self.registry);
        let timeout = self.config.timeout();

        let mut transition = machine.begin(ctx);
        loop {
            match transition {
                Transition::Reply(reply) => return reply,
                Transition::Send(call) => {
                    let result = self.client.send(call.request, timeout).await;
                    transition = machine.on_response(ctx, call.step, result);
                }
                Transition::Wait => {
                    transition = fail(ctx, GatewayError::backend("direct transport stalled"));
                }
            }
        }
    }

    async fn drive_sse(&self, ctx: &mut ProxyCallContext) -> ClientReply {
        let machine = SseMachine::new(&self.config.server, &self.registry);
        let timeout = self.config.timeout();

        let request = match machine.open_channel(ctx) {
            Ok(request) => request,
            Err(e) => return reply_of(fail(ctx, e)),
        };
        let (head, mut stream) = match self.client.open_stream(request, timeout).await {
            Ok(opened) => opened,
            Err(e) => return reply_of(fail(ctx, e)),
        };

        let mut in_flight = FuturesUnordered::new();
        let mut transition = machine.on_stream_open(ctx, &head);
        // Each phase gets the full timeout to advance.
        let mut phase = ctx.sse_phase();
        let mut deadline = Instant::now() + timeout;
        loop {
            match transition {
                Transition::Reply(reply) => return reply,
                Transition::Send(call) => {
                    let client = Arc::clone(&self.client);
                    in_flight.push(async move {
                        let result = client.send(call.request, timeout).await;
                        (call.step, result)
                    });
                }
                Transition::Wait => {}
            }
            if ctx.sse_phase() != phase {
                phase = ctx.sse_phase();
                deadline = Instant::now() + timeout;
            }

            transition = tokio::select! {
                Some((step, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    machine.on_post_complete(ctx, step, result)
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => machine.on_chunk(ctx, &bytes),
                    Some(Err(e)) => fail(ctx, e),
                    None => machine.on_stream_end(ctx),
                },
                _ = sleep_until(deadline) => {
                    warn!(call_id = %ctx.call_id, phase = ?phase, "Backend event stream stalled");
                    fail(ctx, GatewayError::Timeout(timeout.as_millis() as u64))
                }
            };
        }
    }
}

fn reply_of(transition: Transition) -> ClientReply {
    match transition {
        Transition::Reply(reply) => reply,
        _ => ClientReply::json(encode_gateway_error(
            &JsonRpcId::default(),
            &GatewayError::backend("call ended without a reply"),
        )),
    }
}

fn error_reply(id: &JsonRpcId, err: &GatewayError) -> ClientReply {
    ClientReply::json(encode_gateway_error(id, err))
}

/// Validate `tools/call` params into an operation.
fn parse_call_params(params: &Value) -> Result<PendingOperation, GatewayError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| GatewayError::invalid_params("missing tool name"))?;
    let arguments = match params.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(GatewayError::invalid_params("tool arguments must be an object")),
    };
    Ok(PendingOperation::CallTool {
        name: name.to_string(),
        arguments,
    })
}
