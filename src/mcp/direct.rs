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

//! Direct-transport handshake state machine.
//!
//! `Uninitialized -> AwaitingInitializeResponse -> AwaitingInitializedAck
//! -> Ready`, then the pending operation. The machine is pure: it reads and
//! writes only the [`ProxyCallContext`] and returns the next [`Transition`].

use crate::auth::SchemeRegistry;
use crate::config::ServerConfig;
use crate::engine_core::constants::headers;
use crate::engine_core::errors::GatewayError;
use crate::mcp::context::{DirectPhase, ProxyCallContext};
use crate::mcp::http::BackendReply;
use crate::mcp::interpreter::interpret;
use crate::mcp::transition::{fail, finish_operation, Step, Transition};
use crate::protocol::negotiation::{ClientProfile, HandshakeManager};
use tracing::{debug, info, warn};

pub struct DirectMachine<'a> {
    server: &'a ServerConfig,
    registry: &'a SchemeRegistry,
}

impl<'a> DirectMachine<'a> {
    pub fn new(server: &'a ServerConfig, registry: &'a SchemeRegistry) -> Self {
        Self { server, registry }
    }

    /// Entry point: start the handshake, or go straight to the operation
    /// when the context is already `Ready`.
    pub fn begin(&self, ctx: &mut ProxyCallContext) -> Transition {
        if ctx.pending.is_none() {
            return fail(ctx, GatewayError::backend("no pending operation on call context"));
        }
        match ctx.direct_phase() {
            Some(DirectPhase::Ready) => {
                debug!(call_id = %ctx.call_id, "Backend session ready, skipping handshake");
                self.send_operation(ctx)
            }
            Some(DirectPhase::Uninitialized) => self.send_initialize(ctx),
            Some(phase) => fail(
                ctx,
                GatewayError::backend(format!("call context busy in phase {:?}", phase)),
            ),
            None => fail(ctx, GatewayError::backend("call context is not a direct-transport context")),
        }
    }

    /// Feed the completion of an outbound call back into the machine.
    pub fn on_response(
        &self,
        ctx: &mut ProxyCallContext,
        step: Step,
        result: Result<BackendReply, GatewayError>,
    ) -> Transition {
        let expected = match step {
            Step::Initialize => DirectPhase::AwaitingInitializeResponse,
            Step::Initialized => DirectPhase::AwaitingInitializedAck,
            Step::Operation => DirectPhase::AwaitingOperationResponse,
        };
        if ctx.direct_phase() != Some(expected) {
            return fail(
                ctx,
                GatewayError::backend(format!(
                    "unexpected {:?} completion in phase {:?}",
                    step,
                    ctx.direct_phase()
                )),
            );
        }

        match step {
            Step::Initialize => self.on_initialize(ctx, result),
            Step::Initialized => self.on_initialized_ack(ctx, result),
            Step::Operation => self.on_operation(ctx, result),
        }
    }

    fn send_initialize(&self, ctx: &mut ProxyCallContext) -> Transition {
        let id = ctx.allocate_request_id();
        let message = HandshakeManager::initialize_request(
            id,
            &self.server.protocol_version,
            ClientProfile::Direct,
        );
        match ctx.build_post(self.registry, &self.server.url, &message) {
            Ok(request) => {
                ctx.set_direct_phase(DirectPhase::AwaitingInitializeResponse);
                debug!(call_id = %ctx.call_id, url = %self.server.url, "Sending initialize");
                Transition::send(Step::Initialize, request)
            }
            Err(e) => fail(ctx, e),
        }
    }

    fn on_initialize(
        &self,
        ctx: &mut ProxyCallContext,
        result: Result<BackendReply, GatewayError>,
    ) -> Transition {
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => return fail(ctx, e),
        };
        if reply.status != 200 {
            return fail(
                ctx,
                GatewayError::backend(format!(
                    "backend initialization failed with status {}",
                    reply.status
                )),
            );
        }

        let response = match interpret(&reply.body, reply.content_type()) {
            Ok(response) => response,
            Err(e) => return fail(ctx, e),
        };
        if let Some(err) = response.error {
            let failure = if HandshakeManager::is_version_rejection(&err) {
                format!(
                    "backend does not support protocol version {}: {}",
                    self.server.protocol_version, err.message
                )
            } else {
                format!("backend initialization failed: {}", err.message)
            };
            return fail(ctx, GatewayError::backend(failure));
        }

        if let Some(session) = reply.headers.get(headers::MCP_SESSION_ID).filter(|s| !s.is_empty()) {
            ctx.session_id = Some(session.clone());
        }
        info!(
            call_id = %ctx.call_id,
            session = ?ctx.session_id,
            "Backend initialized"
        );

        let notification = HandshakeManager::initialized_notification();
        match ctx.build_post(self.registry, &self.server.url, &notification) {
            Ok(request) => {
                ctx.set_direct_phase(DirectPhase::AwaitingInitializedAck);
                Transition::send(Step::Initialized, request)
            }
            Err(e) => fail(ctx, e),
        }
    }

    fn on_initialized_ack(
        &self,
        ctx: &mut ProxyCallContext,
        result: Result<BackendReply, GatewayError>,
    ) -> Transition {
        match result {
            Ok(reply) if (200..300).contains(&reply.status) => {}
            Ok(reply) => warn!(
                call_id = %ctx.call_id,
                status = reply.status,
                "notifications/initialized was not accepted, continuing"
            ),
            Err(e) => warn!(
                call_id = %ctx.call_id,
                error = %e,
                "notifications/initialized failed, continuing"
            ),
        }
        ctx.set_direct_phase(DirectPhase::Ready);
        self.send_operation(ctx)
    }

    fn send_operation(&self, ctx: &mut ProxyCallContext) -> Transition {
        let Some(operation) = ctx.pending.clone() else {
            return fail(ctx, GatewayError::backend("no pending operation on call context"));
        };
        let method = operation.method();
        let id = ctx.allocate_request_id();
        let message = operation.to_request(id);
        match ctx.build_post(self.registry, &self.server.url, &message) {
            Ok(request) => {
                ctx.set_direct_phase(DirectPhase::AwaitingOperationResponse);
                debug!(call_id = %ctx.call_id, method, id, "Sending operation");
                Transition::send(Step::Operation, request)
            }
            Err(e) => fail(ctx, e),
        }
    }

    fn on_operation(
        &self,
        ctx: &mut ProxyCallContext,
        result: Result<BackendReply, GatewayError>,
    ) -> Transition {
        ctx.set_direct_phase(DirectPhase::Ready);
        let Some(operation) = ctx.pending.take() else {
            return fail(ctx, GatewayError::backend("no pending operation on call context"));
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => return fail(ctx, e),
        };
        if reply.status != 200 {
            return fail(
                ctx,
                GatewayError::backend(format!(
                    "backend {} failed with status {}",
                    operation.method(),
                    reply.status
                )),
            );
        }

        match interpret(&reply.body, reply.content_type()) {
            Ok(response) => finish_operation(ctx, &operation, response),
            Err(e) => fail(ctx, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::engine_core::models::{JsonRpcId, PendingOperation};
    use crate::mcp::transition::OutboundCall;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue};
    use serde_json::Value;

    fn server() -> ServerConfig {
        GatewayConfig::from_yaml_str("server: { url: 'http://b/mcp' }").unwrap().server
    }

    fn reply(status: u16, body: &str) -> Result<BackendReply, GatewayError> {
        Ok(BackendReply {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn sent(t: Transition) -> OutboundCall {
        match t {
            Transition::Send(call) => call,
            other => panic!("expected a send, got {:?}", other),
        }
    }

    fn replied(t: Transition) -> Value {
        match t {
            Transition::Reply(r) => serde_json::from_slice(&r.body).unwrap(),
            other => panic!("expected a reply, got {:?}", other),
        }
    }

    fn ctx() -> ProxyCallContext {
        let mut ctx = ProxyCallContext::direct(JsonRpcId::Int(5));
        ctx.set_pending(PendingOperation::ListTools { cursor: None });
        ctx
    }

    #[test]
    fn test_phases_follow_handshake() {
        let server = server();
        let registry = SchemeRegistry::default();
        let machine = DirectMachine::new(&server, &registry);
        let mut ctx = ctx();

        let call = sent(machine.begin(&mut ctx));
        assert_eq!(call.step, Step::Initialize);
        assert_eq!(ctx.direct_phase(), Some(DirectPhase::AwaitingInitializeResponse));

        let init = r#"{"jsonrpc":"2.0","id":1,"result":{}}"#;
        let call = sent(machine.on_response(&mut ctx, Step::Initialize, reply(200, init)));
        assert_eq!(call.step, Step::Initialized);
        assert_eq!(ctx.direct_phase(), Some(DirectPhase::AwaitingInitializedAck));

        let call = sent(machine.on_response(&mut ctx, Step::Initialized, reply(500, "")));
        assert_eq!(call.step, Step::Operation);
        assert_eq!(ctx.direct_phase(), Some(DirectPhase::AwaitingOperationResponse));
        assert_eq!(ctx.last_request_id, Some(2));

        let body = replied(machine.on_response(
            &mut ctx,
            Step::Operation,
            reply(200, r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}"#),
        ));
        assert_eq!(body["id"], 5);
        assert_eq!(ctx.direct_phase(), Some(DirectPhase::Ready));
        assert!(ctx.pending.is_none());
    }

    #[test]
    fn test_opaque_session_id_is_kept() {
        let server = server();
        let registry = SchemeRegistry::default();
        let machine = DirectMachine::new(&server, &registry);
        let mut ctx = ctx();
        sent(machine.begin(&mut ctx));

        let mut headers = HeaderMap::new();
        headers.insert("mcp-session-id", HeaderValue::from_bytes(b"s\xff1").unwrap());
        let init = Ok(BackendReply {
            status: 200,
            headers,
            body: Bytes::from_static(br#"{"jsonrpc":"2.0","id":1,"result":{}}"#),
        });
        let call = sent(machine.on_response(&mut ctx, Step::Initialize, init));
        assert_eq!(call.request.headers["mcp-session-id"].as_bytes(), b"s\xff1");
    }

    #[test]
    fn test_begin_requires_pending_operation() {
        let server = server();
        let registry = SchemeRegistry::default();
        let machine = DirectMachine::new(&server, &registry);
        let mut ctx = ProxyCallContext::direct(JsonRpcId::Int(1));
        assert_eq!(replied(machine.begin(&mut ctx))["error"]["code"], -32603);
    }

    #[test]
    fn test_busy_context_is_rejected() {
        let server = server();
        let registry = SchemeRegistry::default();
        let machine = DirectMachine::new(&server, &registry);
        let mut ctx = ctx();
        ctx.set_direct_phase(DirectPhase::AwaitingOperationResponse);
        assert_eq!(replied(machine.begin(&mut ctx))["error"]["code"], -32603);
    }

    #[test]
    fn test_unexpected_completion_fails() {
        let server = server();
        let registry = SchemeRegistry::default();
        let machine = DirectMachine::new(&server, &registry);
        let mut ctx = ctx();
        sent(machine.begin(&mut ctx));
        let body = replied(machine.on_response(&mut ctx, Step::Operation, reply(200, "{}")));
        assert_eq!(body["error"]["code"], -32603);
    }

    #[test]
    fn test_ready_context_sends_operation_first() {
        let server = server();
        let registry = SchemeRegistry::default();
        let machine = DirectMachine::new(&server, &registry);
        let mut ctx = ctx();
        ctx.set_direct_phase(DirectPhase::Ready);
        assert_eq!(sent(machine.begin(&mut ctx)).step, Step::Operation);
    }
}
