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

//! SSE-transport state machine.
//!
//! The client call becomes a GET on the backend's event stream. Commands go
//! out as separate POSTs to the URL announced by the `endpoint` event, and
//! their answers come back on the stream:
//! `AwaitingEndpoint -> AwaitingInitResponse -> AwaitingNotifyResponse ->
//! AwaitingToolResponse -> Done`.

use crate::auth::SchemeRegistry;
use crate::config::ServerConfig;
use crate::engine_core::constants::{headers, sse as events};
use crate::engine_core::errors::{GatewayError, SseError};
use crate::mcp::context::{ProxyCallContext, SsePhase};
use crate::mcp::http::{BackendReply, OutboundRequest, StreamHead};
use crate::mcp::interpreter::{is_event_stream, BackendResponse};
use crate::mcp::sse::{extract_endpoint_url, SseDecoder, SseLimits, SseMessage};
use crate::mcp::transition::{fail, finish_operation, Step, Transition};
use crate::protocol::negotiation::{ClientProfile, HandshakeManager};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::HeaderValue;
use serde_json::Value;
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

fn post_accepted(status: u16) -> bool {
    status == 200 || status == 202
}

fn is_message_event(msg: &SseMessage) -> bool {
    msg.event.is_empty() || msg.event == events::EVENT_MESSAGE
}

pub struct SseMachine<'a> {
    server: &'a ServerConfig,
    registry: &'a SchemeRegistry,
    limits: SseLimits,
}

impl<'a> SseMachine<'a> {
    pub fn new(server: &'a ServerConfig, registry: &'a SchemeRegistry) -> Self {
        Self {
            server,
            registry,
            limits: server.sse_limits,
        }
    }

    /// The GET that opens the backend event stream.
    pub fn open_channel(&self, ctx: &ProxyCallContext) -> Result<OutboundRequest, GatewayError> {
        let mut h = ctx.forward_headers.clone();
        h.remove(CONTENT_TYPE);
        h.insert(ACCEPT, HeaderValue::from_static(headers::TEXT_EVENT_STREAM));
        let url = ctx.authorize(self.registry, &mut h, &self.server.url)?;
        Ok(OutboundRequest::get(url, h))
    }

    pub fn on_stream_open(&self, ctx: &mut ProxyCallContext, head: &StreamHead) -> Transition {
        if !(200..300).contains(&head.status) {
            return fail(
                ctx,
                GatewayError::backend(format!("backend event stream returned status {}", head.status)),
            );
        }
        let content_type = head.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        if !is_event_stream(content_type) {
            return fail(
                ctx,
                GatewayError::backend(format!(
                    "backend did not open an event stream (content-type: {})",
                    content_type.unwrap_or("none")
                )),
            );
        }
        debug!(call_id = %ctx.call_id, "Backend event stream open");
        Transition::Wait
    }

    /// Append a stream chunk and process every complete message it finishes.
    pub fn on_chunk(&self, ctx: &mut ProxyCallContext, chunk: &[u8]) -> Transition {
        let max_buffer = self.limits.max_buffer_bytes;
        let overflow = match ctx.sse_channel_mut() {
            Some(chan) if chan.phase == SsePhase::Done => return Transition::Wait,
            Some(chan) => {
                if chan.retained_bytes() + chunk.len() > max_buffer {
                    true
                } else {
                    chan.buffer.extend_from_slice(chunk);
                    false
                }
            }
            None => return fail(ctx, GatewayError::backend("call context is not an SSE context")),
        };
        if overflow {
            return fail(ctx, SseError::BufferOverflow { limit: max_buffer }.into());
        }
        self.drain(ctx)
    }

    /// Completion of one of the out-of-band POSTs.
    pub fn on_post_complete(
        &self,
        ctx: &mut ProxyCallContext,
        step: Step,
        result: Result<BackendReply, GatewayError>,
    ) -> Transition {
        match step {
            Step::Initialize | Step::Operation => {
                let what = match (step, &ctx.pending) {
                    (Step::Initialize, _) => "initialize",
                    (_, Some(op)) => op.method(),
                    (_, None) => "operation",
                };
                match result {
                    Ok(reply) if post_accepted(reply.status) => {
                        debug!(call_id = %ctx.call_id, what, status = reply.status, "POST accepted");
                        Transition::Wait
                    }
                    Ok(reply) => fail(
                        ctx,
                        GatewayError::backend(format!("backend {} failed with status {}", what, reply.status)),
                    ),
                    Err(e) => fail(ctx, e),
                }
            }
            Step::Initialized => {
                if ctx.sse_phase() != Some(SsePhase::AwaitingNotifyResponse) {
                    return fail(
                        ctx,
                        GatewayError::backend(format!(
                            "unexpected notification completion in phase {:?}",
                            ctx.sse_phase()
                        )),
                    );
                }
                match result {
                    Ok(reply) if post_accepted(reply.status) => {}
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
                self.send_operation(ctx)
            }
        }
    }

    pub fn on_stream_end(&self, ctx: &mut ProxyCallContext) -> Transition {
        match ctx.sse_phase() {
            Some(SsePhase::Done) => Transition::Wait,
            phase => fail(
                ctx,
                GatewayError::backend(format!(
                    "backend closed the event stream before answering (phase {:?})",
                    phase
                )),
            ),
        }
    }

    fn set_phase(ctx: &mut ProxyCallContext, phase: SsePhase) {
        if let Some(chan) = ctx.sse_channel_mut() {
            chan.phase = phase;
        }
    }

    fn drain(&self, ctx: &mut ProxyCallContext) -> Transition {
        let limits = self.limits;
        loop {
            let phase = match ctx.sse_phase() {
                Some(SsePhase::AwaitingNotifyResponse) | Some(SsePhase::Done) => return Transition::Wait,
                Some(phase) => phase,
                None => return fail(ctx, GatewayError::backend("call context is not an SSE context")),
            };

            let decoded = match ctx.sse_channel_mut() {
                Some(chan) => chan
                    .decoder
                    .get_or_insert_with(|| SseDecoder::new(limits))
                    .decode(&mut chan.buffer),
                None => Ok(None),
            };
            let msg = match decoded {
                Ok(Some(msg)) => msg,
                Ok(None) => return Transition::Wait,
                Err(e) => return fail(ctx, e.into()),
            };

            let next = match phase {
                SsePhase::AwaitingEndpoint => self.on_endpoint_event(ctx, msg),
                SsePhase::AwaitingInitResponse => self.on_init_event(ctx, msg),
                SsePhase::AwaitingToolResponse => self.on_tool_event(ctx, msg),
                SsePhase::AwaitingNotifyResponse | SsePhase::Done => None,
            };
            if let Some(transition) = next {
                return transition;
            }
        }
    }

    /// Parse a `message` event that answers the last dispatched request.
    /// `None` for anything else, which is skipped.
    fn correlated_response(&self, ctx: &ProxyCallContext, msg: &SseMessage) -> Option<BackendResponse> {
        if !is_message_event(msg) {
            debug!(call_id = %ctx.call_id, event = %msg.event, "Skipping SSE event");
            return None;
        }
        let value: Value = match serde_json::from_str(&msg.data) {
            Ok(value) => value,
            Err(e) => {
                warn!(call_id = %ctx.call_id, error = %e, "Skipping undecodable SSE message");
                return None;
            }
        };
        let response = match BackendResponse::from_value(value) {
            Ok(response) => response,
            Err(_) => {
                debug!(call_id = %ctx.call_id, "Skipping SSE message that is not a response");
                return None;
            }
        };
        match ctx.last_request_id {
            Some(expected) if response.id.matches_int(expected) => Some(response),
            _ => {
                debug!(call_id = %ctx.call_id, id = %response.id, "Skipping uncorrelated response");
                None
            }
        }
    }

    fn endpoint(&self, ctx: &mut ProxyCallContext) -> Option<String> {
        ctx.sse_channel_mut().and_then(|chan| chan.endpoint_url.clone())
    }

    fn on_endpoint_event(&self, ctx: &mut ProxyCallContext, msg: SseMessage) -> Option<Transition> {
        if msg.event != events::EVENT_ENDPOINT {
            debug!(call_id = %ctx.call_id, event = %msg.event, "Waiting for endpoint, skipping event");
            return None;
        }
        let url = match extract_endpoint_url(msg.data.trim(), &self.server.url) {
            Ok(url) => url,
            Err(e) => return Some(fail(ctx, e)),
        };
        info!(call_id = %ctx.call_id, endpoint = %url, "Backend announced command endpoint");

        let id = ctx.allocate_request_id();
        let message = HandshakeManager::initialize_request(
            id,
            &self.server.protocol_version,
            ClientProfile::Streaming,
        );
        let request = match ctx.build_post(self.registry, &url, &message) {
            Ok(request) => request,
            Err(e) => return Some(fail(ctx, e)),
        };
        if let Some(chan) = ctx.sse_channel_mut() {
            chan.endpoint_url = Some(url);
            chan.phase = SsePhase::AwaitingInitResponse;
        }
        Some(Transition::send(Step::Initialize, request))
    }

    fn on_init_event(&self, ctx: &mut ProxyCallContext, msg: SseMessage) -> Option<Transition> {
        let response = self.correlated_response(ctx, &msg)?;
        if let Some(err) = response.error {
            let failure = if HandshakeManager::is_version_rejection(&err) {
                format!(
                    "backend does not support protocol version {}: {}",
                    self.server.protocol_version, err.message
                )
            } else {
                format!("backend initialization failed: {}", err.message)
            };
            return Some(fail(ctx, GatewayError::backend(failure)));
        }
        info!(call_id = %ctx.call_id, "Backend initialized over SSE");

        let Some(url) = self.endpoint(ctx) else {
            return Some(fail(ctx, GatewayError::backend("no command endpoint recorded")));
        };
        let notification = HandshakeManager::initialized_notification();
        match ctx.build_post(self.registry, &url, &notification) {
            Ok(request) => {
                Self::set_phase(ctx, SsePhase::AwaitingNotifyResponse);
                Some(Transition::send(Step::Initialized, request))
            }
            Err(e) => Some(fail(ctx, e)),
        }
    }

    fn send_operation(&self, ctx: &mut ProxyCallContext) -> Transition {
        let Some(operation) = ctx.pending.clone() else {
            return fail(ctx, GatewayError::backend("no pending operation on call context"));
        };
        let Some(url) = self.endpoint(ctx) else {
            return fail(ctx, GatewayError::backend("no command endpoint recorded"));
        };
        let id = ctx.allocate_request_id();
        let message = operation.to_request(id);
        match ctx.build_post(self.registry, &url, &message) {
            Ok(request) => {
                Self::set_phase(ctx, SsePhase::AwaitingToolResponse);
                debug!(call_id = %ctx.call_id, method = operation.method(), id, "Sending operation");
                Transition::send(Step::Operation, request)
            }
            Err(e) => fail(ctx, e),
        }
    }

    fn on_tool_event(&self, ctx: &mut ProxyCallContext, msg: SseMessage) -> Option<Transition> {
        let response = self.correlated_response(ctx, &msg)?;
        Self::set_phase(ctx, SsePhase::Done);
        let Some(operation) = ctx.pending.take() else {
            return Some(fail(ctx, GatewayError::backend("no pending operation on call context")));
        };
        Some(finish_operation(ctx, &operation, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::engine_core::models::{JsonRpcId, PendingOperation};
    use crate::mcp::http::HttpMethod;
    use crate::mcp::transition::OutboundCall;
    use bytes::Bytes;
    use http::HeaderMap;

    fn server() -> ServerConfig {
        GatewayConfig::from_yaml_str("server: { url: 'http://b:8000/sse', transport: sse }")
            .unwrap()
            .server
    }

    fn head(content_type: &'static str) -> StreamHead {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        StreamHead { status: 200, headers }
    }

    fn accepted() -> Result<BackendReply, GatewayError> {
        Ok(BackendReply {
            status: 202,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }

    fn sent(t: Transition) -> OutboundCall {
        match t {
            Transition::Send(call) => call,
            other => panic!("expected a send, got {:?}", other),
        }
    }

    fn ctx() -> ProxyCallContext {
        let mut ctx = ProxyCallContext::sse(JsonRpcId::Str("c".into()));
        ctx.set_pending(PendingOperation::ListTools { cursor: None });
        ctx
    }

    #[test]
    fn test_open_channel_is_event_stream_get() {
        let server = server();
        let registry = SchemeRegistry::default();
        let machine = SseMachine::new(&server, &registry);
        let mut ctx = ctx();
        ctx.forward_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let req = machine.open_channel(&ctx).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://b:8000/sse");
        assert_eq!(req.headers["accept"], "text/event-stream");
        assert!(!req.headers.contains_key("content-type"));
    }

    #[test]
    fn test_answer_on_stream_before_post_completes() {
        let server = server();
        let registry = SchemeRegistry::default();
        let machine = SseMachine::new(&server, &registry);
        let mut ctx = ctx();

        assert_eq!(machine.on_stream_open(&mut ctx, &head("text/event-stream")), Transition::Wait);
        let init = sent(machine.on_chunk(&mut ctx, b"event: endpoint\ndata: /msg?s=1\n\n"));
        assert_eq!(init.step, Step::Initialize);
        assert_eq!(init.request.url, "http://b:8000/msg?s=1");

        let notify = sent(machine.on_chunk(
            &mut ctx,
            b"data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n",
        ));
        assert_eq!(notify.step, Step::Initialized);
        assert_eq!(ctx.sse_phase(), Some(SsePhase::AwaitingNotifyResponse));

        // the initialize POST finishing late changes nothing
        assert_eq!(machine.on_post_complete(&mut ctx, Step::Initialize, accepted()), Transition::Wait);

        let op = sent(machine.on_post_complete(
            &mut ctx,
            Step::Initialized,
            Err(GatewayError::Transport("reset".into())),
        ));
        assert_eq!(op.step, Step::Operation);
        assert_eq!(ctx.sse_phase(), Some(SsePhase::AwaitingToolResponse));

        let part = b"event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,";
        assert_eq!(machine.on_chunk(&mut ctx, part), Transition::Wait);
        let chan = ctx.sse_channel_mut().unwrap();
        assert_eq!(&chan.buffer[..], &b"data: {\"jsonrpc\":\"2.0\",\"id\":2,"[..]);
        assert_eq!(chan.retained_bytes(), part.len());
        let done = machine.on_chunk(&mut ctx, b"\"result\":{\"tools\":[]}}\n\n");
        match done {
            Transition::Reply(reply) => {
                let body: Value = serde_json::from_slice(&reply.body).unwrap();
                assert_eq!(body["id"], "c");
                assert_eq!(body["result"]["tools"], serde_json::json!([]));
            }
            other => panic!("expected a reply, got {:?}", other),
        }
        assert_eq!(ctx.sse_phase(), Some(SsePhase::Done));
        assert_eq!(machine.on_chunk(&mut ctx, b"data: late\n\n"), Transition::Wait);
        assert_eq!(machine.on_stream_end(&mut ctx), Transition::Wait);
    }

    #[test]
    fn test_events_before_endpoint_are_skipped() {
        let server = server();
        let registry = SchemeRegistry::default();
        let machine = SseMachine::new(&server, &registry);
        let mut ctx = ctx();
        assert_eq!(machine.on_chunk(&mut ctx, b"event: message\ndata: {}\n\n"), Transition::Wait);
        assert_eq!(ctx.sse_phase(), Some(SsePhase::AwaitingEndpoint));
    }

    #[test]
    fn test_notification_completion_out_of_phase() {
        let server = server();
        let registry = SchemeRegistry::default();
        let machine = SseMachine::new(&server, &registry);
        let mut ctx = ctx();
        assert!(machine
            .on_post_complete(&mut ctx, Step::Initialized, accepted())
            .is_reply());
    }

    #[test]
    fn test_stream_head_must_be_event_stream() {
        let server = server();
        let registry = SchemeRegistry::default();
        let machine = SseMachine::new(&server, &registry);
        let mut ctx = ctx();
        assert!(machine.on_stream_open(&mut ctx, &head("application/json")).is_reply());
        assert!(machine.on_stream_end(&mut ctx).is_reply());
    }
}
