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

//! Per-call state.
//!
//! A [`ProxyCallContext`] is created when a client call arrives and dropped
//! once its reply has been produced. Everything a state machine needs to
//! resume after an outbound call completes is stored here.

use crate::auth::scheme::{SchemeRegistry, SecurityRequirement};
use crate::auth::translator::apply_upstream;
use crate::engine_core::constants::headers;
use crate::engine_core::errors::GatewayError;
use crate::engine_core::models::{JsonRpcId, JsonRpcRequest, PendingOperation};
use crate::mcp::filter::AllowList;
use crate::mcp::http::OutboundRequest;
use crate::mcp::sse::SseDecoder;
use bytes::BytesMut;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use uuid::Uuid;

/// Direct-transport handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectPhase {
    Uninitialized,
    AwaitingInitializeResponse,
    AwaitingInitializedAck,
    /// Handshake complete, no operation in flight
    Ready,
    AwaitingOperationResponse,
}

/// SSE-transport progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsePhase {
    AwaitingEndpoint,
    AwaitingInitResponse,
    AwaitingNotifyResponse,
    AwaitingToolResponse,
    Done,
}

/// State of the backend event stream for one call.
#[derive(Debug)]
pub struct SseChannel {
    pub phase: SsePhase,
    /// Command URL discovered from the `endpoint` event
    pub endpoint_url: Option<String>,
    /// Unterminated tail of the stream
    pub buffer: BytesMut,
    /// Created on the first chunk with the server's limits
    pub decoder: Option<SseDecoder>,
}

impl SseChannel {
    /// Bytes held for this call, buffered or folded into a partial message.
    pub fn retained_bytes(&self) -> usize {
        self.buffer.len() + self.decoder.as_ref().map_or(0, SseDecoder::pending_bytes)
    }
}

impl Default for SseChannel {
    fn default() -> Self {
        Self {
            phase: SsePhase::AwaitingEndpoint,
            endpoint_url: None,
            buffer: BytesMut::new(),
            decoder: None,
        }
    }
}

#[derive(Debug)]
pub enum TransportState {
    Direct(DirectPhase),
    Sse(SseChannel),
}

#[derive(Debug)]
pub struct ProxyCallContext {
    /// Correlates log lines for one client call
    pub call_id: Uuid,
    /// Id of the client request, echoed on the reply
    pub client_id: JsonRpcId,
    pub transport: TransportState,
    /// Backend session, once assigned; kept as raw header bytes
    pub session_id: Option<HeaderValue>,
    pub pending: Option<PendingOperation>,
    pub upstream_security: Option<SecurityRequirement>,
    pub passthrough_credential: Option<String>,
    /// Inbound headers minus hop-by-hop and stripped credentials
    pub forward_headers: HeaderMap,
    pub allow_tools: Option<AllowList>,
    next_request_id: i64,
    pub last_request_id: Option<i64>,
}

impl ProxyCallContext {
    fn new(client_id: JsonRpcId, transport: TransportState) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            client_id,
            transport,
            session_id: None,
            pending: None,
            upstream_security: None,
            passthrough_credential: None,
            forward_headers: HeaderMap::new(),
            allow_tools: None,
            next_request_id: 1,
            last_request_id: None,
        }
    }

    pub fn direct(client_id: JsonRpcId) -> Self {
        Self::new(client_id, TransportState::Direct(DirectPhase::Uninitialized))
    }

    pub fn sse(client_id: JsonRpcId) -> Self {
        Self::new(client_id, TransportState::Sse(SseChannel::default()))
    }

    /// Queue the operation to run once the handshake allows it.
    pub fn set_pending(&mut self, operation: PendingOperation) {
        self.pending = Some(operation);
    }

    /// Next outbound JSON-RPC id for this context; also recorded as the
    /// id a response must carry.
    pub fn allocate_request_id(&mut self) -> i64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        self.last_request_id = Some(id);
        id
    }

    pub fn direct_phase(&self) -> Option<DirectPhase> {
        match self.transport {
            TransportState::Direct(phase) => Some(phase),
            TransportState::Sse(_) => None,
        }
    }

    pub fn set_direct_phase(&mut self, phase: DirectPhase) {
        self.transport = TransportState::Direct(phase);
    }

    pub fn sse_phase(&self) -> Option<SsePhase> {
        match &self.transport {
            TransportState::Sse(chan) => Some(chan.phase),
            TransportState::Direct(_) => None,
        }
    }

    pub fn sse_channel_mut(&mut self) -> Option<&mut SseChannel> {
        match &mut self.transport {
            TransportState::Sse(chan) => Some(chan),
            TransportState::Direct(_) => None,
        }
    }

    /// Headers every backend request carries, before authentication.
    pub fn base_headers(&self) -> HeaderMap {
        let mut h = self.forward_headers.clone();
        h.insert(CONTENT_TYPE, HeaderValue::from_static(headers::APPLICATION_JSON));
        h.insert(ACCEPT, HeaderValue::from_static(headers::ACCEPT_MCP));
        if let Some(session) = &self.session_id {
            h.insert(headers::MCP_SESSION_ID, session.clone());
        }
        h
    }

    /// Apply the upstream requirement (if any) to `headers`, returning the
    /// final target URL.
    pub fn authorize(
        &self,
        registry: &SchemeRegistry,
        headers: &mut HeaderMap,
        url: &str,
    ) -> Result<String, GatewayError> {
        match &self.upstream_security {
            Some(req) => Ok(apply_upstream(
                registry,
                req,
                self.passthrough_credential.as_deref(),
                headers,
                url,
            )?),
            None => Ok(url.to_string()),
        }
    }

    /// A JSON-RPC POST to `url` with session and credentials applied.
    pub fn build_post(
        &self,
        registry: &SchemeRegistry,
        url: &str,
        message: &JsonRpcRequest,
    ) -> Result<OutboundRequest, GatewayError> {
        let body = serde_json::to_vec(message)?;
        let mut headers = self.base_headers();
        let url = self.authorize(registry, &mut headers, url)?;
        Ok(OutboundRequest::post(url, headers, body))
    }
}
