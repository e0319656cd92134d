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

//! Transition vocabulary shared by both transport state machines.

use crate::engine_core::errors::GatewayError;
use crate::engine_core::models::PendingOperation;
use crate::mcp::context::ProxyCallContext;
use crate::mcp::http::{ClientReply, OutboundRequest};
use crate::mcp::interpreter::{BackendResponse, ResponseClass};
use crate::protocol::envelope::{encode_failure, encode_gateway_error, encode_success};
use serde_json::Value;
use tracing::{debug, error, warn};

/// Which handshake step an outbound call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Initialize,
    Initialized,
    Operation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCall {
    pub step: Step,
    pub request: OutboundRequest,
}

/// What the driver must do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Issue this call and feed its completion back
    Send(OutboundCall),
    /// Nothing to do until the next stream event
    Wait,
    /// Terminal: deliver this to the client
    Reply(ClientReply),
}

impl Transition {
    pub fn send(step: Step, request: OutboundRequest) -> Self {
        Transition::Send(OutboundCall { step, request })
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Transition::Reply(_))
    }
}

/// Terminal error reply for the call.
pub fn fail(ctx: &ProxyCallContext, err: GatewayError) -> Transition {
    error!(call_id = %ctx.call_id, code = err.code(), error = %err, "Call failed");
    Transition::Reply(ClientReply::json(encode_gateway_error(&ctx.client_id, &err)))
}

/// Turn the backend's answer to the pending operation into the client
/// reply. Backend errors and `isError` results pass through unchanged.
pub fn finish_operation(
    ctx: &ProxyCallContext,
    operation: &PendingOperation,
    response: BackendResponse,
) -> Transition {
    let class = response.class();
    match class {
        ResponseClass::Success => {
            debug!(call_id = %ctx.call_id, method = operation.method(), "Backend operation succeeded")
        }
        _ => warn!(
            call_id = %ctx.call_id,
            method = operation.method(),
            class = class.as_str(),
            "Backend reported an error, passing through"
        ),
    }

    if let Some(err) = response.error {
        return Transition::Reply(ClientReply::json(encode_failure(&ctx.client_id, err)));
    }

    let mut result = match response.result {
        Some(result @ Value::Object(_)) => result,
        _ => {
            return fail(
                ctx,
                GatewayError::backend(format!("invalid {} response", operation.method())),
            )
        }
    };

    if let (PendingOperation::ListTools { .. }, Some(allow)) = (operation, &ctx.allow_tools) {
        let removed = allow.filter_tools_result(&mut result);
        debug!(call_id = %ctx.call_id, removed, "Applied tool allow-list");
    }

    Transition::Reply(ClientReply::json(encode_success(&ctx.client_id, result)))
}
