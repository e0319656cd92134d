// Scripted backends shared by the transport tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue};
use lilith_bridge::config::GatewayConfig;
use lilith_bridge::engine_core::errors::GatewayError;
use lilith_bridge::mcp::gateway::McpGateway;
use lilith_bridge::mcp::http::{
    BackendClient, BackendReply, ByteStream, ClientReply, HttpMethod, InboundRequest,
    OutboundRequest, StreamHead,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn inbound(headers: &[(&str, &str)]) -> InboundRequest {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    InboundRequest {
        path: "/mcp".to_string(),
        headers: map,
    }
}

pub fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub fn gateway(yaml: &str, client: Arc<dyn BackendClient>) -> McpGateway {
    let config = GatewayConfig::from_yaml_str(yaml).expect("test config must load");
    McpGateway::from_config(config, client).expect("test registry must build")
}

pub fn json_reply(status: u16, body: Value) -> BackendReply {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    BackendReply {
        status,
        headers,
        body: Bytes::from(serde_json::to_vec(&body).unwrap()),
    }
}

pub fn empty_reply(status: u16) -> BackendReply {
    BackendReply {
        status,
        headers: HeaderMap::new(),
        body: Bytes::new(),
    }
}

pub fn body_json(reply: &ClientReply) -> Value {
    serde_json::from_slice(&reply.body).expect("client reply must be JSON")
}

pub fn request_json(request: &OutboundRequest) -> Value {
    serde_json::from_slice(request.body.as_deref().expect("POST carries a body"))
        .expect("outbound body must be JSON")
}

/// Answers `send` from a queue, in order.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<BackendReply, GatewayError>>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Result<BackendReply, GatewayError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendClient for ScriptedBackend {
    async fn send(&self, request: OutboundRequest, _timeout: Duration) -> Result<BackendReply, GatewayError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Transport("no scripted reply".into())))
    }

    async fn open_stream(
        &self,
        _request: OutboundRequest,
        _timeout: Duration,
    ) -> Result<(StreamHead, ByteStream), GatewayError> {
        Err(GatewayError::Transport("scripted backend has no stream".into()))
    }
}

/// Something the simulated SSE backend does in response to a POST.
pub enum Push {
    /// Raw bytes onto the event stream
    Chunk(String),
    /// Close the event stream
    Close,
}

pub fn message_event(body: Value) -> Push {
    Push::Chunk(format!("event: message\ndata: {}\n\n", body))
}

type Responder = Box<dyn Fn(&Value) -> (u16, Vec<Push>) + Send + Sync>;

/// A backend speaking the SSE transport: every POST is acknowledged over
/// HTTP and answered on the event stream opened by the GET.
pub struct SimulatedSseBackend {
    pub stream_status: u16,
    pub stream_content_type: &'static str,
    pub endpoint: String,
    responder: Responder,
    sender: Mutex<Option<mpsc::UnboundedSender<Result<Bytes, GatewayError>>>>,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl SimulatedSseBackend {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Value) -> (u16, Vec<Push>) + Send + Sync + 'static,
    {
        Self {
            stream_status: 200,
            stream_content_type: "text/event-stream",
            endpoint: "/messages?sessionId=abc".to_string(),
            responder: Box::new(responder),
            sender: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<OutboundRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == HttpMethod::Post)
            .collect()
    }

    fn push(&self, push: Push) {
        let mut sender = self.sender.lock().unwrap();
        match push {
            Push::Chunk(text) => {
                if let Some(tx) = sender.as_ref() {
                    let _ = tx.unbounded_send(Ok(Bytes::from(text)));
                }
            }
            Push::Close => {
                sender.take();
            }
        }
    }
}

/// Answers `initialize` and `tools/*` the way a well-behaved server would.
pub fn well_behaved(request: &Value) -> (u16, Vec<Push>) {
    let id = request["id"].clone();
    let pushes = match request["method"].as_str() {
        Some("initialize") => vec![message_event(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"protocolVersion": "2025-03-26", "capabilities": {"tools": {}}}
        }))],
        Some("tools/list") => vec![message_event(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"tools": [{"name": "get_weather"}, {"name": "delete_all"}]}
        }))],
        Some("tools/call") => vec![message_event(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"content": [{"type": "text", "text": "sunny"}]}
        }))],
        _ => vec![],
    };
    (202, pushes)
}

#[async_trait]
impl BackendClient for SimulatedSseBackend {
    async fn send(&self, request: OutboundRequest, _timeout: Duration) -> Result<BackendReply, GatewayError> {
        let body = request_json(&request);
        self.requests.lock().unwrap().push(request);
        let (status, pushes) = (self.responder)(&body);
        for push in pushes {
            self.push(push);
        }
        Ok(empty_reply(status))
    }

    async fn open_stream(
        &self,
        request: OutboundRequest,
        _timeout: Duration,
    ) -> Result<(StreamHead, ByteStream), GatewayError> {
        self.requests.lock().unwrap().push(request);
        let (tx, rx) = mpsc::unbounded();
        *self.sender.lock().unwrap() = Some(tx);
        self.push(Push::Chunk(format!("event: endpoint\ndata: {}\n\n", self.endpoint)));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(self.stream_content_type));
        let head = StreamHead {
            status: self.stream_status,
            headers,
        };
        Ok((head, rx.boxed()))
    }
}
