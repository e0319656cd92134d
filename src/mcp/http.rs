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

//! Backend HTTP plumbing.
//!
//! The state machines only ever see [`OutboundRequest`] / [`BackendReply`];
//! the [`BackendClient`] trait is the seam where real I/O happens.

use crate::engine_core::constants::headers;
use crate::engine_core::errors::GatewayError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// The client call as the gateway received it.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Path plus query string
    pub path: String,
    pub headers: HeaderMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    pub fn post(url: impl Into<String>, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers,
            body: Some(body.into()),
        }
    }

    pub fn get(url: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers,
            body: None,
        }
    }
}

/// A fully read backend response.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendReply {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendReply {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

/// Status line and headers of a streamed response.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamHead {
    pub status: u16,
    pub headers: HeaderMap,
}

pub type ByteStream = BoxStream<'static, Result<Bytes, GatewayError>>;

/// What the gateway hands back to its own client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientReply {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ClientReply {
    /// One JSON-RPC object, status 200, no content-length carried over.
    pub fn json(body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(headers::APPLICATION_JSON_UTF8));
        Self {
            status: 200,
            headers,
            body: body.into(),
        }
    }

    /// Empty 202, used for client notifications.
    pub fn accepted() -> Self {
        Self {
            status: 202,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Abstract non-blocking HTTP client used for every backend call.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Send a request and read the whole response within `timeout`.
    async fn send(&self, request: OutboundRequest, timeout: Duration) -> Result<BackendReply, GatewayError>;

    /// Open a long-lived response stream. `timeout` bounds only the wait
    /// for the response head.
    async fn open_stream(
        &self,
        request: OutboundRequest,
        timeout: Duration,
    ) -> Result<(StreamHead, ByteStream), GatewayError>;
}

/// reqwest-backed [`BackendClient`] with a shared connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    http_client: Client,
}

impl ReqwestBackend {
    pub fn new() -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| GatewayError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    fn request_builder(&self, request: OutboundRequest) -> reqwest::RequestBuilder {
        let builder = match request.method {
            HttpMethod::Get => self.http_client.get(&request.url),
            HttpMethod::Post => self.http_client.post(&request.url),
        };
        let builder = builder.headers(request.headers);
        match request.body {
            Some(body) => builder.body(body),
            None => builder,
        }
    }

    fn map_error(e: reqwest::Error, timeout: Duration) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout(timeout.as_millis() as u64)
        } else if e.is_connect() {
            GatewayError::Transport(format!("Connection failed: {}", e))
        } else {
            GatewayError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl BackendClient for ReqwestBackend {
    async fn send(&self, request: OutboundRequest, timeout: Duration) -> Result<BackendReply, GatewayError> {
        debug!(url = %request.url, method = ?request.method, "Sending backend request");
        let response = self
            .request_builder(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_error(e, timeout))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| Self::map_error(e, timeout))?;
        debug!(status, bytes = body.len(), "Backend response received");

        Ok(BackendReply { status, headers, body })
    }

    async fn open_stream(
        &self,
        request: OutboundRequest,
        timeout: Duration,
    ) -> Result<(StreamHead, ByteStream), GatewayError> {
        debug!(url = %request.url, "Opening backend event stream");
        let response = tokio::time::timeout(timeout, self.request_builder(request).send())
            .await
            .map_err(|_| GatewayError::Timeout(timeout.as_millis() as u64))?
            .map_err(|e| Self::map_error(e, timeout))?;

        let head = StreamHead {
            status: response.status().as_u16(),
            headers: response.headers().clone(),
        };
        let stream = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| Self::map_error(e, timeout)))
            .boxed();
        Ok((head, stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_reply_json() {
        let reply = ClientReply::json(b"{}".to_vec());
        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.headers.get("content-type").and_then(|v| v.to_str().ok()),
            Some("application/json; charset=utf-8")
        );
        assert!(!reply.headers.contains_key("content-length"));
    }

    #[test]
    fn test_content_type_ignores_opaque_values() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_bytes(b"text/\xfe").unwrap());
        let reply = BackendReply {
            status: 200,
            headers,
            body: Bytes::new(),
        };
        assert_eq!(reply.content_type(), None);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = ReqwestBackend::new().unwrap();
        let err = client
            .send(
                OutboundRequest::post("http://127.0.0.1:1/mcp", HeaderMap::new(), "{}"),
                Duration::from_millis(500),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), -32603);
    }
}
