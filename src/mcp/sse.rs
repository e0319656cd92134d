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

//! Server-Sent-Events frame reassembly.
//!
//! [`parse_next`] pulls one complete message off the front of a byte buffer
//! that may end mid-line or mid-message. [`SseDecoder`] is the streaming
//! form: a `tokio_util` decoder that keeps the message in progress between
//! chunks so a long stream is scanned in one pass.

use crate::engine_core::constants::limits;
use crate::engine_core::errors::{GatewayError, SseError};
use bytes::BytesMut;
use serde::Deserialize;
use tokio_util::codec::Decoder;
use tracing::trace;
use url::Url;

/// One reassembled SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseMessage {
    pub event: String,
    pub data: String,
    pub id: String,
}

impl SseMessage {
    fn is_started(&self) -> bool {
        !self.event.is_empty() || !self.data.is_empty() || !self.id.is_empty()
    }
}

/// Size caps for one call's SSE stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SseLimits {
    /// Longest single unterminated line
    pub max_line_bytes: usize,
    /// Largest receive buffer across the life of one call
    pub max_buffer_bytes: usize,
}

impl Default for SseLimits {
    fn default() -> Self {
        Self {
            max_line_bytes: limits::MAX_SSE_LINE_BYTES,
            max_buffer_bytes: limits::MAX_SSE_BUFFER_BYTES,
        }
    }
}

/// Split the next `\n`-terminated line (without `\r\n`/`\n`) off `input`.
/// `None` when no terminator has arrived yet.
fn next_line(input: &[u8], max_line: usize) -> Result<Option<(&[u8], usize)>, SseError> {
    match input.iter().position(|&b| b == b'\n') {
        Some(nl) if nl > max_line => Err(SseError::LineTooLong { limit: max_line }),
        Some(nl) => {
            let line = input[..nl].strip_suffix(b"\r").unwrap_or(&input[..nl]);
            Ok(Some((line, nl + 1)))
        }
        None if input.len() > max_line => Err(SseError::LineTooLong { limit: max_line }),
        None => Ok(None),
    }
}

/// Fold one line (terminator already stripped) into `msg`. True when it is
/// the blank line that closes a started message.
fn fold_line(msg: &mut SseMessage, line: &[u8]) -> bool {
    let text = String::from_utf8_lossy(line);
    if text.trim().is_empty() {
        return msg.is_started();
    }
    if text.starts_with(':') {
        return false;
    }
    let Some((field, value)) = text.split_once(':') else {
        return false;
    };
    let value = value.trim();
    match field {
        "event" => msg.event = value.to_string(),
        "data" => {
            if !msg.data.is_empty() {
                msg.data.push('\n');
            }
            msg.data.push_str(value);
        }
        "id" => msg.id = value.to_string(),
        _ => {}
    }
    false
}

/// Parse the next complete message from `input` with the default line cap.
pub fn parse_next(input: &[u8]) -> Result<(Option<SseMessage>, &[u8]), SseError> {
    parse_next_with_limit(input, limits::MAX_SSE_LINE_BYTES)
}

/// Parse the next complete message from `input`.
///
/// Returns the message and the bytes after its terminating blank line, or
/// `(None, input)` unchanged when the message is not complete yet.
pub fn parse_next_with_limit(
    input: &[u8],
    max_line: usize,
) -> Result<(Option<SseMessage>, &[u8]), SseError> {
    let mut msg = SseMessage::default();
    let mut pos = 0;

    while let Some((line, advance)) = next_line(&input[pos..], max_line)? {
        pos += advance;
        if fold_line(&mut msg, line) {
            return Ok((Some(msg), &input[pos..]));
        }
    }

    Ok((None, input))
}

/// Payload of the first `data:` line of a single-shot SSE body.
pub fn extract_first_data(body: &[u8]) -> Result<String, SseError> {
    let mut pos = 0;
    loop {
        let (line, advance) = match next_line(&body[pos..], limits::MAX_SSE_LINE_BYTES)? {
            Some(found) => found,
            // a final line without a newline still counts
            None if pos < body.len() => (&body[pos..], body.len() - pos),
            None => return Err(SseError::MissingData),
        };
        pos += advance;

        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() || text.starts_with(':') {
            continue;
        }
        if let Some(data) = text.strip_prefix("data:") {
            return Ok(data.trim().to_string());
        }
    }
}

fn has_http_scheme(value: &str) -> bool {
    let lower = value.get(..8).unwrap_or(value).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolve the value of an `endpoint` event against the SSE URL.
///
/// Absolute URLs are returned verbatim. Paths are joined to the scheme and
/// authority of `base_url`; when `base_url` is itself only a path the value
/// is returned unchanged.
pub fn extract_endpoint_url(path_or_url: &str, base_url: &str) -> Result<String, GatewayError> {
    if has_http_scheme(path_or_url) {
        return Ok(path_or_url.to_string());
    }

    let base = match Url::parse(base_url) {
        Ok(base) => base,
        Err(url::ParseError::RelativeUrlWithoutBase) => return Ok(path_or_url.to_string()),
        Err(e) => {
            return Err(GatewayError::backend(format!("failed to parse base URL: {}", e)));
        }
    };

    let Some(host) = base.host_str() else {
        return Ok(path_or_url.to_string());
    };
    let authority = match base.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let path = if path_or_url.starts_with('/') {
        path_or_url.to_string()
    } else {
        format!("/{}", path_or_url)
    };
    Ok(format!("{}://{}{}", base.scheme(), authority, path))
}

/// Frames SSE messages out of a growing receive buffer.
///
/// Complete lines are taken off the buffer as soon as they arrive and folded
/// into the message in progress, which the decoder keeps between calls.
/// Only an unterminated tail stays buffered, and the part of it already
/// searched for a newline is not searched again.
#[derive(Debug, Clone)]
pub struct SseDecoder {
    max_line_bytes: usize,
    partial: SseMessage,
    /// Raw size of the lines folded into `partial`
    partial_bytes: usize,
    /// Length of the buffered tail known to hold no newline
    scanned: usize,
}

impl SseDecoder {
    pub fn new(limits: SseLimits) -> Self {
        Self {
            max_line_bytes: limits.max_line_bytes,
            partial: SseMessage::default(),
            partial_bytes: 0,
            scanned: 0,
        }
    }

    /// Bytes already taken off the buffer for the message in progress.
    pub fn pending_bytes(&self) -> usize {
        self.partial_bytes
    }

    fn line_too_long(&self) -> SseError {
        SseError::LineTooLong {
            limit: self.max_line_bytes,
        }
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new(SseLimits::default())
    }
}

impl Decoder for SseDecoder {
    type Item = SseMessage;
    type Error = SseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<SseMessage>, SseError> {
        loop {
            let scanned = self.scanned.min(src.len());
            let Some(offset) = src[scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = src.len();
                if src.len() > self.max_line_bytes {
                    return Err(self.line_too_long());
                }
                return Ok(None);
            };
            let nl = scanned + offset;
            if nl > self.max_line_bytes {
                return Err(self.line_too_long());
            }

            self.scanned = 0;
            let raw = src.split_to(nl + 1);
            let line = raw[..nl].strip_suffix(b"\r").unwrap_or(&raw[..nl]);
            self.partial_bytes += raw.len();

            if fold_line(&mut self.partial, line) {
                let msg = std::mem::take(&mut self.partial);
                trace!(event = %msg.event, consumed = self.partial_bytes, "Decoded SSE message");
                self.partial_bytes = 0;
                return Ok(Some(msg));
            }
            if !self.partial.is_started() {
                // blank lines and comments between messages
                self.partial_bytes = 0;
            }
        }
    }
}
