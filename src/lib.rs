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

//! lilith-bridge: an MCP protocol gateway.
//!
//! Accepts `tools/list` and `tools/call` from already-connected clients,
//! performs the backend `initialize` handshake over plain HTTP or an SSE
//! push channel, translates credentials between the client-facing and
//! backend-facing legs, and returns one JSON-RPC response per call.

pub mod auth;
pub mod config;
pub mod engine_core;
pub mod mcp;
pub mod protocol;
