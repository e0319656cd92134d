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

//! Configuration.
//!
//! [`Config`] holds process settings read from the environment.
//! [`GatewayConfig`] is the backend/security description loaded from YAML
//! once at startup and shared read-only afterwards.

use crate::auth::scheme::{SchemeRegistry, SecurityRequirement, SecurityScheme};
use crate::engine_core::constants::{config as env_keys, limits, protocol};
use crate::engine_core::errors::GatewayError;
use crate::mcp::sse::SseLimits;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gateway_config_path: Option<PathBuf>,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
    pub listen_address: String,
}

impl Config {
    pub fn from_env() -> Result<Self, GatewayError> {
        Ok(Self {
            gateway_config_path: env::var(env_keys::ENV_GATEWAY_CONFIG).ok().map(PathBuf::from),
            log_level: env::var(env_keys::ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string()),
            log_format: env::var(env_keys::ENV_LOG_FORMAT).unwrap_or_else(|_| "text".to_string()),
            listen_address: env::var(env_keys::ENV_LISTEN)
                .unwrap_or_else(|_| env_keys::DEFAULT_LISTEN.to_string()),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_config_path: None,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            listen_address: env_keys::DEFAULT_LISTEN.to_string(),
        }
    }
}

/// How the backend speaks MCP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendTransport {
    /// Request/response POSTs (streamable HTTP)
    #[default]
    Http,
    /// Long-lived event stream plus out-of-band POSTs
    Sse,
}

fn default_server_name() -> String {
    "mcp-backend".to_string()
}

fn default_timeout_ms() -> u64 {
    limits::DEFAULT_TIMEOUT_MS
}

fn default_protocol_version() -> String {
    protocol::DEFAULT_PROTOCOL_VERSION.to_string()
}

fn default_mcp_path() -> String {
    env_keys::DEFAULT_MCP_PATH.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Backend MCP URL (the SSE endpoint when `transport: sse`)
    pub url: String,
    #[serde(default)]
    pub transport: BackendTransport,
    /// Budget per outbound call in milliseconds
    #[serde(default = "default_timeout_ms", rename = "timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Forward the client Authorization header when no security applies
    #[serde(default)]
    pub passthrough_auth_header: bool,
    #[serde(default)]
    pub security_schemes: Vec<SecurityScheme>,
    #[serde(default)]
    pub default_downstream_security: Option<SecurityRequirement>,
    #[serde(default)]
    pub default_upstream_security: Option<SecurityRequirement>,
    #[serde(default)]
    pub sse_limits: SseLimits,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestTemplate {
    /// Upstream (backend-facing) requirement for this tool
    #[serde(default)]
    pub security: Option<SecurityRequirement>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Downstream (client-facing) requirement for this tool
    #[serde(default)]
    pub security: Option<SecurityRequirement>,
    #[serde(default)]
    pub request_template: RequestTemplate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub server: ServerConfig,
    /// Path the front end serves JSON-RPC on
    #[serde(default = "default_mcp_path")]
    pub path: String,
    /// Configured tool allow-list; absent means unrestricted
    #[serde(default)]
    pub allow_tools: Option<Vec<String>>,
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
}

impl GatewayConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(content: &str) -> Result<Self, GatewayError> {
        let config: GatewayConfig = serde_yaml_ng::from_str(content)
            .map_err(|e| GatewayError::Configuration(format!("invalid gateway config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read gateway config {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("failed to load gateway config {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        let url = Url::parse(&self.server.url).map_err(|e| {
            GatewayError::Configuration(format!("server url '{}' is invalid: {}", self.server.url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(GatewayError::Configuration(format!(
                "server url '{}' must be http or https",
                self.server.url
            )));
        }
        if self.server.timeout_ms == 0 {
            return Err(GatewayError::Configuration("server timeout must be greater than 0".to_string()));
        }
        if !self.path.starts_with('/') {
            return Err(GatewayError::Configuration(format!("path '{}' must start with '/'", self.path)));
        }

        let registry = self.scheme_registry()?;
        let check = |req: &SecurityRequirement, owner: &str| -> Result<(), GatewayError> {
            if registry.get(&req.scheme_id).is_none() {
                return Err(GatewayError::Configuration(format!(
                    "{} refers to unknown security scheme '{}'",
                    owner, req.scheme_id
                )));
            }
            Ok(())
        };
        if let Some(req) = &self.server.default_downstream_security {
            check(req, "defaultDownstreamSecurity")?;
        }
        if let Some(req) = &self.server.default_upstream_security {
            check(req, "defaultUpstreamSecurity")?;
        }

        let mut names = HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() {
                return Err(GatewayError::Configuration("tool name is required".to_string()));
            }
            if !names.insert(tool.name.as_str()) {
                return Err(GatewayError::Configuration(format!("duplicate tool '{}'", tool.name)));
            }
            if let Some(req) = &tool.security {
                check(req, &format!("tool '{}' security", tool.name))?;
            }
            if let Some(req) = &tool.request_template.security {
                check(req, &format!("tool '{}' requestTemplate.security", tool.name))?;
            }
        }
        Ok(())
    }

    pub fn scheme_registry(&self) -> Result<SchemeRegistry, GatewayError> {
        SchemeRegistry::new(self.server.security_schemes.iter().cloned())
    }

    pub fn tool(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.server.timeout_ms)
    }
}
