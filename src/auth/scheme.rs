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

//! Security schemes and requirements.
//!
//! Schemes are validated once when the configuration is loaded and then
//! held in an immutable [`SchemeRegistry`]. Requirements refer to schemes
//! by id only.

use crate::engine_core::errors::{AuthError, GatewayError};
use http::HeaderName;
use serde::Deserialize;
use std::collections::HashMap;

/// Where an API key travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Header,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpAuthScheme {
    Basic,
    Bearer,
}

impl HttpAuthScheme {
    /// Authorization header prefix, including the trailing space.
    pub fn prefix(&self) -> &'static str {
        match self {
            HttpAuthScheme::Basic => "Basic ",
            HttpAuthScheme::Bearer => "Bearer ",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HttpAuthScheme::Basic => "Basic",
            HttpAuthScheme::Bearer => "Bearer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemeKind {
    ApiKey { location: ApiKeyLocation, name: String },
    Http(HttpAuthScheme),
}

/// A named credential scheme.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSecurityScheme")]
pub struct SecurityScheme {
    pub id: String,
    pub kind: SchemeKind,
    pub default_credential: Option<String>,
}

/// Scheme as written in configuration, before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSecurityScheme {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    scheme_type: String,
    #[serde(rename = "in", default)]
    location: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    scheme: Option<String>,
    #[serde(default)]
    default_credential: Option<String>,
}

impl TryFrom<RawSecurityScheme> for SecurityScheme {
    type Error = String;

    fn try_from(raw: RawSecurityScheme) -> Result<Self, Self::Error> {
        if raw.id.trim().is_empty() {
            return Err("security scheme id is required".to_string());
        }

        let kind = match raw.scheme_type.to_ascii_lowercase().as_str() {
            "apikey" => {
                let name = raw
                    .name
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| format!("apiKey scheme '{}' requires a name", raw.id))?;
                let location = match raw.location.as_deref().map(str::to_ascii_lowercase).as_deref() {
                    Some("header") => ApiKeyLocation::Header,
                    Some("query") => ApiKeyLocation::Query,
                    Some(other) => {
                        return Err(format!(
                            "apiKey scheme '{}' has unsupported location '{}' (expected header or query)",
                            raw.id, other
                        ))
                    }
                    None => return Err(format!("apiKey scheme '{}' requires 'in'", raw.id)),
                };
                if location == ApiKeyLocation::Header && HeaderName::from_bytes(name.as_bytes()).is_err() {
                    return Err(format!(
                        "apiKey scheme '{}' has invalid header name '{}'",
                        raw.id, name
                    ));
                }
                SchemeKind::ApiKey { location, name }
            }
            "http" => match raw.scheme.as_deref().map(str::to_ascii_lowercase).as_deref() {
                Some("basic") => SchemeKind::Http(HttpAuthScheme::Basic),
                Some("bearer") => SchemeKind::Http(HttpAuthScheme::Bearer),
                Some(other) => {
                    return Err(format!(
                        "http scheme '{}' has unsupported scheme '{}' (expected basic or bearer)",
                        raw.id, other
                    ))
                }
                None => return Err(format!("http scheme '{}' requires 'scheme'", raw.id)),
            },
            other => {
                return Err(format!(
                    "security scheme '{}' has unsupported type '{}' (expected apiKey or http)",
                    raw.id, other
                ))
            }
        };

        Ok(SecurityScheme {
            id: raw.id,
            kind,
            default_credential: raw.default_credential.filter(|c| !c.is_empty()),
        })
    }
}

/// Reference from a tool or server default to a scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SecurityRequirement {
    #[serde(rename = "id")]
    pub scheme_id: String,
    /// Overrides the scheme's default credential
    #[serde(default)]
    pub credential: Option<String>,
    /// Capture the client credential and reuse it upstream
    #[serde(default)]
    pub passthrough: bool,
}

impl SecurityRequirement {
    pub fn new(scheme_id: &str) -> Self {
        Self {
            scheme_id: scheme_id.to_string(),
            ..Default::default()
        }
    }
}

/// Read-only scheme lookup, built once at startup.
#[derive(Debug, Default)]
pub struct SchemeRegistry {
    schemes: HashMap<String, SecurityScheme>,
}

impl SchemeRegistry {
    pub fn new(schemes: impl IntoIterator<Item = SecurityScheme>) -> Result<Self, GatewayError> {
        let mut map = HashMap::new();
        for scheme in schemes {
            if map.contains_key(&scheme.id) {
                return Err(GatewayError::Configuration(format!(
                    "duplicate security scheme id '{}'",
                    scheme.id
                )));
            }
            map.insert(scheme.id.clone(), scheme);
        }
        Ok(Self { schemes: map })
    }

    pub fn get(&self, id: &str) -> Option<&SecurityScheme> {
        self.schemes.get(id)
    }

    pub fn resolve(&self, id: &str) -> Result<&SecurityScheme, AuthError> {
        self.get(id).ok_or_else(|| AuthError::UnknownScheme(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<SecurityScheme, serde_yaml_ng::Error> {
        serde_yaml_ng::from_str(yaml)
    }

    #[test]
    fn test_parse_bearer() {
        let s = parse("{id: Backend, type: http, scheme: Bearer, defaultCredential: tok}").unwrap();
        assert_eq!(s.kind, SchemeKind::Http(HttpAuthScheme::Bearer));
        assert_eq!(s.default_credential.as_deref(), Some("tok"));
    }

    #[test]
    fn test_parse_api_key_query() {
        let s = parse("{id: K, type: apiKey, in: query, name: api_key}").unwrap();
        assert_eq!(
            s.kind,
            SchemeKind::ApiKey { location: ApiKeyLocation::Query, name: "api_key".into() }
        );
        assert_eq!(s.default_credential, None);
    }

    #[test]
    fn test_rejects_invalid_schemes() {
        assert!(parse("{type: http, scheme: bearer}").is_err());
        assert!(parse("{id: A, type: oauth2}").is_err());
        assert!(parse("{id: A, type: apiKey, in: header}").is_err());
        assert!(parse("{id: A, type: apiKey, in: cookie, name: sid}").is_err());
        assert!(parse("{id: A, type: apiKey, in: header, name: 'x key'}").is_err());
        assert!(parse("{id: A, type: http}").is_err());
        assert!(parse("{id: A, type: http, scheme: digest}").is_err());
    }

    #[test]
    fn test_requirement_defaults() {
        let r: SecurityRequirement = serde_yaml_ng::from_str("{id: Backend}").unwrap();
        assert_eq!(r, SecurityRequirement::new("Backend"));
        let r: SecurityRequirement =
            serde_yaml_ng::from_str("{id: Backend, credential: c, passthrough: true}").unwrap();
        assert!(r.passthrough);
        assert_eq!(r.credential.as_deref(), Some("c"));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let a = parse("{id: A, type: http, scheme: basic}").unwrap();
        let err = SchemeRegistry::new(vec![a.clone(), a]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_registry_resolve() {
        let a = parse("{id: A, type: http, scheme: basic}").unwrap();
        let reg = SchemeRegistry::new(vec![a]).unwrap();
        assert!(reg.resolve("A").is_ok());
        assert_eq!(reg.resolve("B").unwrap_err(), AuthError::UnknownScheme("B".into()));
    }
}
