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

//! Credential translation between the downstream and upstream legs.

use crate::auth::scheme::{ApiKeyLocation, HttpAuthScheme, SchemeKind, SchemeRegistry, SecurityRequirement, SecurityScheme};
use crate::engine_core::errors::AuthError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::header::{AsHeaderName, AUTHORIZATION};
use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;
use url::Url;

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value.len() >= prefix.len()
        && value.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Remove every value of `name`, returning the first one as text.
fn take_header<K: AsHeaderName>(headers: &mut HeaderMap, name: K) -> Option<String> {
    headers
        .remove(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

/// Pull the client credential for `scheme` out of the inbound request.
///
/// Header credentials are removed from `headers`. The Authorization header
/// is removed even when it has the wrong shape for the scheme, in which
/// case the error is returned. Query credentials are read from `path` and
/// left in place. `Ok(None)` means the credential is simply absent.
pub fn extract_and_strip_downstream(
    scheme: &SecurityScheme,
    headers: &mut HeaderMap,
    path: &str,
) -> Result<Option<String>, AuthError> {
    match &scheme.kind {
        SchemeKind::Http(http) => {
            let Some(value) = take_header(headers, AUTHORIZATION) else {
                return Ok(None);
            };
            if value.is_empty() {
                return Ok(None);
            }
            if !starts_with_ignore_case(&value, http.prefix()) {
                return Err(AuthError::SchemeMismatch { expected: http.label() });
            }
            let token = value[http.prefix().len()..].trim();
            Ok((!token.is_empty()).then(|| token.to_string()))
        }
        SchemeKind::ApiKey { location: ApiKeyLocation::Header, name } => {
            Ok(take_header(headers, name.as_str()).filter(|v| !v.is_empty()))
        }
        SchemeKind::ApiKey { location: ApiKeyLocation::Query, name } => {
            let Some((_, query)) = path.split_once('?') else {
                return Ok(None);
            };
            Ok(url::form_urlencoded::parse(query.as_bytes())
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .filter(|v| !v.is_empty()))
        }
    }
}

/// Pick the credential for an upstream requirement:
/// passthrough > requirement override > scheme default.
fn select_credential<'a>(
    scheme: &'a SecurityScheme,
    requirement: &'a SecurityRequirement,
    passthrough: Option<&'a str>,
) -> Result<(&'a str, bool), AuthError> {
    if let Some(c) = passthrough.filter(|c| !c.is_empty()) {
        return Ok((c, true));
    }
    if let Some(c) = requirement.credential.as_deref().filter(|c| !c.is_empty()) {
        return Ok((c, false));
    }
    if let Some(c) = scheme.default_credential.as_deref() {
        return Ok((c, false));
    }
    Err(AuthError::MissingCredential(scheme.id.clone()))
}

fn basic_value(credential: &str, from_passthrough: bool) -> String {
    if starts_with_ignore_case(credential, HttpAuthScheme::Basic.prefix()) {
        credential.to_string()
    } else if from_passthrough || !credential.contains(':') {
        // already a base64 token
        format!("{}{}", HttpAuthScheme::Basic.prefix(), credential)
    } else {
        format!("{}{}", HttpAuthScheme::Basic.prefix(), STANDARD.encode(credential))
    }
}

fn bearer_value(credential: &str) -> String {
    if starts_with_ignore_case(credential, HttpAuthScheme::Bearer.prefix()) {
        credential.to_string()
    } else {
        format!("{}{}", HttpAuthScheme::Bearer.prefix(), credential)
    }
}

/// Set `name`, replacing any existing values. Credentials are marked
/// sensitive so they stay out of `Debug` output.
fn set_credential(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), AuthError> {
    let mut value = HeaderValue::from_str(value).map_err(|_| AuthError::InvalidHeader {
        name: name.to_string(),
    })?;
    value.set_sensitive(true);
    headers.insert(name, value);
    Ok(())
}

fn set_query_param(target: &str, name: &str, value: &str) -> Result<String, AuthError> {
    let mut url = Url::parse(target).map_err(|e| AuthError::InvalidUrl {
        url: target.to_string(),
        reason: e.to_string(),
    })?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(name, value);
    Ok(url.into())
}

/// Apply an upstream requirement to an outbound request. Returns the
/// (possibly rewritten) target URL.
pub fn apply_upstream(
    registry: &SchemeRegistry,
    requirement: &SecurityRequirement,
    passthrough: Option<&str>,
    headers: &mut HeaderMap,
    url: &str,
) -> Result<String, AuthError> {
    let scheme = registry.resolve(&requirement.scheme_id)?;
    let (credential, from_passthrough) = select_credential(scheme, requirement, passthrough)?;
    debug!(scheme = %scheme.id, passthrough = from_passthrough, "Applying upstream credential");

    match &scheme.kind {
        SchemeKind::Http(HttpAuthScheme::Bearer) => {
            set_credential(headers, AUTHORIZATION, &bearer_value(credential))?;
            Ok(url.to_string())
        }
        SchemeKind::Http(HttpAuthScheme::Basic) => {
            set_credential(headers, AUTHORIZATION, &basic_value(credential, from_passthrough))?;
            Ok(url.to_string())
        }
        SchemeKind::ApiKey { location: ApiKeyLocation::Header, name } => {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| AuthError::InvalidHeader { name: name.clone() })?;
            set_credential(headers, header, credential)?;
            Ok(url.to_string())
        }
        SchemeKind::ApiKey { location: ApiKeyLocation::Query, name } => {
            set_query_param(url, name, credential)
        }
    }
}

/// Policy when no requirement applies: drop the client Authorization
/// header unless `always_passthrough`. Returns true if a header was removed.
pub fn strip_unsecured(headers: &mut HeaderMap, always_passthrough: bool) -> bool {
    if always_passthrough {
        return false;
    }
    take_header(headers, AUTHORIZATION).is_some()
}
