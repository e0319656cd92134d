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

//! Tool allow-list.

use serde_json::Value;
use std::collections::HashSet;

/// Names of the tools a call may see or invoke.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    names: HashSet<String>,
}

impl AllowList {
    pub fn allows(&self, tool: &str) -> bool {
        self.names.contains(tool)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Drop every entry of `result.tools` whose name is not allowed.
    /// Returns the number of tools removed.
    pub fn filter_tools_result(&self, result: &mut Value) -> usize {
        let Some(tools) = result.get_mut("tools").and_then(Value::as_array_mut) else {
            return 0;
        };
        let before = tools.len();
        tools.retain(|tool| {
            tool.get("name")
                .and_then(Value::as_str)
                .is_some_and(|name| self.allows(name))
        });
        before - tools.len()
    }
}

impl<S: Into<String>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        AllowList {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

fn parse_header(value: &str) -> AllowList {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Combine the configured list with the per-request header.
///
/// Both present: intersection. One present: that one. Neither: `None`,
/// meaning unrestricted. A blank header value counts as absent, since a
/// proxy in front cannot tell an empty header from a missing one.
pub fn effective_allow_list(configured: Option<&[String]>, header: Option<&str>) -> Option<AllowList> {
    let header = header.filter(|h| !h.trim().is_empty()).map(parse_header);
    match (configured, header) {
        (None, None) => None,
        (Some(cfg), None) => Some(cfg.iter().cloned().collect()),
        (None, Some(hdr)) => Some(hdr),
        (Some(cfg), Some(hdr)) => Some(cfg.iter().filter(|t| hdr.allows(t)).cloned().collect()),
    }
}
