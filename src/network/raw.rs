// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Raw traffic observations as they arrive from the different hooks
//!
//! Fetch/XHR hooks, web-request listeners and DOM custom events all report
//! traffic in slightly different shapes. These types hold that input
//! unchanged; [`CapturedEvent`](super::CapturedEvent) is the canonical form.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Where an observation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationSource {
    /// Patched `fetch`
    #[default]
    Fetch,
    /// Patched `XMLHttpRequest`
    Xhr,
    /// Privileged web-request listener
    WebRequest,
    /// Page-dispatched custom DOM event
    CustomEvent,
}

/// Headers in whichever shape the hook produced
#[derive(Debug, Clone, PartialEq)]
pub enum RawHeaders {
    /// Name/value map
    Map(HashMap<String, String>),
    /// Ordered pairs, names may repeat
    Pairs(Vec<(String, String)>),
    /// `name: value` lines as returned by `getAllResponseHeaders()`
    Block(String),
}

impl Default for RawHeaders {
    fn default() -> Self {
        RawHeaders::Pairs(Vec::new())
    }
}

impl RawHeaders {
    /// Lowercased names; repeated names are joined with `", "`
    pub fn normalize(&self) -> HashMap<String, String> {
        let pairs: Vec<(String, String)> = match self {
            RawHeaders::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            RawHeaders::Pairs(pairs) => pairs.clone(),
            RawHeaders::Block(block) => block
                .lines()
                .filter_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    Some((name.to_string(), value.trim().to_string()))
                })
                .collect(),
        };

        let mut out: HashMap<String, String> = HashMap::new();
        for (name, value) in pairs {
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                continue;
            }
            out.entry(name)
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        out
    }

    fn from_value(value: Option<&Value>) -> RawHeaders {
        match value {
            Some(Value::Object(map)) => RawHeaders::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), value_to_string(v)))
                    .collect(),
            ),
            Some(Value::Array(items)) => RawHeaders::Pairs(
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Array(pair) if pair.len() == 2 => {
                            Some((value_to_string(&pair[0]), value_to_string(&pair[1])))
                        }
                        _ => None,
                    })
                    .collect(),
            ),
            Some(Value::String(block)) => RawHeaders::Block(block.clone()),
            _ => RawHeaders::default(),
        }
    }
}

/// Body in whichever shape the hook produced
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawBody {
    /// No body
    #[default]
    Empty,
    /// Text body
    Text(String),
    /// Already-parsed JSON body
    Json(Value),
    /// Binary body
    Bytes(Bytes),
}

impl RawBody {
    /// Text form, truncated to `max_len` bytes on a character boundary
    pub fn to_text(&self, max_len: usize) -> Option<String> {
        let text = match self {
            RawBody::Empty => return None,
            RawBody::Text(text) => text.clone(),
            RawBody::Json(value) => value.to_string(),
            RawBody::Bytes(bytes) => {
                String::from_utf8_lossy(&bytes[..bytes.len().min(max_len)]).into_owned()
            }
        };
        Some(truncate_on_char_boundary(text, max_len))
    }

    fn from_value(value: Option<&Value>) -> RawBody {
        match value {
            None | Some(Value::Null) => RawBody::Empty,
            Some(Value::String(text)) => RawBody::Text(text.clone()),
            Some(other) => RawBody::Json(other.clone()),
        }
    }
}

/// An observed outgoing request
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    /// Hook-assigned correlation id, if the hook has one
    pub request_id: Option<String>,
    pub url: String,
    /// Defaults to GET when absent
    pub method: Option<String>,
    pub headers: RawHeaders,
    pub body: RawBody,
    pub source: ObservationSource,
}

impl RawRequest {
    /// Create a request observation
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the correlation id
    pub fn id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Set the method
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Set the headers
    pub fn headers(mut self, headers: RawHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body
    pub fn body(mut self, body: RawBody) -> Self {
        self.body = body;
        self
    }

    /// Set the source
    pub fn source(mut self, source: ObservationSource) -> Self {
        self.source = source;
        self
    }
}

/// An observed response
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// Response URL; used when no matching request was seen
    pub url: Option<String>,
    pub status: u16,
    pub headers: RawHeaders,
    pub body: RawBody,
    pub source: ObservationSource,
}

impl RawResponse {
    /// Create a response observation
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Set the URL
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the headers
    pub fn headers(mut self, headers: RawHeaders) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body
    pub fn body(mut self, body: RawBody) -> Self {
        self.body = body;
        self
    }

    /// Set the source
    pub fn source(mut self, source: ObservationSource) -> Self {
        self.source = source;
        self
    }
}

/// One observation from any hook
#[derive(Debug, Clone)]
pub enum RawObservation {
    Request(RawRequest),
    Response {
        request_id: String,
        response: RawResponse,
    },
}

impl RawObservation {
    /// Parse the `detail` of a page-dispatched custom event.
    ///
    /// Expected shape: `{"type": "request" | "response", "requestId": ..., "url":
    /// ..., "method": ..., "status": ..., "headers": ..., "body": ...}`. Headers
    /// may be an object, a list of pairs or a raw header block.
    pub fn from_custom_event(detail: &Value) -> Result<Self> {
        let obj = detail
            .as_object()
            .ok_or_else(|| Error::other("custom event detail is not an object"))?;

        let kind = obj.get("type").and_then(Value::as_str).unwrap_or("request");
        let request_id = obj
            .get("requestId")
            .or_else(|| obj.get("request_id"))
            .map(value_to_string)
            .filter(|id| !id.is_empty());
        let url = obj.get("url").and_then(Value::as_str).map(String::from);
        let headers = RawHeaders::from_value(obj.get("headers"));
        let body = RawBody::from_value(obj.get("body"));

        match kind {
            "request" => {
                let url = url.ok_or_else(|| Error::other("request event without url"))?;
                Ok(RawObservation::Request(RawRequest {
                    request_id,
                    url,
                    method: obj.get("method").and_then(Value::as_str).map(String::from),
                    headers,
                    body,
                    source: ObservationSource::CustomEvent,
                }))
            }
            "response" => {
                let request_id =
                    request_id.ok_or_else(|| Error::other("response event without requestId"))?;
                let status = obj
                    .get("status")
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok())
                    .unwrap_or(0);
                Ok(RawObservation::Response {
                    request_id,
                    response: RawResponse {
                        url,
                        status,
                        headers,
                        body,
                        source: ObservationSource::CustomEvent,
                    },
                })
            }
            other => Err(Error::other(format!("unknown custom event type: {}", other))),
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truncate_on_char_boundary(mut text: String, max_len: usize) -> String {
    if text.len() > max_len {
        let mut end = max_len;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
