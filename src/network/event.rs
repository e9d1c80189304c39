// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Captured traffic event

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::raw::{ObservationSource, RawRequest, RawResponse};
use crate::rules::CaptureRule;

/// Canonical request/response pair sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    /// Correlation id
    pub request_id: String,
    /// Request URL
    pub url: String,
    /// HTTP method, uppercased
    pub method: String,
    /// Request headers (lowercased names)
    pub request_headers: HashMap<String, String>,
    /// Request body (may be truncated)
    pub request_body: Option<String>,
    /// Status code once a response was seen
    pub status_code: Option<u16>,
    /// Response headers (lowercased names)
    pub response_headers: HashMap<String, String>,
    /// Response body (may be truncated)
    pub response_body: Option<String>,
    /// Observation time of the request
    pub timestamp: DateTime<Utc>,
    /// Rule that selected this event
    pub matched_rule_name: Option<String>,
    /// Data type copied from the matched rule
    pub data_type: Option<String>,
    /// Hook that produced the observation
    pub source: ObservationSource,
}

impl CapturedEvent {
    /// Build the request half of an event
    pub fn from_request(request_id: impl Into<String>, raw: &RawRequest, max_body_size: usize) -> Self {
        let method = raw
            .method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
            .to_ascii_uppercase();

        Self {
            request_id: request_id.into(),
            url: raw.url.clone(),
            method,
            request_headers: raw.headers.normalize(),
            request_body: raw.body.to_text(max_body_size),
            status_code: None,
            response_headers: HashMap::new(),
            response_body: None,
            timestamp: Utc::now(),
            matched_rule_name: None,
            data_type: None,
            source: raw.source,
        }
    }

    /// Minimal event for a response whose request was never observed
    pub fn from_response(request_id: impl Into<String>, raw: &RawResponse, max_body_size: usize) -> Self {
        let mut event = Self {
            request_id: request_id.into(),
            url: raw.url.clone().unwrap_or_default(),
            method: "GET".to_string(),
            request_headers: HashMap::new(),
            request_body: None,
            status_code: None,
            response_headers: HashMap::new(),
            response_body: None,
            timestamp: Utc::now(),
            matched_rule_name: None,
            data_type: None,
            source: raw.source,
        };
        event.apply_response(raw, max_body_size);
        event
    }

    /// Fill in the response half
    pub fn apply_response(&mut self, raw: &RawResponse, max_body_size: usize) {
        self.status_code = Some(raw.status);
        self.response_headers = raw.headers.normalize();
        self.response_body = raw.body.to_text(max_body_size);
        if self.url.is_empty() {
            if let Some(ref url) = raw.url {
                self.url = url.clone();
            }
        }
    }

    /// Tag with the rule that matched
    pub fn with_rule(mut self, rule: &CaptureRule) -> Self {
        self.matched_rule_name = Some(rule.name.clone());
        self.data_type = Some(rule.data_type.clone()).filter(|t| !t.is_empty());
        self
    }

    /// Whether a response has been attached
    pub fn has_response(&self) -> bool {
        self.status_code.is_some()
    }

    /// Whether the response status is 2xx
    pub fn is_success(&self) -> bool {
        self.status_code.map(|s| (200..300).contains(&s)).unwrap_or(false)
    }

    /// Host part of the URL
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
    }
}
