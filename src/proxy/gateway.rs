// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Authenticated request forwarding
//!
//! Requests from the unprivileged side are sent by the privileged side with
//! the current bearer token and the shared refresh-once-on-401 contract.
//! Only requests to the backend origin carry the token.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::auth::{AuthOutcome, AuthorizedSender, CredentialStore};
use crate::error::{Error, Result};
use crate::http::{self, Request, Response};
use crate::stats::RequestStats;

/// Caller-supplied request options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyOptions {
    /// HTTP method, GET when absent
    pub method: Option<String>,
    /// Extra request headers
    pub headers: HashMap<String, String>,
    /// JSON body; a string is sent as-is
    pub body: Option<Value>,
}

impl ProxyOptions {
    /// GET with no headers
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the method
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the body
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A request being forwarded
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub request_id: String,
    /// Absolute URL
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    /// Set once the request has been re-sent after a refresh
    pub retried: bool,
}

impl ProxyRequest {
    fn to_http(&self) -> Result<Request> {
        let mut request = Request::with_method_name(&self.method, &self.url)?.headers(&self.headers);
        request = match self.body {
            Some(Value::String(ref text)) => request.body(text.clone()),
            Some(ref value) => request.json(value)?,
            None => request,
        };
        Ok(request)
    }
}

/// Result handed back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub success: bool,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProxyResponse {
    fn from_response(response: &Response) -> Self {
        let success = response.is_success();
        Self {
            success,
            status: response.status_code(),
            data: (response.body_len() > 0).then(|| response.decode_body()),
            error: (!success).then(|| format!("HTTP {}", response.status_code())),
        }
    }

    /// Terminal 401; the backend's body is kept when there was a response
    fn auth_expired(response: Option<&Response>) -> Self {
        Self {
            success: false,
            status: 401,
            data: response
                .filter(|r| r.body_len() > 0)
                .map(|r| r.decode_body()),
            error: Some("Authentication expired".to_string()),
        }
    }

    fn network_failure(error: &Error) -> Self {
        Self {
            success: false,
            status: 500,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

/// Forwards requests on behalf of the unprivileged side
#[derive(Clone)]
pub struct ProxyGateway {
    sender: AuthorizedSender,
    credentials: CredentialStore,
    stats: Arc<RequestStats>,
}

impl ProxyGateway {
    /// Create a gateway
    pub fn new(sender: AuthorizedSender, credentials: CredentialStore, stats: Arc<RequestStats>) -> Self {
        Self {
            sender,
            credentials,
            stats,
        }
    }

    /// Forward one request.
    ///
    /// `url` is absolute or a path on the backend host. The only error is a
    /// missing host or an unusable URL or method; every backend or network
    /// outcome is reported in the returned [`ProxyResponse`].
    ///
    /// The bearer token and the refresh-on-401 retry apply only to URLs on
    /// the backend origin. Absolute URLs on any other origin are sent once
    /// without an `Authorization` header, and a 401 from them is returned
    /// as a plain error status.
    pub async fn forward(&self, request_id: &str, url: &str, options: ProxyOptions) -> Result<ProxyResponse> {
        let host = self
            .credentials
            .host()
            .ok_or_else(|| Error::config("No backend host configured"))?;

        let mut request = ProxyRequest {
            request_id: request_id.to_string(),
            url: resolve_url(&host, url)?,
            method: options
                .method
                .unwrap_or_else(|| "GET".to_string())
                .to_ascii_uppercase(),
            headers: options.headers,
            body: options.body,
            retried: false,
        };
        let http_request = request.to_http()?;
        self.stats.record_proxied();

        let response = if same_origin(&host, &request.url) {
            let outcome = self.sender.send(http_request).await;
            request.retried = outcome.retried();
            match outcome {
                AuthOutcome::Completed { response, .. } => ProxyResponse::from_response(&response),
                AuthOutcome::AuthExpired { response, .. } => {
                    self.stats.record_auth_failure();
                    ProxyResponse::auth_expired(response.as_ref())
                }
                AuthOutcome::Failed { error, .. } => ProxyResponse::network_failure(&error),
            }
        } else {
            match self.sender.client().execute(&http_request).await {
                Ok(response) => ProxyResponse::from_response(&response),
                Err(error) => ProxyResponse::network_failure(&error),
            }
        };

        tracing::debug!(
            request_id = %request.request_id,
            method = %request.method,
            url = %request.url,
            status = response.status,
            retried = request.retried,
            "Proxied request"
        );
        Ok(response)
    }
}

fn resolve_url(host: &str, url: &str) -> Result<String> {
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(parsed.to_string()),
        Ok(parsed) => Err(Error::config(format!("Unsupported URL scheme: {}", parsed.scheme()))),
        Err(_) => http::endpoint_url(host, url)
            .map_err(|e| Error::config(format!("Invalid proxy URL {}: {}", url, e))),
    }
}

fn same_origin(host: &str, url: &str) -> bool {
    match (Url::parse(host), Url::parse(url)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => false,
    }
}
