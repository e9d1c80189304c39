// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! HTTP transport for backend calls
//!
//! Thin layer over reqwest: owned request/response values, a client with a
//! bounded timeout, and per-request bearer authentication.

mod client;
mod request;
mod response;

pub use client::{HttpClient, HttpClientConfig};
pub use request::Request;
pub use response::Response;

use crate::error::{Error, Result};

/// Default user agent string
pub const DEFAULT_USER_AGENT: &str = concat!("capture-relay/", env!("CARGO_PKG_VERSION"));

/// Common HTTP headers
pub mod headers {
    pub const ACCEPT: &str = "accept";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const AUTHORIZATION: &str = "authorization";
    pub const USER_AGENT: &str = "user-agent";
}

/// Format a bearer authorization value
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Join a backend host and an absolute path, keeping any base path on the host
pub fn endpoint_url(host: &str, path: &str) -> Result<String> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(Error::config("No backend host configured"));
    }
    let url = if path.starts_with('/') {
        format!("{}{}", host, path)
    } else {
        format!("{}/{}", host, path)
    };
    url::Url::parse(&url)?;
    Ok(url)
}
