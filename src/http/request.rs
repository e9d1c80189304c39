// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! HTTP request types

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use url::Url;

use super::headers;
use crate::error::{Error, Result};

/// HTTP request representation
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method
    pub method: Method,
    /// Request URL
    pub url: Url,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Option<Bytes>,
    /// Request timeout (falls back to the client timeout)
    pub timeout: Option<Duration>,
}

impl Request {
    /// Create a new request with arbitrary method
    pub fn new(method: Method, url: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            method,
            url: Url::parse(url.as_ref())?,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        })
    }

    /// Create a new GET request
    pub fn get(url: impl AsRef<str>) -> Result<Self> {
        Self::new(Method::GET, url)
    }

    /// Create a new POST request
    pub fn post(url: impl AsRef<str>) -> Result<Self> {
        Self::new(Method::POST, url)
    }

    /// Create a request from a method name such as `"patch"`
    pub fn with_method_name(method: &str, url: impl AsRef<str>) -> Result<Self> {
        let method = Method::from_bytes(method.trim().to_uppercase().as_bytes())
            .map_err(|_| Error::config(format!("Invalid HTTP method: {}", method)))?;
        Self::new(method, url)
    }

    /// Set a header, silently skipping names or values that are not valid HTTP
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set multiple headers
    pub fn headers(mut self, headers: &HashMap<String, String>) -> Self {
        for (name, value) in headers {
            self = self.header(name, value);
        }
        self
    }

    /// Set (or replace) the bearer authorization header
    pub fn bearer(mut self, token: &str) -> Self {
        self.set_bearer(token);
        self
    }

    /// Replace the bearer authorization header in place
    pub fn set_bearer(&mut self, token: &str) {
        match HeaderValue::try_from(super::bearer(token)) {
            Ok(value) => {
                self.headers.insert(headers::AUTHORIZATION, value);
            }
            Err(_) => {
                self.headers.remove(headers::AUTHORIZATION);
            }
        }
    }

    /// Drop the authorization header
    pub fn clear_bearer(&mut self) {
        self.headers.remove(headers::AUTHORIZATION);
    }

    /// Set the request body
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set JSON body
    pub fn json<T: Serialize>(mut self, data: &T) -> Result<Self> {
        let json = serde_json::to_vec(data)?;
        self.body = Some(Bytes::from(json));
        Ok(self.header(headers::CONTENT_TYPE, "application/json"))
    }

    /// Set timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the URL as string
    pub fn url_str(&self) -> &str {
        self.url.as_str()
    }

    /// Current authorization header value, if any
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(headers::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }
}
