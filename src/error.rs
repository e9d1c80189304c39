// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Error types for the relay
//!
//! One enum covers the whole taxonomy: configuration problems, terminal auth
//! failures, transient network failures, rule fetch failures and the ambient
//! storage/serialization errors. Pipeline operations convert most of these into
//! result values; only configuration errors escape to callers.

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum Error {
    /// No backend host configured, or otherwise unusable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication could not be recovered (refresh rejected or 401 after retry)
    #[error("Authentication expired: {reason}")]
    AuthExpired { reason: String, status: Option<u16> },

    /// HTTP request failed at the transport level
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Network failure that did not come from reqwest
    #[error("Network error: {0}")]
    Network(String),

    /// Operation timed out
    #[error("Operation timed out after {duration_ms}ms: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        url: Option<String>,
    },

    /// Backend answered with a 5xx status
    #[error("Server error {status} from {url}")]
    ServerError { status: u16, url: String },

    /// Backend answered with an unexpected non-2xx status
    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Capture rule list could not be fetched or parsed
    #[error("Rule fetch failed: {0}")]
    RuleFetch(String),

    /// Durable storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cross-context bridge failure (closed channel, rejected reply)
    #[error("Bridge error: {0}")]
    Bridge(String),

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Create an auth-expired error
    pub fn auth_expired(reason: impl Into<String>, status: Option<u16>) -> Self {
        Error::AuthExpired {
            reason: reason.into(),
            status,
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Error::Network(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Error::Timeout {
            operation: operation.into(),
            duration_ms,
            url: None,
        }
    }

    /// Create a timeout error with URL
    pub fn timeout_with_url(
        operation: impl Into<String>,
        duration_ms: u64,
        url: impl Into<String>,
    ) -> Self {
        Error::Timeout {
            operation: operation.into(),
            duration_ms,
            url: Some(url.into()),
        }
    }

    /// Create an error for a non-2xx status, picking the server variant for 5xx
    pub fn from_status(status: u16, url: impl Into<String>) -> Self {
        let url = url.into();
        if (500..600).contains(&status) {
            Error::ServerError { status, url }
        } else {
            Error::UnexpectedStatus { status, url }
        }
    }

    /// Create a rule fetch error
    pub fn rule_fetch<S: Into<String>>(msg: S) -> Self {
        Error::RuleFetch(msg.into())
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a bridge error
    pub fn bridge<S: Into<String>>(msg: S) -> Self {
        Error::Bridge(msg.into())
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Check if this is a terminal auth failure
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Error::AuthExpired { .. })
    }

    /// Transient network failures: timeouts, connection failures, 5xx
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. }
                | Error::Network(_)
                | Error::Http(_)
                | Error::ServerError { .. }
        )
    }

    /// Get HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::AuthExpired { status, .. } => *status,
            Error::ServerError { status, .. } => Some(*status),
            Error::UnexpectedStatus { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Get URL if available
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::Timeout { url: Some(u), .. } => Some(u),
            Error::ServerError { url, .. } => Some(url),
            Error::UnexpectedStatus { url, .. } => Some(url),
            _ => None,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add URL context to error
    fn with_url(self, url: &str) -> Result<T>;

    /// Add operation context to error
    fn context(self, msg: &str) -> Result<T>;
}

impl<T, E: Into<Error>> ErrorContext<T> for std::result::Result<T, E> {
    fn with_url(self, url: &str) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            match err {
                Error::Timeout {
                    operation,
                    duration_ms,
                    ..
                } => Error::Timeout {
                    operation,
                    duration_ms,
                    url: Some(url.to_string()),
                },
                other => other,
            }
        })
    }

    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            Error::Other(format!("{}: {}", msg, err))
        })
    }
}
