// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Relay configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorContext, Result};
use crate::http::{HttpClientConfig, DEFAULT_USER_AGENT};
use crate::rules::MatcherKind;

/// Refresh endpoint path
pub const SSO_REFRESH_PATH: &str = "/api/v1/user/auth/sso-refresh";
/// Capture rule endpoint path
pub const CAPTURE_RULES_PATH: &str = "/api/system/capture-rules";
/// Upload endpoint path
pub const UPLOAD_PATH: &str = "/api/system/network-data/upload";

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Backend host used when no credential record names one
    pub host: Option<String>,
    /// User agent for backend calls
    pub user_agent: String,
    /// Timeout for upload and proxy calls
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Timeout for one token refresh
    #[serde(with = "duration_secs")]
    pub refresh_timeout: Duration,
    /// Timeout for a bridged round trip
    #[serde(with = "duration_secs")]
    pub bridge_timeout: Duration,
    /// Age after which a pending capture without a response is evicted
    #[serde(with = "duration_secs")]
    pub pending_max_age: Duration,
    /// Interval between capture rule refreshes
    #[serde(with = "duration_secs")]
    pub rule_refresh_interval: Duration,
    /// Maximum request log entries
    pub log_capacity: usize,
    /// Maximum captured body size in bytes
    pub max_body_size: usize,
    /// How capture rule patterns are interpreted
    pub matcher: MatcherKind,
    /// Outbound proxy for backend calls
    pub proxy: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            refresh_timeout: Duration::from_secs(30),
            bridge_timeout: Duration::from_secs(30),
            pending_max_age: Duration::from_secs(60),
            rule_refresh_interval: Duration::from_secs(300),
            log_capacity: 1000,
            max_body_size: 1024 * 1024, // 1MB
            matcher: MatcherKind::Substring,
            proxy: None,
        }
    }
}

impl RelayConfig {
    /// Create a new relay config
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON config file; missing fields take defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).context(&format!("reading config file {}", path.display()))?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `RELAY_HOST` and `RELAY_TIMEOUT_SECS` overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(host) = std::env::var("RELAY_HOST") {
            if !host.trim().is_empty() {
                self.host = Some(host);
            }
        }
        if let Ok(secs) = std::env::var("RELAY_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("RELAY_TIMEOUT_SECS is not a number: {}", secs)))?;
            self.request_timeout = Duration::from_secs(secs);
            self.refresh_timeout = Duration::from_secs(secs);
        }
        self.validate()?;
        Ok(self)
    }

    /// Set backend host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set refresh timeout
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Set bridge round-trip timeout
    pub fn bridge_timeout(mut self, timeout: Duration) -> Self {
        self.bridge_timeout = timeout;
        self
    }

    /// Set pending capture max age
    pub fn pending_max_age(mut self, age: Duration) -> Self {
        self.pending_max_age = age;
        self
    }

    /// Set rule refresh interval
    pub fn rule_refresh_interval(mut self, interval: Duration) -> Self {
        self.rule_refresh_interval = interval;
        self
    }

    /// Set request log capacity
    pub fn log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    /// Set the pattern matcher
    pub fn matcher(mut self, matcher: MatcherKind) -> Self {
        self.matcher = matcher;
        self
    }

    /// Reject values that would make the relay unusable
    pub fn validate(&self) -> Result<()> {
        if let Some(ref host) = self.host {
            url::Url::parse(host)
                .map_err(|e| Error::config(format!("Invalid host {:?}: {}", host, e)))?;
        }
        if self.log_capacity == 0 {
            return Err(Error::config("log_capacity must be at least 1"));
        }
        if self.request_timeout.is_zero() || self.refresh_timeout.is_zero() {
            return Err(Error::config("timeouts must be non-zero"));
        }
        Ok(())
    }

    /// HTTP client settings derived from this config
    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            user_agent: self.user_agent.clone(),
            timeout: self.request_timeout,
            proxy: self.proxy.clone(),
            ..Default::default()
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert!(config.host.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.pending_max_age, Duration::from_secs(60));
        assert_eq!(config.matcher, MatcherKind::Substring);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"host": "https://backend.example", "pending_max_age": 5, "matcher": "glob"}}"#
        )
        .unwrap();

        let config = RelayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.host.as_deref(), Some("https://backend.example"));
        assert_eq!(config.pending_max_age, Duration::from_secs(5));
        assert_eq!(config.matcher, MatcherKind::Glob);
        assert_eq!(config.log_capacity, 1000);
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = RelayConfig::from_file("/nonexistent/relay.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/relay.json"));
    }

    #[test]
    fn test_validate_rejects_bad_host() {
        let config = RelayConfig::new().host("not a url");
        assert!(config.validate().unwrap_err().is_config());

        let config = RelayConfig::new().log_capacity(0);
        assert!(config.validate().is_err());
    }
}
