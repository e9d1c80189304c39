// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Capture rule registry

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::matcher::PatternMatcher;
use crate::auth::CredentialStore;
use crate::config::CAPTURE_RULES_PATH;
use crate::error::{Error, Result};
use crate::http::{HttpClient, Request};
use crate::storage::{self, StateStore, CAPTURE_RULES_KEY};

/// Backend-supplied capture rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRule {
    /// Rule name, reported with every captured event
    pub name: String,
    /// Pattern tested against request URLs
    pub pattern: String,
    /// Disabled rules never match
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Higher priority rules are tried first
    #[serde(default)]
    pub priority: i64,
    /// Backend data type tag for matched traffic
    #[serde(default)]
    pub data_type: String,
}

fn default_enabled() -> bool {
    true
}

impl CaptureRule {
    /// Create an enabled rule
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, priority: i64) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            enabled: true,
            priority,
            data_type: String::new(),
        }
    }

    /// Set the data type
    pub fn data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    /// Enable or disable
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[derive(Debug, Deserialize)]
struct RulesResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    rules: Vec<CaptureRule>,
    #[serde(default, alias = "error_message")]
    message: Option<String>,
}

/// Holds the current capture rule list and matches URLs against it.
///
/// The list is an immutable `Arc<Vec<_>>` replaced wholesale, so a match
/// always scans one complete list.
pub struct RuleRegistry {
    rules: RwLock<Arc<Vec<CaptureRule>>>,
    matcher: Arc<dyn PatternMatcher>,
    client: HttpClient,
    credentials: CredentialStore,
    store: Arc<dyn StateStore>,
    generation: AtomicU64,
}

impl RuleRegistry {
    /// Create an empty registry
    pub fn new(
        client: HttpClient,
        credentials: CredentialStore,
        store: Arc<dyn StateStore>,
        matcher: Arc<dyn PatternMatcher>,
    ) -> Self {
        Self {
            rules: RwLock::new(Arc::new(Vec::new())),
            matcher,
            client,
            credentials,
            store,
            generation: AtomicU64::new(0),
        }
    }

    /// Current rule snapshot, in match order
    pub fn rules(&self) -> Arc<Vec<CaptureRule>> {
        self.rules.read().clone()
    }

    /// Number of installed rules
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    /// Check if no rules are installed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times the list has been replaced
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// First enabled rule, in priority order, whose pattern matches `url`
    pub fn match_url(&self, url: &str) -> Option<CaptureRule> {
        let rules = self.rules();
        rules
            .iter()
            .find(|rule| rule.enabled && self.matcher.matches(&rule.pattern, url))
            .cloned()
    }

    /// Replace the list. Rules are stable-sorted by descending priority, so
    /// equal priorities keep backend order.
    pub fn install(&self, mut rules: Vec<CaptureRule>) -> usize {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        let count = rules.len();
        let patterns: Vec<&str> = rules.iter().map(|rule| rule.pattern.as_str()).collect();
        self.matcher.retain_patterns(&patterns);
        *self.rules.write() = Arc::new(rules);
        self.generation.fetch_add(1, Ordering::AcqRel);
        count
    }

    /// Restore the list cached by the last refresh
    pub async fn load_cached(&self) -> Result<usize> {
        let cached: Option<Vec<CaptureRule>> =
            storage::load_as(self.store.as_ref(), CAPTURE_RULES_KEY).await?;
        Ok(self.install(cached.unwrap_or_default()))
    }

    /// Fetch the full rule list and replace the current one.
    ///
    /// Any failure installs an empty list, so nothing is captured with stale
    /// rules, and the error is returned.
    pub async fn refresh(&self) -> Result<usize> {
        let result = self.fetch().await;
        let rules = match &result {
            Ok(rules) => rules.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "Capture rule refresh failed, clearing rules");
                Vec::new()
            }
        };

        let count = self.install(rules);
        let snapshot = self.rules();
        if let Err(e) = storage::save_as(self.store.as_ref(), CAPTURE_RULES_KEY, snapshot.as_slice()).await {
            tracing::warn!(error = %e, "Failed to persist capture rules");
        }

        result.map(|_| {
            tracing::info!(rules = count, matcher = self.matcher.name(), "Capture rules refreshed");
            count
        })
    }

    async fn fetch(&self) -> Result<Vec<CaptureRule>> {
        let host = self
            .credentials
            .host()
            .ok_or_else(|| Error::config("No backend host configured"))?;
        let url = crate::http::endpoint_url(&host, CAPTURE_RULES_PATH)?;

        let response = self
            .client
            .execute(&Request::get(&url)?)
            .await
            .map_err(|e| Error::rule_fetch(e.to_string()))?;

        if !response.is_success() {
            return Err(Error::rule_fetch(format!(
                "{} returned {}",
                url,
                response.status_code()
            )));
        }

        let body: RulesResponse = response
            .json()
            .map_err(|e| Error::rule_fetch(format!("Invalid rule list: {}", e)))?;
        if !body.success {
            return Err(Error::rule_fetch(
                body.message
                    .unwrap_or_else(|| "backend reported failure".to_string()),
            ));
        }
        Ok(body.rules)
    }

    /// Refresh on a fixed interval until the handle is aborted
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // Failures are logged by refresh() and leave an empty list
                let _ = self.refresh().await;
            }
        })
    }
}
