// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Credential state and its durable store

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{self, StateStore, CREDENTIALS_KEY};

/// Backend host plus the access/refresh token pair.
///
/// Both tokens are set or both are empty; a half-set pair is treated as
/// logged out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialState {
    #[serde(default)]
    pub host: String,
    #[serde(default, alias = "accessToken")]
    pub access_token: String,
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: String,
}

impl CredentialState {
    /// Create a state, normalizing a half-set token pair to logged out
    pub fn new(
        host: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
        .normalized()
    }

    /// Logged-out state for a host
    pub fn logged_out(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Clear both tokens if only one of them is set
    pub fn normalized(mut self) -> Self {
        if self.access_token.is_empty() != self.refresh_token.is_empty() {
            self.access_token.clear();
            self.refresh_token.clear();
        }
        self
    }

    /// Both tokens present
    pub fn is_logged_in(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }

    /// Host, if configured
    pub fn host(&self) -> Option<&str> {
        let host = self.host.trim();
        (!host.is_empty()).then_some(host)
    }

    /// Access token, if logged in
    pub fn access_token(&self) -> Option<&str> {
        self.is_logged_in().then_some(self.access_token.as_str())
    }

    /// Refresh token, if logged in
    pub fn refresh_token(&self) -> Option<&str> {
        self.is_logged_in().then_some(self.refresh_token.as_str())
    }
}

/// Credential change callback type
pub type CredentialCallback = Arc<dyn Fn(&CredentialState) + Send + Sync>;

struct Inner {
    state: RwLock<CredentialState>,
    store: Arc<dyn StateStore>,
    default_host: Option<String>,
    observers: RwLock<Vec<CredentialCallback>>,
}

/// In-memory credential copy backed by durable storage.
///
/// The in-memory value is authoritative for the process lifetime: a failed
/// persist is reported but not rolled back.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

impl CredentialStore {
    /// Create a logged-out store; `default_host` fills in records without a host
    pub fn new(store: Arc<dyn StateStore>, default_host: Option<String>) -> Self {
        let state = CredentialState::logged_out(default_host.clone().unwrap_or_default());
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(state),
                store,
                default_host,
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Restore the persisted record. A corrupt record loads as logged out.
    pub async fn load(&self) -> Result<CredentialState> {
        let loaded = match storage::load_as::<CredentialState>(self.inner.store.as_ref(), CREDENTIALS_KEY).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable credential record");
                None
            }
        };

        if let Some(state) = loaded {
            let state = self.fill_host(state.normalized());
            *self.inner.state.write() = state.clone();
            tracing::debug!(logged_in = state.is_logged_in(), "Credentials restored");
        }
        Ok(self.get())
    }

    /// Current credentials
    pub fn get(&self) -> CredentialState {
        self.inner.state.read().clone()
    }

    /// Current host, if any
    pub fn host(&self) -> Option<String> {
        self.inner.state.read().host().map(String::from)
    }

    /// Whether both tokens are present
    pub fn is_logged_in(&self) -> bool {
        self.inner.state.read().is_logged_in()
    }

    /// Replace the credentials, notify observers and persist.
    ///
    /// Only the refresh coordinator and explicit login/logout call this.
    pub async fn set(&self, state: CredentialState) -> Result<()> {
        let state = self.fill_host(state.normalized());
        *self.inner.state.write() = state.clone();
        self.notify(&state);
        storage::save_as(self.inner.store.as_ref(), CREDENTIALS_KEY, &state).await
    }

    /// Drop both tokens, keeping the host
    pub async fn clear(&self) -> Result<()> {
        let host = self.inner.state.read().host.clone();
        self.set(CredentialState::logged_out(host)).await
    }

    /// Register a change observer
    pub fn subscribe(&self, callback: CredentialCallback) {
        self.inner.observers.write().push(callback);
    }

    fn fill_host(&self, mut state: CredentialState) -> CredentialState {
        if state.host().is_none() {
            if let Some(ref host) = self.inner.default_host {
                state.host = host.clone();
            }
        }
        state
    }

    fn notify(&self, state: &CredentialState) {
        let observers = self.inner.observers.read().clone();
        for observer in observers {
            observer(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::{ChangeCallback, MemoryStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;

    struct BrokenStore;

    #[async_trait]
    impl StateStore for BrokenStore {
        async fn load(&self, _key: &str) -> Result<Option<Value>> {
            Err(Error::storage("disk gone"))
        }

        async fn save(&self, _key: &str, _value: &Value) -> Result<()> {
            Err(Error::storage("disk gone"))
        }

        async fn remove(&self, _key: &str) -> Result<()> {
            Err(Error::storage("disk gone"))
        }

        fn subscribe(&self, _callback: ChangeCallback) {}
    }

    #[test]
    fn test_partial_state_is_logged_out() {
        let state = CredentialState::new("https://h", "at", "");
        assert!(!state.is_logged_in());
        assert!(state.access_token.is_empty());
        assert!(state.refresh_token.is_empty());
        assert_eq!(state.host(), Some("https://h"));

        let state = CredentialState::new("https://h", "at", "rt");
        assert_eq!(state.access_token(), Some("at"));
        assert_eq!(state.refresh_token(), Some("rt"));
    }

    #[tokio::test]
    async fn test_set_persists_and_notifies() {
        let store = Arc::new(MemoryStore::new());
        let creds = CredentialStore::new(store.clone(), Some("https://h".into()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        creds.subscribe(Arc::new(move |s: &CredentialState| {
            sink.lock().push(s.clone());
        }));

        creds
            .set(CredentialState::new("", "at", "rt"))
            .await
            .unwrap();

        assert_eq!(creds.get().host, "https://h");
        assert_eq!(seen.lock().len(), 1);

        let reloaded = CredentialStore::new(store, None);
        let state = reloaded.load().await.unwrap();
        assert_eq!(state, CredentialState::new("https://h", "at", "rt"));

        creds.clear().await.unwrap();
        assert!(!creds.is_logged_in());
        assert_eq!(creds.host().as_deref(), Some("https://h"));
        assert_eq!(seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_memory_value() {
        let creds = CredentialStore::new(Arc::new(BrokenStore), Some("https://h".into()));

        let result = creds.set(CredentialState::new("https://h", "at", "rt")).await;
        assert!(result.is_err());
        assert!(creds.is_logged_in());
        assert_eq!(creds.get().access_token, "at");
    }

    #[tokio::test]
    async fn test_load_normalizes_partial_record() {
        let store = Arc::new(MemoryStore::new());
        store
            .save(
                CREDENTIALS_KEY,
                &serde_json::json!({"host": "https://h", "accessToken": "at"}),
            )
            .await
            .unwrap();

        let creds = CredentialStore::new(store, None);
        let state = creds.load().await.unwrap();
        assert!(!state.is_logged_in());
        assert!(state.access_token.is_empty());
        assert_eq!(state.host(), Some("https://h"));
    }

    #[tokio::test]
    async fn test_load_survives_broken_store() {
        let creds = CredentialStore::new(Arc::new(BrokenStore), Some("https://h".into()));
        let state = creds.load().await.unwrap();
        assert!(!state.is_logged_in());
        assert_eq!(state.host(), Some("https://h"));
    }
}
