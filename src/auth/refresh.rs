// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Single-flight access token refresh
//!
//! The first caller that needs a new token performs the refresh; everyone who
//! asks while it is in flight waits in a FIFO queue and receives the same
//! result. A failed refresh resolves every waiter with `None` rather than an
//! error, clears the credentials and asks the user to log in again.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::oneshot;

use super::credentials::{CredentialState, CredentialStore};
use super::notify::AuthNotifier;
use crate::config::SSO_REFRESH_PATH;
use crate::error::{Error, Result};
use crate::http::{HttpClient, Request};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default, alias = "accessToken")]
    access_token: Option<String>,
    #[serde(default, alias = "refreshToken")]
    refresh_token: Option<String>,
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<oneshot::Sender<Option<String>>>,
}

/// Coordinates access token refreshes across all callers
pub struct RefreshCoordinator {
    client: HttpClient,
    credentials: CredentialStore,
    notifier: AuthNotifier,
    timeout: Duration,
    state: Mutex<RefreshState>,
    refresh_calls: AtomicU64,
}

impl RefreshCoordinator {
    /// Create a coordinator
    pub fn new(
        client: HttpClient,
        credentials: CredentialStore,
        notifier: AuthNotifier,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            credentials,
            notifier,
            timeout,
            state: Mutex::new(RefreshState::default()),
            refresh_calls: AtomicU64::new(0),
        }
    }

    /// Get a fresh access token, sharing any refresh already in flight.
    ///
    /// Resolves to `None` when no usable token can be obtained.
    pub async fn ensure_fresh_token(&self) -> Option<String> {
        // The flag is claimed before the first await so concurrent callers queue
        let waiter = {
            let mut state = self.state.lock();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            } else {
                state.refreshing = true;
                None
            }
        };

        if let Some(rx) = waiter {
            tracing::debug!("Waiting for in-flight token refresh");
            // A dropped sender means the refreshing task was cancelled
            return rx.await.unwrap_or(None);
        }

        let in_flight = InFlight {
            coordinator: self,
            settled: false,
        };
        let token = self.run_refresh().await;
        in_flight.settle(token.clone());
        token
    }

    /// Like [`ensure_fresh_token`](Self::ensure_fresh_token), but skips the
    /// refresh if the current token already differs from the one that was
    /// rejected.
    pub async fn refresh_after(&self, rejected: Option<&str>) -> Option<String> {
        if let Some(current) = self.credentials.get().access_token() {
            if Some(current) != rejected {
                tracing::debug!("Token already refreshed by another caller");
                return Some(current.to_string());
            }
        }
        self.ensure_fresh_token().await
    }

    /// Terminal auth failure: clear both tokens and ask for a new login
    pub async fn invalidate(&self, reason: &str) {
        if let Err(e) = self.credentials.clear().await {
            tracing::error!(error = %e, "Failed to persist cleared credentials");
        }
        self.notifier.reauthentication_required(reason);
    }

    /// Whether a refresh is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    /// Number of callers waiting on the in-flight refresh
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Total refresh calls sent to the backend
    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::Relaxed)
    }

    async fn run_refresh(&self) -> Option<String> {
        let current = self.credentials.get();
        let (host, refresh_token) = match (current.host(), current.refresh_token()) {
            (Some(host), Some(token)) => (host.to_string(), token.to_string()),
            _ => {
                tracing::debug!("No refresh token available, skipping refresh");
                return None;
            }
        };

        self.refresh_calls.fetch_add(1, Ordering::Relaxed);
        tracing::info!(host = %host, "Refreshing access token");

        let result = match tokio::time::timeout(self.timeout, self.request_tokens(&host, &refresh_token)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("token refresh", self.timeout.as_millis() as u64)),
        };

        // Credentials changed underneath us (login/logout): that state wins
        let latest = self.credentials.get();
        if latest.refresh_token() != Some(refresh_token.as_str()) {
            tracing::debug!("Credentials changed during refresh, discarding result");
            return latest.access_token().map(String::from);
        }

        match result {
            Ok((access_token, new_refresh)) => {
                let next_refresh = new_refresh.unwrap_or(refresh_token);
                let state = CredentialState::new(host, access_token.clone(), next_refresh);
                if let Err(e) = self.credentials.set(state).await {
                    tracing::error!(error = %e, "Failed to persist refreshed credentials");
                }
                tracing::info!("Access token refreshed");
                Some(access_token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed");
                self.invalidate(&format!("token refresh failed: {}", e)).await;
                None
            }
        }
    }

    async fn request_tokens(&self, host: &str, refresh_token: &str) -> Result<(String, Option<String>)> {
        let url = crate::http::endpoint_url(host, SSO_REFRESH_PATH)?;
        let request = Request::post(&url)?
            .json(&serde_json::json!({ "refresh_token": refresh_token }))?
            .timeout(self.timeout);

        let response = self.client.execute(&request).await?;
        if response.is_server_error() {
            return Err(Error::from_status(response.status_code(), &url));
        }
        if !response.is_success() {
            return Err(Error::auth_expired(
                format!("refresh rejected with {}", response.status_code()),
                Some(response.status_code()),
            ));
        }

        let body: TokenResponse = response.json()?;
        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::auth_expired("refresh response has no access token", None))?;
        let refresh_token = body.refresh_token.filter(|t| !t.is_empty());
        Ok((access_token, refresh_token))
    }

    /// Release every waiter in enqueue order, then clear the flag
    fn release(&self, token: Option<String>) {
        let mut state = self.state.lock();
        let waiters = std::mem::take(&mut state.waiters);
        let count = waiters.len();
        for waiter in waiters {
            // A waiter that gave up has dropped its receiver
            let _ = waiter.send(token.clone());
        }
        state.refreshing = false;
        if count > 0 {
            tracing::debug!(waiters = count, success = token.is_some(), "Released refresh waiters");
        }
    }
}

/// Owns the refresh flag while a refresh runs. Dropping it unsettled (the
/// refreshing future was cancelled) releases waiters with `None`.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, token: Option<String>) {
        self.settled = true;
        self.coordinator.release(token);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.release(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionEvent;
    use crate::storage::MemoryStore;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        credentials: CredentialStore,
        notifier: AuthNotifier,
        coordinator: Arc<RefreshCoordinator>,
    }

    async fn fixture(host: &str, timeout: Duration) -> Fixture {
        let credentials = CredentialStore::new(Arc::new(MemoryStore::new()), Some(host.to_string()));
        credentials
            .set(CredentialState::new(host, "at1", "rt1"))
            .await
            .unwrap();
        let notifier = AuthNotifier::new();
        let coordinator = Arc::new(RefreshCoordinator::new(
            HttpClient::new().unwrap(),
            credentials.clone(),
            notifier.clone(),
            timeout,
        ));
        Fixture {
            credentials,
            notifier,
            coordinator,
        }
    }

    fn delayed_tokens(at: &str, rt: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({"access_token": at, "refresh_token": rt}))
            .set_delay(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/user/auth/sso-refresh"))
            .and(body_json(serde_json::json!({"refresh_token": "rt1"})))
            .respond_with(delayed_tokens("at2", "rt2"))
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), Duration::from_secs(5)).await;
        let calls = (0..8).map(|_| f.coordinator.ensure_fresh_token());
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.as_deref() == Some("at2")));
        assert_eq!(f.coordinator.refresh_calls(), 1);
        assert!(!f.coordinator.is_refreshing());
        assert_eq!(f.credentials.get(), CredentialState::new(server.uri(), "at2", "rt2"));
    }

    #[tokio::test]
    async fn test_queued_requests_proceed_with_new_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(delayed_tokens("at2", "rt2"))
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), Duration::from_secs(5)).await;

        let leader = {
            let c = f.coordinator.clone();
            tokio::spawn(async move { c.ensure_fresh_token().await })
        };
        while !f.coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }

        let queued: Vec<_> = (0..3)
            .map(|_| {
                let c = f.coordinator.clone();
                tokio::spawn(async move { c.ensure_fresh_token().await })
            })
            .collect();
        while f.coordinator.waiter_count() < 3 {
            tokio::task::yield_now().await;
        }

        assert_eq!(leader.await.unwrap().as_deref(), Some("at2"));
        for handle in queued {
            assert_eq!(handle.await.unwrap().as_deref(), Some("at2"));
        }
        let state = f.credentials.get();
        assert_eq!(state.access_token, "at2");
        assert_eq!(state.refresh_token, "rt2");
    }

    #[tokio::test]
    async fn test_waiters_released_in_fifo_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(delayed_tokens("at2", "rt2"))
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), Duration::from_secs(5)).await;
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..6usize {
            let c = f.coordinator.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                c.ensure_fresh_token().await;
                order.lock().push(i);
            }));
            // Each task reaches the queue before the next is spawned
            while !f.coordinator.is_refreshing() || f.coordinator.waiter_count() < i {
                tokio::task::yield_now().await;
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let order = order.lock().clone();
        let waiters: Vec<_> = order.into_iter().filter(|&i| i != 0).collect();
        assert_eq!(waiters, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_and_notifies_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_delay(Duration::from_millis(100)))
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), Duration::from_secs(5)).await;
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = events.clone();
        f.notifier
            .subscribe(Arc::new(move |e: &SessionEvent| sink.lock().push(e.clone())));

        let results =
            futures::future::join_all((0..4).map(|_| f.coordinator.ensure_fresh_token())).await;

        assert!(results.iter().all(Option::is_none));
        assert!(!f.credentials.is_logged_in());
        assert!(f.credentials.get().access_token.is_empty());
        assert!(f.credentials.get().refresh_token.is_empty());
        assert_eq!(events.lock().len(), 1);
        assert!(matches!(
            events.lock()[0],
            SessionEvent::ReauthenticationRequired { .. }
        ));
    }

    #[tokio::test]
    async fn test_refresh_timeout_counts_as_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(delayed_tokens("at2", "rt2").set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), Duration::from_millis(100)).await;
        assert!(f.coordinator.ensure_fresh_token().await.is_none());
        assert!(!f.credentials.is_logged_in());
        assert!(!f.coordinator.is_refreshing());
        assert_eq!(f.notifier.reauth_count(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), Duration::from_secs(5)).await;
        assert!(f.coordinator.ensure_fresh_token().await.is_none());
        assert!(!f.credentials.is_logged_in());
        assert_eq!(f.notifier.reauth_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), Duration::from_secs(5)).await;
        f.credentials.clear().await.unwrap();

        assert!(f.coordinator.ensure_fresh_token().await.is_none());
        assert_eq!(f.coordinator.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_keeps_refresh_token_when_backend_omits_it() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "at2"})),
            )
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), Duration::from_secs(5)).await;
        assert_eq!(f.coordinator.ensure_fresh_token().await.as_deref(), Some("at2"));
        assert_eq!(f.credentials.get().refresh_token, "rt1");
    }

    #[tokio::test]
    async fn test_refresh_after_skips_when_token_already_rotated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), Duration::from_secs(5)).await;
        let token = f.coordinator.refresh_after(Some("stale")).await;
        assert_eq!(token.as_deref(), Some("at1"));
    }

    #[tokio::test]
    async fn test_cancelled_leader_releases_waiters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(delayed_tokens("at2", "rt2").set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let f = fixture(&server.uri(), Duration::from_secs(30)).await;
        let leader = {
            let c = f.coordinator.clone();
            tokio::spawn(async move { c.ensure_fresh_token().await })
        };
        while !f.coordinator.is_refreshing() {
            tokio::task::yield_now().await;
        }
        let waiter = {
            let c = f.coordinator.clone();
            tokio::spawn(async move { c.ensure_fresh_token().await })
        };
        while f.coordinator.waiter_count() < 1 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        assert!(waiter.await.unwrap().is_none());
        assert!(!f.coordinator.is_refreshing());
    }
}
