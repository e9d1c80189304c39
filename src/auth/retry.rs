// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Bounded retry on 401 shared by uploads and proxied requests
//!
//! ```text
//! Initial --401--> Refreshing --token--> Retried --401--> TerminalFailure
//!                  Refreshing --none---> TerminalFailure
//! Initial/Retried --other status or transport error--> Done
//! ```
//!
//! Nothing leads back to `Initial`, which caps every request at two sends.

use std::sync::Arc;

use super::credentials::CredentialStore;
use super::refresh::RefreshCoordinator;
use crate::error::Error;
use crate::http::{HttpClient, Request, Response};

/// Retry state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// First send
    Initial,
    /// Waiting for a fresh token
    Refreshing,
    /// Second and last send
    Retried,
    /// Auth could not be recovered
    TerminalFailure,
    /// Finished with a non-401 result
    Done,
}

/// Input to the retry state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    /// Backend answered 401
    Unauthorized,
    /// Backend answered anything else
    Answered,
    /// Transport failure or timeout
    TransportError,
    /// Refresh produced a token
    TokenRefreshed,
    /// Refresh produced nothing
    RefreshFailed,
}

impl RetryState {
    /// Next state. Terminal states absorb every event.
    pub fn next(self, event: RetryEvent) -> RetryState {
        use RetryEvent::*;
        use RetryState::*;

        match (self, event) {
            (Initial, Unauthorized) => Refreshing,
            (Initial, Answered | TransportError) => Done,
            (Refreshing, TokenRefreshed) => Retried,
            (Refreshing, RefreshFailed) => TerminalFailure,
            (Retried, Unauthorized) => TerminalFailure,
            (Retried, Answered | TransportError) => Done,
            (state, _) => state,
        }
    }

    /// No further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, RetryState::TerminalFailure | RetryState::Done)
    }
}

/// Result of an authorized send
#[derive(Debug)]
pub enum AuthOutcome {
    /// Backend answered with something other than an unrecoverable 401
    Completed { response: Response, attempts: u8 },
    /// 401 after retry, or no token could be obtained
    AuthExpired {
        response: Option<Response>,
        attempts: u8,
    },
    /// Transport failure or timeout
    Failed { error: Error, attempts: u8 },
}

impl AuthOutcome {
    /// Requests sent to the backend
    pub fn attempts(&self) -> u8 {
        match self {
            AuthOutcome::Completed { attempts, .. }
            | AuthOutcome::AuthExpired { attempts, .. }
            | AuthOutcome::Failed { attempts, .. } => *attempts,
        }
    }

    /// Whether the request was sent a second time
    pub fn retried(&self) -> bool {
        self.attempts() > 1
    }
}

/// Sends requests with bearer auth, refreshing once on 401
#[derive(Clone)]
pub struct AuthorizedSender {
    client: HttpClient,
    credentials: CredentialStore,
    coordinator: Arc<RefreshCoordinator>,
}

impl AuthorizedSender {
    /// Create a sender
    pub fn new(
        client: HttpClient,
        credentials: CredentialStore,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            client,
            credentials,
            coordinator,
        }
    }

    /// Underlying HTTP client
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Send `request` with the current access token.
    ///
    /// On 401 the token is refreshed through the coordinator and the request
    /// is sent exactly once more. A terminal auth failure clears the
    /// credentials and raises the reauthentication signal before returning.
    pub async fn send(&self, mut request: Request) -> AuthOutcome {
        let mut token = self.credentials.get().access_token().map(String::from);
        match token {
            Some(ref t) => request.set_bearer(t),
            None => request.clear_bearer(),
        }

        let mut state = RetryState::Initial;
        let mut attempts: u8 = 0;
        let mut last_response: Option<Response> = None;

        loop {
            match state {
                RetryState::Initial | RetryState::Retried => {
                    attempts += 1;
                    match self.client.execute(&request).await {
                        Ok(response) if response.is_unauthorized() => {
                            tracing::debug!(url = %request.url, attempt = attempts, "Backend returned 401");
                            state = state.next(RetryEvent::Unauthorized);
                            last_response = Some(response);
                        }
                        Ok(response) => {
                            return AuthOutcome::Completed { response, attempts };
                        }
                        Err(error) => {
                            return AuthOutcome::Failed { error, attempts };
                        }
                    }
                }
                RetryState::Refreshing => {
                    match self.coordinator.refresh_after(token.as_deref()).await {
                        Some(fresh) => {
                            request.set_bearer(&fresh);
                            token = Some(fresh);
                            state = state.next(RetryEvent::TokenRefreshed);
                        }
                        None => {
                            state = state.next(RetryEvent::RefreshFailed);
                        }
                    }
                }
                RetryState::TerminalFailure => {
                    tracing::warn!(url = %request.url, attempts, "Authentication could not be recovered");
                    self.coordinator
                        .invalidate("backend rejected credentials after refresh")
                        .await;
                    return AuthOutcome::AuthExpired {
                        response: last_response,
                        attempts,
                    };
                }
                RetryState::Done => {
                    // Completed and failed sends return directly above
                    return AuthOutcome::Failed {
                        error: Error::other("retry loop finished without a result"),
                        attempts,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthNotifier, CredentialState};
    use crate::storage::MemoryStore;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn sender(host: &str) -> (AuthorizedSender, CredentialStore, AuthNotifier) {
        let credentials = CredentialStore::new(Arc::new(MemoryStore::new()), None);
        credentials
            .set(CredentialState::new(host, "at1", "rt1"))
            .await
            .unwrap();
        let notifier = AuthNotifier::new();
        let client = HttpClient::new().unwrap();
        let coordinator = Arc::new(RefreshCoordinator::new(
            client.clone(),
            credentials.clone(),
            notifier.clone(),
            Duration::from_secs(5),
        ));
        (
            AuthorizedSender::new(client, credentials.clone(), coordinator),
            credentials,
            notifier,
        )
    }

    #[test]
    fn test_transitions() {
        use RetryEvent::*;
        use RetryState::*;

        assert_eq!(Initial.next(Unauthorized), Refreshing);
        assert_eq!(Initial.next(Answered), Done);
        assert_eq!(Initial.next(TransportError), Done);
        assert_eq!(Refreshing.next(TokenRefreshed), Retried);
        assert_eq!(Refreshing.next(RefreshFailed), TerminalFailure);
        assert_eq!(Retried.next(Unauthorized), TerminalFailure);
        assert_eq!(Retried.next(Answered), Done);
        assert_eq!(TerminalFailure.next(TokenRefreshed), TerminalFailure);
        assert_eq!(Done.next(Unauthorized), Done);
    }

    #[test]
    fn test_no_path_back_to_initial() {
        use RetryEvent::*;
        let events = [Unauthorized, Answered, TransportError, TokenRefreshed, RefreshFailed];
        for from in [
            RetryState::Refreshing,
            RetryState::Retried,
            RetryState::TerminalFailure,
            RetryState::Done,
        ] {
            for event in events {
                assert_ne!(from.next(event), RetryState::Initial);
                // Only Initial enters Refreshing; Refreshing may stay put
                if from != RetryState::Refreshing {
                    assert_ne!(from.next(event), RetryState::Refreshing);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_always_401_sends_twice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/user/auth/sso-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"access_token": "at2", "refresh_token": "rt2"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let (sender, credentials, notifier) = sender(&server.uri()).await;
        let request = Request::get(format!("{}/data", server.uri())).unwrap();
        let outcome = sender.send(request).await;

        assert!(matches!(outcome, AuthOutcome::AuthExpired { attempts: 2, .. }));
        assert!(!credentials.is_logged_in());
        assert_eq!(notifier.reauth_count(), 1);
    }

    #[tokio::test]
    async fn test_retry_uses_refreshed_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer at1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer at2"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"access_token": "at2", "refresh_token": "rt2"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let (sender, credentials, _) = sender(&server.uri()).await;
        let outcome = sender.send(Request::get(server.uri()).unwrap()).await;

        match outcome {
            AuthOutcome::Completed { response, attempts } => {
                assert!(response.is_success());
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(credentials.get().access_token, "at2");
    }

    #[tokio::test]
    async fn test_non_401_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let (sender, credentials, _) = sender(&server.uri()).await;
        let outcome = sender.send(Request::get(server.uri()).unwrap()).await;

        assert!(matches!(outcome, AuthOutcome::Completed { attempts: 1, .. }));
        assert!(credentials.is_logged_in());
    }

    #[tokio::test]
    async fn test_failed_refresh_stops_after_one_send() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let (sender, credentials, notifier) = sender(&server.uri()).await;
        let outcome = sender.send(Request::get(server.uri()).unwrap()).await;

        assert!(matches!(outcome, AuthOutcome::AuthExpired { attempts: 1, .. }));
        assert!(!credentials.is_logged_in());
        assert_eq!(notifier.reauth_count(), 1);
    }
}
