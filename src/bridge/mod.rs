// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Message bridge between the unprivileged and privileged sides
//!
//! The unprivileged side holds a [`BridgeClient`]. Messages travel over a
//! bounded tokio channel to a [`BridgeService`], which dispatches proxy
//! requests to the gateway and traffic observations to the normalizer.
//! Proxy replies come back on a second channel and are matched to their
//! callers through a [`CorrelationTable`].

mod correlation;

pub use correlation::{CorrelationTable, PendingReply, DEFAULT_REPLY_TIMEOUT};

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::network::{EventNormalizer, RawObservation};
use crate::proxy::{ProxyGateway, ProxyOptions, ProxyResponse};

/// Message from the unprivileged side
#[derive(Debug, Clone)]
pub enum BridgeMessage {
    /// Forward a request; answered with a [`BridgeReply`] carrying `id`
    Forward {
        id: u64,
        request_id: String,
        url: String,
        options: ProxyOptions,
    },
    /// Observed traffic
    Observe(RawObservation),
    /// Page-dispatched custom event detail
    CustomEvent(Value),
}

/// Answer to a [`BridgeMessage::Forward`]
#[derive(Debug, Clone)]
pub struct BridgeReply {
    pub id: u64,
    pub result: std::result::Result<ProxyResponse, String>,
}

/// Privileged end of a bridge
pub struct BridgeInbox {
    messages: mpsc::Receiver<BridgeMessage>,
    replies: mpsc::Sender<BridgeReply>,
}

/// Create a connected client and inbox.
///
/// Must be called inside a tokio runtime: the client's reply pump is spawned here.
pub fn channel(capacity: usize, reply_timeout: Duration) -> (BridgeClient, BridgeInbox) {
    let (message_tx, message_rx) = mpsc::channel(capacity.max(1));
    let (reply_tx, mut reply_rx) = mpsc::channel::<BridgeReply>(capacity.max(1));
    let table = CorrelationTable::new(reply_timeout);

    let pump_table = table.clone();
    tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            match reply.result {
                Ok(response) => pump_table.resolve(reply.id, response),
                Err(reason) => pump_table.reject(reply.id, reason),
            };
        }
    });

    (
        BridgeClient {
            messages: message_tx,
            table,
        },
        BridgeInbox {
            messages: message_rx,
            replies: reply_tx,
        },
    )
}

/// Unprivileged end of a bridge
#[derive(Clone)]
pub struct BridgeClient {
    messages: mpsc::Sender<BridgeMessage>,
    table: CorrelationTable<ProxyResponse>,
}

impl BridgeClient {
    /// Forward a request through the privileged side and wait for the reply
    pub async fn forward(&self, request_id: &str, url: &str, options: ProxyOptions) -> Result<ProxyResponse> {
        let id = self.table.next_id();
        let reply = self.table.register(id);
        self.send(BridgeMessage::Forward {
            id,
            request_id: request_id.to_string(),
            url: url.to_string(),
            options,
        })
        .await?;
        reply.wait().await
    }

    /// Report observed traffic
    pub async fn observe(&self, observation: RawObservation) -> Result<()> {
        self.send(BridgeMessage::Observe(observation)).await
    }

    /// Report a page-dispatched custom event
    pub async fn custom_event(&self, detail: Value) -> Result<()> {
        self.send(BridgeMessage::CustomEvent(detail)).await
    }

    /// Requests still waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.table.pending_count()
    }

    async fn send(&self, message: BridgeMessage) -> Result<()> {
        self.messages
            .send(message)
            .await
            .map_err(|_| Error::bridge("bridge service is not running"))
    }
}

/// Dispatches bridge messages on the privileged side
#[derive(Clone)]
pub struct BridgeService {
    gateway: ProxyGateway,
    normalizer: Arc<EventNormalizer>,
}

impl BridgeService {
    /// Create a service
    pub fn new(gateway: ProxyGateway, normalizer: Arc<EventNormalizer>) -> Self {
        Self { gateway, normalizer }
    }

    /// Handle messages until every client is dropped
    pub async fn run(self, inbox: BridgeInbox) {
        let BridgeInbox {
            mut messages,
            replies,
        } = inbox;

        while let Some(message) = messages.recv().await {
            match message {
                BridgeMessage::Forward {
                    id,
                    request_id,
                    url,
                    options,
                } => {
                    let gateway = self.gateway.clone();
                    let replies = replies.clone();
                    tokio::spawn(async move {
                        let result = gateway
                            .forward(&request_id, &url, options)
                            .await
                            .map_err(|e| e.to_string());
                        if replies.send(BridgeReply { id, result }).await.is_err() {
                            tracing::debug!(id, "Bridge client gone before reply");
                        }
                    });
                }
                BridgeMessage::Observe(observation) => self.normalizer.observe(observation),
                BridgeMessage::CustomEvent(detail) => {
                    if let Err(e) = self.normalizer.on_custom_event(&detail) {
                        tracing::warn!(error = %e, "Ignoring malformed custom event");
                    }
                }
            }
        }
        tracing::debug!("Bridge closed");
    }

    /// Run on a spawned task
    pub fn spawn(self, inbox: BridgeInbox) -> JoinHandle<()> {
        tokio::spawn(self.run(inbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthNotifier, AuthorizedSender, CredentialState, CredentialStore, RefreshCoordinator};
    use crate::http::HttpClient;
    use crate::network::{CollectingSink, RawRequest, RawResponse, RequestLog};
    use crate::rules::{CaptureRule, MatcherKind, RuleRegistry};
    use crate::stats::RequestStats;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn service(host: &str) -> (BridgeService, CollectingSink) {
        let store = Arc::new(MemoryStore::new());
        let credentials = CredentialStore::new(store.clone(), None);
        credentials
            .set(CredentialState::new(host, "at1", "rt1"))
            .await
            .unwrap();
        let client = HttpClient::new().unwrap();
        let coordinator = Arc::new(RefreshCoordinator::new(
            client.clone(),
            credentials.clone(),
            AuthNotifier::new(),
            Duration::from_secs(5),
        ));
        let stats = Arc::new(RequestStats::new());
        let gateway = ProxyGateway::new(
            AuthorizedSender::new(client.clone(), credentials.clone(), coordinator),
            credentials.clone(),
            stats.clone(),
        );

        let registry = Arc::new(RuleRegistry::new(
            client,
            credentials,
            store,
            MatcherKind::Substring.build(),
        ));
        registry.install(vec![CaptureRule::new("api", "/api", 1)]);
        let sink = CollectingSink::new();
        let normalizer = Arc::new(EventNormalizer::new(
            registry,
            Arc::new(sink.clone()),
            RequestLog::default(),
            stats,
        ));
        (BridgeService::new(gateway, normalizer), sink)
    }

    #[tokio::test]
    async fn test_concurrent_forwards_get_their_own_replies() {
        let server = MockServer::start().await;
        for name in ["a", "b", "c"] {
            Mock::given(method("GET"))
                .and(path(format!("/api/{}", name)))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": name })))
                .mount(&server)
                .await;
        }

        let (service, _) = service(&server.uri()).await;
        let (client, inbox) = channel(8, Duration::from_secs(5));
        let handle = service.spawn(inbox);

        let calls = ["a", "b", "c"].map(|name| {
            let client = client.clone();
            async move {
                client
                    .forward(name, &format!("/api/{}", name), ProxyOptions::new())
                    .await
            }
        });
        let results = futures::future::join_all(calls).await;

        for (name, result) in ["a", "b", "c"].iter().zip(results) {
            assert_eq!(result.unwrap().data, Some(json!({ "name": name })));
        }
        assert_eq!(client.pending_count(), 0);

        drop(client);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_observations_reach_normalizer() {
        let server = MockServer::start().await;
        let (service, sink) = service(&server.uri()).await;
        let (client, inbox) = channel(8, Duration::from_secs(5));
        let handle = service.spawn(inbox);

        client
            .observe(RawObservation::Request(RawRequest::new("https://h/api/x").id("o1")))
            .await
            .unwrap();
        client
            .observe(RawObservation::Response {
                request_id: "o1".into(),
                response: RawResponse::new(200),
            })
            .await
            .unwrap();
        client
            .custom_event(json!({"type": "response", "requestId": "c1", "url": "https://h/api/y", "status": 204}))
            .await
            .unwrap();
        client.custom_event(json!("malformed")).await.unwrap();

        drop(client);
        handle.await.unwrap();

        let ids: Vec<_> = sink.events().into_iter().map(|e| e.request_id).collect();
        assert_eq!(ids, vec!["o1", "c1"]);
    }

    #[tokio::test]
    async fn test_forward_without_service_fails() {
        let (client, inbox) = channel(1, Duration::from_secs(5));
        drop(inbox);

        let err = client.forward("x", "/api", ProxyOptions::new()).await.unwrap_err();
        assert!(matches!(err, Error::Bridge(_)));
        assert_eq!(client.pending_count(), 0);
    }
}
