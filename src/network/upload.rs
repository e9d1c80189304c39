// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Best-effort delivery of captured events to the backend
//!
//! Each event gets one authorized POST, plus one retry after a token refresh
//! if the backend answers 401. Everything else that goes wrong is logged and
//! the event is dropped; there is no persistent retry queue.

use std::sync::Arc;

use serde::Deserialize;

use super::event::CapturedEvent;
use super::sink::EventSink;
use crate::auth::{AuthOutcome, AuthorizedSender, CredentialStore};
use crate::config::UPLOAD_PATH;
use crate::http::{self, Request};
use crate::stats::RequestStats;
use crate::storage::StateStore;

/// What happened to one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Backend stored the event
    Delivered { items_saved: u64, attempts: u8 },
    /// Backend answered but did not store the event
    Rejected { status: u16, message: String },
    /// Transport failure or timeout
    Failed { reason: String, attempts: u8 },
    /// 401 could not be recovered; credentials were cleared
    AuthExpired { attempts: u8 },
    /// No host or no login, nothing was sent
    Skipped { reason: &'static str },
}

impl DeliveryOutcome {
    /// Whether the backend stored the event
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    /// Requests sent to the backend
    pub fn attempts(&self) -> u8 {
        match self {
            DeliveryOutcome::Delivered { attempts, .. }
            | DeliveryOutcome::Failed { attempts, .. }
            | DeliveryOutcome::AuthExpired { attempts } => *attempts,
            DeliveryOutcome::Rejected { .. } => 1,
            DeliveryOutcome::Skipped { .. } => 0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    items_saved: u64,
    #[serde(default, alias = "message")]
    error_message: Option<String>,
}

/// Uploads captured events
#[derive(Clone)]
pub struct UploadPipeline {
    sender: AuthorizedSender,
    credentials: CredentialStore,
    stats: Arc<RequestStats>,
    store: Arc<dyn StateStore>,
}

impl UploadPipeline {
    /// Create a pipeline
    pub fn new(
        sender: AuthorizedSender,
        credentials: CredentialStore,
        stats: Arc<RequestStats>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            sender,
            credentials,
            stats,
            store,
        }
    }

    /// Deliver one event. Never fails; the outcome says what happened.
    pub async fn deliver(&self, event: CapturedEvent) -> DeliveryOutcome {
        let state = self.credentials.get();
        let host = match state.host() {
            Some(host) => host.to_string(),
            None => return DeliveryOutcome::Skipped { reason: "no backend host" },
        };
        if !state.is_logged_in() {
            tracing::debug!(request_id = %event.request_id, "Not logged in, skipping upload");
            return DeliveryOutcome::Skipped { reason: "not logged in" };
        }

        let request = match http::endpoint_url(&host, UPLOAD_PATH)
            .and_then(|url| Request::post(url)?.json(&event))
        {
            Ok(request) => request,
            Err(e) => {
                self.stats.record_upload_failure();
                return DeliveryOutcome::Failed {
                    reason: e.to_string(),
                    attempts: 0,
                };
            }
        };

        let outcome = match self.sender.send(request).await {
            AuthOutcome::Completed { response, attempts } => {
                if !response.is_success() {
                    let body: UploadResponse = response.json().unwrap_or_default();
                    DeliveryOutcome::Rejected {
                        status: response.status_code(),
                        message: body
                            .error_message
                            .unwrap_or_else(|| format!("HTTP {}", response.status_code())),
                    }
                } else {
                    match response.json::<UploadResponse>() {
                        Ok(body) if body.success => DeliveryOutcome::Delivered {
                            items_saved: body.items_saved,
                            attempts,
                        },
                        Ok(body) => DeliveryOutcome::Rejected {
                            status: response.status_code(),
                            message: body
                                .error_message
                                .unwrap_or_else(|| "backend reported failure".to_string()),
                        },
                        Err(e) => DeliveryOutcome::Rejected {
                            status: response.status_code(),
                            message: format!("Invalid upload response: {}", e),
                        },
                    }
                }
            }
            AuthOutcome::AuthExpired { attempts, .. } => DeliveryOutcome::AuthExpired { attempts },
            AuthOutcome::Failed { error, attempts } => DeliveryOutcome::Failed {
                reason: error.to_string(),
                attempts,
            },
        };

        self.record(&event, &outcome).await;
        outcome
    }

    async fn record(&self, event: &CapturedEvent, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered { items_saved, attempts } => {
                self.stats.record_upload(*items_saved);
                tracing::debug!(
                    request_id = %event.request_id,
                    items_saved,
                    attempts,
                    "Captured event uploaded"
                );
                if let Err(e) = self.stats.persist(self.store.as_ref()).await {
                    tracing::warn!(error = %e, "Failed to persist request stats");
                }
            }
            DeliveryOutcome::Rejected { status, message } => {
                self.stats.record_upload_failure();
                tracing::warn!(request_id = %event.request_id, status, message = %message, "Upload rejected");
            }
            DeliveryOutcome::Failed { reason, attempts } => {
                self.stats.record_upload_failure();
                tracing::warn!(request_id = %event.request_id, attempts, reason = %reason, "Upload failed");
            }
            DeliveryOutcome::AuthExpired { attempts } => {
                self.stats.record_auth_failure();
                tracing::warn!(request_id = %event.request_id, attempts, "Upload dropped, authentication expired");
            }
            DeliveryOutcome::Skipped { .. } => {}
        }
    }
}

impl EventSink for UploadPipeline {
    fn submit(&self, event: CapturedEvent) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pipeline = self.clone();
                handle.spawn(async move {
                    pipeline.deliver(event).await;
                });
            }
            Err(_) => {
                tracing::warn!(request_id = %event.request_id, "No async runtime, dropping captured event");
            }
        }
    }
}
