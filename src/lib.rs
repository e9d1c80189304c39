// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! # Capture Relay - Authenticated Network Mediation
//!
//! Sits between an untrusted page context and a privileged background
//! context. Observed traffic is classified against backend-supplied capture
//! rules and uploaded; page requests can be forwarded with the user's
//! credentials.
//!
//! ## Features
//!
//! - Single-flight token refresh: one refresh call no matter how many
//!   requests hit an expired token, waiters released in FIFO order
//! - Bounded 401 retry: every upload or proxied request is sent at most twice
//! - Capture rules: priority-ordered, atomically replaced, substring/glob/regex
//!   matching
//! - Traffic normalization: fetch, XHR, web-request and custom-event
//!   observations in one canonical event shape
//! - Durable state: credentials, rules and statistics persisted in a
//!   key-value store with change notification
//! - Cross-context bridge: correlated request/reply over tokio channels
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use capture_relay::{MemoryStore, ProxyOptions, RelayConfig, RelayContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::new().host("https://backend.example");
//!     let ctx = RelayContext::new(config, Arc::new(MemoryStore::new())).await?;
//!
//!     ctx.login(None, "access-token", "refresh-token").await?;
//!     ctx.rules().refresh().await?;
//!
//!     let response = ctx
//!         .gateway()
//!         .forward("req-1", "/api/v1/user/me", ProxyOptions::new())
//!         .await?;
//!     println!("{} {:?}", response.status, response.data);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod network;
pub mod proxy;
pub mod rules;
pub mod stats;
pub mod storage;

// Re-exports for convenience

// Context and configuration
pub use config::RelayConfig;
pub use context::{BackgroundTasks, RelayContext};

// Auth
pub use auth::{AuthNotifier, CredentialState, CredentialStore, RefreshCoordinator, SessionEvent};
pub use auth::{AuthOutcome, AuthorizedSender, RetryEvent, RetryState};

// Bridge
pub use bridge::{BridgeClient, BridgeMessage, BridgeService, CorrelationTable};

// Errors
pub use error::{Error, ErrorContext, Result};

// HTTP
pub use http::{HttpClient, HttpClientConfig, Request, Response};

// Network capture
pub use network::{CapturedEvent, DeliveryOutcome, EventNormalizer, EventSink, RequestLog, UploadPipeline};
pub use network::{ObservationSource, RawBody, RawHeaders, RawObservation, RawRequest, RawResponse};

// Proxy
pub use proxy::{ProxyGateway, ProxyOptions, ProxyResponse};

// Rules
pub use rules::{CaptureRule, MatcherKind, PatternMatcher, RuleRegistry};

// Stats
pub use stats::{RequestStats, StatsSnapshot};

// Storage
pub use storage::{FileStore, MemoryStore, StateStore, StorageChange};

/// Capture relay version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
