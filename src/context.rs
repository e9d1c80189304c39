// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Process-wide relay context
//!
//! Built once at startup and passed to whoever needs it. Restores persisted
//! credentials, capture rules and statistics, then wires the components.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::auth::{AuthNotifier, AuthorizedSender, CredentialState, CredentialStore, RefreshCoordinator};
use crate::bridge::{self, BridgeClient, BridgeService};
use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::network::{EventNormalizer, RequestLog, UploadPipeline};
use crate::proxy::ProxyGateway;
use crate::rules::RuleRegistry;
use crate::stats::RequestStats;
use crate::storage::StateStore;

/// Handles for the periodic background work; aborted on drop
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Number of running tasks
    pub fn len(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Whether no task is running
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every task
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// All relay components
pub struct RelayContext {
    config: RelayConfig,
    store: Arc<dyn StateStore>,
    client: HttpClient,
    credentials: CredentialStore,
    notifier: AuthNotifier,
    coordinator: Arc<RefreshCoordinator>,
    rules: Arc<RuleRegistry>,
    stats: Arc<RequestStats>,
    log: RequestLog,
    upload: UploadPipeline,
    normalizer: Arc<EventNormalizer>,
    gateway: ProxyGateway,
}

impl RelayContext {
    /// Build the context and restore persisted state.
    ///
    /// Unreadable rule or stats records are logged and skipped.
    pub async fn new(config: RelayConfig, store: Arc<dyn StateStore>) -> Result<Self> {
        config.validate()?;

        let client = HttpClient::with_config(config.http_client_config())?;
        let credentials = CredentialStore::new(store.clone(), config.host.clone());
        credentials.load().await?;

        let notifier = AuthNotifier::new();
        let coordinator = Arc::new(RefreshCoordinator::new(
            client.clone(),
            credentials.clone(),
            notifier.clone(),
            config.refresh_timeout,
        ));
        let sender = AuthorizedSender::new(client.clone(), credentials.clone(), coordinator.clone());

        let stats = Arc::new(RequestStats::new());
        if let Err(e) = stats.load(store.as_ref()).await {
            tracing::warn!(error = %e, "Discarding unreadable request stats");
        }

        let rules = Arc::new(RuleRegistry::new(
            client.clone(),
            credentials.clone(),
            store.clone(),
            config.matcher.build(),
        ));
        match rules.load_cached().await {
            Ok(count) => tracing::debug!(rules = count, "Cached capture rules restored"),
            Err(e) => tracing::warn!(error = %e, "Discarding unreadable capture rule cache"),
        }

        let log = RequestLog::new(config.log_capacity);
        let upload = UploadPipeline::new(sender.clone(), credentials.clone(), stats.clone(), store.clone());
        let normalizer = Arc::new(
            EventNormalizer::new(rules.clone(), Arc::new(upload.clone()), log.clone(), stats.clone())
                .max_age(config.pending_max_age)
                .max_body_size(config.max_body_size),
        );
        let gateway = ProxyGateway::new(sender, credentials.clone(), stats.clone());

        tracing::info!(
            host = credentials.host().as_deref().unwrap_or("<none>"),
            logged_in = credentials.is_logged_in(),
            rules = rules.len(),
            "Relay context ready"
        );

        Ok(Self {
            config,
            store,
            client,
            credentials,
            notifier,
            coordinator,
            rules,
            stats,
            log,
            upload,
            normalizer,
            gateway,
        })
    }

    /// Store tokens from an explicit login. `host` defaults to the current one.
    pub async fn login(&self, host: Option<&str>, access_token: &str, refresh_token: &str) -> Result<()> {
        let host = host
            .map(String::from)
            .or_else(|| self.credentials.host())
            .ok_or_else(|| Error::config("No backend host configured"))?;
        if access_token.is_empty() || refresh_token.is_empty() {
            return Err(Error::config("Login requires both an access and a refresh token"));
        }

        self.credentials
            .set(CredentialState::new(host.clone(), access_token, refresh_token))
            .await?;
        self.notifier.logged_in(&host);
        tracing::info!(host = %host, "Logged in");
        Ok(())
    }

    /// Drop both tokens after an explicit logout
    pub async fn logout(&self) -> Result<()> {
        self.credentials.clear().await?;
        self.notifier.logged_out();
        tracing::info!("Logged out");
        Ok(())
    }

    /// Start periodic rule refresh and pending-capture eviction
    pub fn start_background(&self) -> BackgroundTasks {
        let eviction_interval = (self.config.pending_max_age / 2).max(std::time::Duration::from_secs(1));
        BackgroundTasks {
            handles: vec![
                self.rules.clone().spawn_periodic(self.config.rule_refresh_interval),
                self.normalizer.clone().spawn_eviction(eviction_interval),
            ],
        }
    }

    /// Open a bridge and start its service
    pub fn bridge(&self, capacity: usize) -> (BridgeClient, JoinHandle<()>) {
        let (client, inbox) = bridge::channel(capacity, self.config.bridge_timeout);
        let service = BridgeService::new(self.gateway.clone(), self.normalizer.clone());
        (client, service.spawn(inbox))
    }

    /// Configuration in use
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Durable state store
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Backend HTTP client
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Credential store
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Session notifier
    pub fn notifier(&self) -> &AuthNotifier {
        &self.notifier
    }

    /// Refresh coordinator
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Capture rules
    pub fn rules(&self) -> &Arc<RuleRegistry> {
        &self.rules
    }

    /// Request statistics
    pub fn stats(&self) -> &Arc<RequestStats> {
        &self.stats
    }

    /// Captured event log
    pub fn log(&self) -> &RequestLog {
        &self.log
    }

    /// Upload pipeline
    pub fn upload(&self) -> &UploadPipeline {
        &self.upload
    }

    /// Event normalizer
    pub fn normalizer(&self) -> &Arc<EventNormalizer> {
        &self.normalizer
    }

    /// Proxy gateway
    pub fn gateway(&self) -> &ProxyGateway {
        &self.gateway
    }
}
