// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Event normalizer
//!
//! Turns raw request/response observations into [`CapturedEvent`]s, keeps
//! only traffic matched by a capture rule, and hands completed events to the
//! configured [`EventSink`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::event::CapturedEvent;
use super::log::RequestLog;
use super::raw::{RawObservation, RawRequest, RawResponse};
use super::sink::EventSink;
use crate::error::Result;
use crate::rules::RuleRegistry;
use crate::stats::RequestStats;

/// Default age after which an unanswered request is dropped
pub const DEFAULT_PENDING_MAX_AGE: Duration = Duration::from_secs(60);

/// Default body capture limit
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

struct PendingEntry {
    event: CapturedEvent,
    observed_at: Instant,
}

/// Correlates observed requests with their responses
pub struct EventNormalizer {
    rules: Arc<RuleRegistry>,
    sink: Arc<dyn EventSink>,
    log: RequestLog,
    stats: Arc<RequestStats>,
    /// Matched requests waiting for a response
    pending: DashMap<String, PendingEntry>,
    /// Counter for generated request ids
    id_counter: AtomicU64,
    max_age: Duration,
    max_body_size: usize,
}

impl EventNormalizer {
    /// Create a normalizer feeding `sink`
    pub fn new(
        rules: Arc<RuleRegistry>,
        sink: Arc<dyn EventSink>,
        log: RequestLog,
        stats: Arc<RequestStats>,
    ) -> Self {
        Self {
            rules,
            sink,
            log,
            stats,
            pending: DashMap::new(),
            id_counter: AtomicU64::new(0),
            max_age: DEFAULT_PENDING_MAX_AGE,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Set the pending entry age limit
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the body capture limit
    pub fn max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Record an outgoing request.
    ///
    /// Returns the request id when a rule matched and the request is now
    /// waiting for its response. Unmatched requests are dropped immediately.
    pub fn on_request_observed(&self, raw: RawRequest) -> Option<String> {
        self.evict_stale();
        self.stats.record_observed();

        let request_id = raw
            .request_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| self.next_request_id());

        let rule = match self.rules.match_url(&raw.url) {
            Some(rule) => rule,
            None => {
                self.stats.record_dropped();
                tracing::trace!(url = %raw.url, "No capture rule matched, dropping request");
                return None;
            }
        };

        self.stats.record_matched();
        tracing::debug!(
            request_id = %request_id,
            url = %raw.url,
            rule = %rule.name,
            "Request matched capture rule"
        );

        let event = CapturedEvent::from_request(request_id.clone(), &raw, self.max_body_size).with_rule(&rule);
        self.pending.insert(
            request_id.clone(),
            PendingEntry {
                event,
                observed_at: Instant::now(),
            },
        );
        Some(request_id)
    }

    /// Record a response.
    ///
    /// A pending request is completed with the response. Without one, a
    /// minimal event is built from the response alone and kept only if its
    /// URL matches a rule. Returns whether an event was emitted.
    pub fn on_response_observed(&self, request_id: &str, raw: RawResponse) -> bool {
        self.evict_stale();

        if let Some((_, entry)) = self.pending.remove(request_id) {
            let mut event = entry.event;
            event.apply_response(&raw, self.max_body_size);
            self.complete(event);
            return true;
        }

        let event = CapturedEvent::from_response(request_id, &raw, self.max_body_size);
        match self.rules.match_url(&event.url) {
            Some(rule) => {
                tracing::debug!(request_id = %request_id, url = %event.url, "Synthesized event from response");
                self.stats.record_matched();
                self.complete(event.with_rule(&rule));
                true
            }
            None => {
                self.stats.record_dropped();
                false
            }
        }
    }

    /// Route a page-dispatched custom event
    pub fn on_custom_event(&self, detail: &Value) -> Result<()> {
        let observation = RawObservation::from_custom_event(detail)?;
        self.observe(observation);
        Ok(())
    }

    /// Route any raw observation
    pub fn observe(&self, observation: RawObservation) {
        match observation {
            RawObservation::Request(raw) => {
                self.on_request_observed(raw);
            }
            RawObservation::Response { request_id, response } => {
                self.on_response_observed(&request_id, response);
            }
        }
    }

    /// Drop pending entries older than the age limit. Returns how many were dropped.
    pub fn evict_stale(&self) -> usize {
        let before = self.pending.len();
        let max_age = self.max_age;
        self.pending
            .retain(|_, entry| entry.observed_at.elapsed() < max_age);
        let evicted = before.saturating_sub(self.pending.len());
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted unanswered requests");
        }
        evicted
    }

    /// Number of matched requests waiting for a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Completed-event log
    pub fn log(&self) -> &RequestLog {
        &self.log
    }

    /// Run [`evict_stale`](Self::evict_stale) on a fixed interval
    pub fn spawn_eviction(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.evict_stale();
            }
        })
    }

    fn complete(&self, event: CapturedEvent) {
        self.log.push(event.clone());
        self.sink.submit(event);
    }

    fn next_request_id(&self) -> String {
        let n = self.id_counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("req_{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialStore;
    use crate::http::HttpClient;
    use crate::network::raw::{ObservationSource, RawBody};
    use crate::network::sink::CollectingSink;
    use crate::rules::{CaptureRule, MatcherKind};
    use crate::storage::MemoryStore;
    use serde_json::json;

    struct Fixture {
        normalizer: EventNormalizer,
        sink: CollectingSink,
        stats: Arc<RequestStats>,
    }

    fn fixture(rules: Vec<CaptureRule>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(RuleRegistry::new(
            HttpClient::new().unwrap(),
            CredentialStore::new(store.clone(), None),
            store,
            MatcherKind::Substring.build(),
        ));
        registry.install(rules);

        let sink = CollectingSink::new();
        let stats = Arc::new(RequestStats::new());
        let normalizer = EventNormalizer::new(
            registry,
            Arc::new(sink.clone()),
            RequestLog::new(10),
            stats.clone(),
        );
        Fixture {
            normalizer,
            sink,
            stats,
        }
    }

    #[test]
    fn test_unmatched_request_dropped() {
        let f = fixture(vec![CaptureRule::new("cart", "/api/cart", 1)]);

        let id = f.normalizer.on_request_observed(RawRequest::new("https://shop.example/static/app.js"));
        assert!(id.is_none());
        assert_eq!(f.normalizer.pending_count(), 0);
        assert_eq!(f.stats.snapshot().dropped_unmatched, 1);
    }

    #[test]
    fn test_request_response_pair() {
        let f = fixture(vec![CaptureRule::new("cart", "/api/cart", 1).data_type("cart")]);

        let id = f
            .normalizer
            .on_request_observed(
                RawRequest::new("https://shop.example/api/cart")
                    .id("x1")
                    .method("post")
                    .body(RawBody::Json(json!({"sku": "A"}))),
            )
            .unwrap();
        assert_eq!(id, "x1");
        assert_eq!(f.normalizer.pending_count(), 1);
        assert!(f.sink.is_empty());

        assert!(f
            .normalizer
            .on_response_observed("x1", RawResponse::new(200).body(RawBody::Text("ok".into()))));

        let events = f.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].method, "POST");
        assert_eq!(events[0].status_code, Some(200));
        assert_eq!(events[0].matched_rule_name.as_deref(), Some("cart"));
        assert_eq!(events[0].data_type.as_deref(), Some("cart"));
        assert_eq!(f.normalizer.pending_count(), 0);
        assert_eq!(f.normalizer.log().len(), 1);
    }

    #[test]
    fn test_generated_ids() {
        let f = fixture(vec![CaptureRule::new("api", "/api", 1)]);
        let a = f.normalizer.on_request_observed(RawRequest::new("https://h/api/a")).unwrap();
        let b = f.normalizer.on_request_observed(RawRequest::new("https://h/api/b")).unwrap();
        assert_eq!(a, "req_1");
        assert_eq!(b, "req_2");
    }

    #[test]
    fn test_response_without_request_is_synthesized() {
        let f = fixture(vec![CaptureRule::new("api", "/api", 1)]);

        let emitted = f.normalizer.on_response_observed(
            "wr-7",
            RawResponse::new(201)
                .url("https://h/api/orders")
                .source(ObservationSource::WebRequest),
        );
        assert!(emitted);

        let events = f.sink.events();
        assert_eq!(events[0].request_id, "wr-7");
        assert_eq!(events[0].url, "https://h/api/orders");
        assert_eq!(events[0].source, ObservationSource::WebRequest);

        assert!(!f
            .normalizer
            .on_response_observed("wr-8", RawResponse::new(200).url("https://h/other")));
        assert_eq!(f.sink.len(), 1);
    }

    #[test]
    fn test_custom_events() {
        let f = fixture(vec![CaptureRule::new("api", "/api", 1)]);

        f.normalizer
            .on_custom_event(&json!({"type": "request", "requestId": "c1", "url": "https://h/api/x"}))
            .unwrap();
        f.normalizer
            .on_custom_event(&json!({"type": "response", "requestId": "c1", "status": 200}))
            .unwrap();
        assert!(f.normalizer.on_custom_event(&json!(42)).is_err());

        let events = f.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, ObservationSource::CustomEvent);
        assert_eq!(events[0].status_code, Some(200));
    }

    #[test]
    fn test_stale_entries_evicted() {
        let f = fixture(vec![CaptureRule::new("api", "/api", 1)]);
        let normalizer = f.normalizer.max_age(Duration::from_millis(20));

        normalizer.on_request_observed(RawRequest::new("https://h/api/slow"));
        assert_eq!(normalizer.pending_count(), 1);

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(normalizer.evict_stale(), 1);
        assert_eq!(normalizer.pending_count(), 0);
    }

    #[test]
    fn test_body_truncated() {
        let f = fixture(vec![CaptureRule::new("api", "/api", 1)]);
        let normalizer = f.normalizer.max_body_size(4);

        normalizer.on_request_observed(
            RawRequest::new("https://h/api").id("b").body(RawBody::Text("abcdefgh".into())),
        );
        normalizer.on_response_observed("b", RawResponse::new(200));
        assert_eq!(f.sink.events()[0].request_body.as_deref(), Some("abcd"));
    }
}
