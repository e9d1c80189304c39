// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Request statistics
//!
//! Counters for observed, matched, uploaded and proxied traffic. A snapshot is
//! persisted under `request_stats` so totals survive restarts.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{self, StateStore, REQUEST_STATS_KEY};

/// Request statistics collector
#[derive(Debug, Default)]
pub struct RequestStats {
    /// Requests seen by the normalizer
    observed: AtomicU64,
    /// Requests that matched a capture rule
    matched: AtomicU64,
    /// Requests discarded because no rule matched
    dropped_unmatched: AtomicU64,
    /// Successful uploads
    uploaded: AtomicU64,
    /// Items the backend reported as saved
    items_saved: AtomicU64,
    /// Uploads dropped after failure
    upload_failures: AtomicU64,
    /// Terminal authentication failures
    auth_failures: AtomicU64,
    /// Proxied requests
    proxied: AtomicU64,
    /// Time of the last successful upload
    last_upload_at: RwLock<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSnapshot {
    pub observed: u64,
    pub matched: u64,
    pub dropped_unmatched: u64,
    pub uploaded: u64,
    pub items_saved: u64,
    pub upload_failures: u64,
    pub auth_failures: u64,
    pub proxied: u64,
    pub last_upload_at: Option<DateTime<Utc>>,
}

impl StatsSnapshot {
    /// Share of matched requests among observed ones
    pub fn match_rate(&self) -> f64 {
        if self.observed == 0 {
            0.0
        } else {
            self.matched as f64 / self.observed as f64
        }
    }
}

impl RequestStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed request
    pub fn record_observed(&self) {
        self.observed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rule match
    pub fn record_matched(&self) {
        self.matched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request dropped for not matching
    pub fn record_dropped(&self) {
        self.dropped_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful upload
    pub fn record_upload(&self, items_saved: u64) {
        self.uploaded.fetch_add(1, Ordering::Relaxed);
        self.items_saved.fetch_add(items_saved, Ordering::Relaxed);
        *self.last_upload_at.write() = Some(Utc::now());
    }

    /// Record a dropped upload
    pub fn record_upload_failure(&self) {
        self.upload_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a terminal auth failure
    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a proxied request
    pub fn record_proxied(&self) {
        self.proxied.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            observed: self.observed.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            dropped_unmatched: self.dropped_unmatched.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            items_saved: self.items_saved.load(Ordering::Relaxed),
            upload_failures: self.upload_failures.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            proxied: self.proxied.load(Ordering::Relaxed),
            last_upload_at: *self.last_upload_at.read(),
        }
    }

    /// Overwrite the counters from a snapshot
    pub fn restore(&self, snapshot: &StatsSnapshot) {
        self.observed.store(snapshot.observed, Ordering::Relaxed);
        self.matched.store(snapshot.matched, Ordering::Relaxed);
        self.dropped_unmatched.store(snapshot.dropped_unmatched, Ordering::Relaxed);
        self.uploaded.store(snapshot.uploaded, Ordering::Relaxed);
        self.items_saved.store(snapshot.items_saved, Ordering::Relaxed);
        self.upload_failures.store(snapshot.upload_failures, Ordering::Relaxed);
        self.auth_failures.store(snapshot.auth_failures, Ordering::Relaxed);
        self.proxied.store(snapshot.proxied, Ordering::Relaxed);
        *self.last_upload_at.write() = snapshot.last_upload_at;
    }

    /// Restore from durable storage, if a snapshot exists
    pub async fn load(&self, store: &dyn StateStore) -> Result<bool> {
        match storage::load_as::<StatsSnapshot>(store, REQUEST_STATS_KEY).await? {
            Some(snapshot) => {
                self.restore(&snapshot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Write the current snapshot to durable storage
    pub async fn persist(&self, store: &dyn StateStore) -> Result<()> {
        storage::save_as(store, REQUEST_STATS_KEY, &self.snapshot()).await
    }

    /// Zero all counters
    pub fn reset(&self) {
        self.restore(&StatsSnapshot::default());
    }
}
