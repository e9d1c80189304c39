// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Request/reply correlation across a message channel

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Default wait for a reply
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

type Slot<T> = oneshot::Sender<Result<T>>;

/// Outstanding requests keyed by correlation id.
///
/// Each id is answered at most once; late or unknown replies are ignored.
pub struct CorrelationTable<T> {
    pending: Arc<DashMap<u64, Slot<T>>>,
    next_id: Arc<AtomicU64>,
    timeout: Duration,
}

impl<T> Clone for CorrelationTable<T> {
    fn clone(&self) -> Self {
        Self {
            pending: self.pending.clone(),
            next_id: self.next_id.clone(),
            timeout: self.timeout,
        }
    }
}

impl<T: Send + 'static> Default for CorrelationTable<T> {
    fn default() -> Self {
        Self::new(DEFAULT_REPLY_TIMEOUT)
    }
}

impl<T: Send + 'static> CorrelationTable<T> {
    /// Create a table whose replies time out after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            timeout,
        }
    }

    /// Allocate a fresh correlation id
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Start waiting for the reply to `id`.
    ///
    /// Registering an id that is still pending replaces the earlier waiter,
    /// which then fails as closed.
    pub fn register(&self, id: u64) -> PendingReply<T> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        PendingReply {
            id,
            rx,
            pending: self.pending.clone(),
            timeout: self.timeout,
        }
    }

    /// Deliver a value. Returns false if nobody was waiting.
    pub fn resolve(&self, id: u64, value: T) -> bool {
        self.complete(id, Ok(value))
    }

    /// Deliver a failure. Returns false if nobody was waiting.
    pub fn reject(&self, id: u64, reason: impl Into<String>) -> bool {
        self.complete(id, Err(Error::bridge(reason.into())))
    }

    /// Number of outstanding requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Reply timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn complete(&self, id: u64, result: Result<T>) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => tx.send(result).is_ok(),
            None => {
                tracing::debug!(id, "Reply for unknown or expired request");
                false
            }
        }
    }
}

/// A registered request waiting for its reply. Dropping it unregisters the id.
pub struct PendingReply<T> {
    id: u64,
    rx: oneshot::Receiver<Result<T>>,
    pending: Arc<DashMap<u64, Slot<T>>>,
    timeout: Duration,
}

impl<T> PendingReply<T> {
    /// Correlation id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the reply or the timeout
    pub async fn wait(mut self) -> Result<T> {
        match tokio::time::timeout(self.timeout, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::bridge(format!("reply channel for request {} closed", self.id))),
            Err(_) => Err(Error::timeout(
                format!("bridge request {}", self.id),
                self.timeout.as_millis() as u64,
            )),
        }
    }
}

impl<T> Drop for PendingReply<T> {
    fn drop(&mut self) {
        self.rx.close();
        // Only remove our own slot; a re-registered id has an open receiver
        self.pending.remove_if(&self.id, |_, tx| tx.is_closed());
    }
}
