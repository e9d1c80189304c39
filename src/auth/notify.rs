// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! User-facing session signals

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Event delivered to UI collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials are gone; the user has to log in again
    ReauthenticationRequired { reason: String },
    /// The user logged in
    LoggedIn { host: String },
    /// The user logged out
    LoggedOut,
}

/// Session callback type
pub type SessionCallback = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Emits session events. A reauthentication request is emitted once and then
/// suppressed until the next login.
#[derive(Clone, Default)]
pub struct AuthNotifier {
    callbacks: Arc<RwLock<Vec<SessionCallback>>>,
    reauth_pending: Arc<AtomicBool>,
    reauth_emitted: Arc<AtomicU64>,
}

impl AuthNotifier {
    /// Create a notifier with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session observer
    pub fn subscribe(&self, callback: SessionCallback) {
        self.callbacks.write().push(callback);
    }

    /// Ask the user to log in again. Returns false if a request is already pending.
    pub fn reauthentication_required(&self, reason: &str) -> bool {
        if self.reauth_pending.swap(true, Ordering::AcqRel) {
            tracing::debug!(reason = %reason, "Reauthentication already requested");
            return false;
        }
        self.reauth_emitted.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(reason = %reason, "Reauthentication required");
        self.emit(&SessionEvent::ReauthenticationRequired {
            reason: reason.to_string(),
        });
        true
    }

    /// Record a login and re-arm the reauthentication signal
    pub fn logged_in(&self, host: &str) {
        self.reauth_pending.store(false, Ordering::Release);
        self.emit(&SessionEvent::LoggedIn {
            host: host.to_string(),
        });
    }

    /// Record a logout. No reauthentication prompt follows a deliberate logout.
    pub fn logged_out(&self) {
        self.reauth_pending.store(true, Ordering::Release);
        self.emit(&SessionEvent::LoggedOut);
    }

    /// Whether a reauthentication request is outstanding
    pub fn is_reauth_pending(&self) -> bool {
        self.reauth_pending.load(Ordering::Acquire)
    }

    /// Total reauthentication requests emitted
    pub fn reauth_count(&self) -> u64 {
        self.reauth_emitted.load(Ordering::Relaxed)
    }

    fn emit(&self, event: &SessionEvent) {
        let callbacks = self.callbacks.read().clone();
        for callback in callbacks {
            callback(event);
        }
    }
}
