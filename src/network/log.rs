// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Bounded log of captured events

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;

use super::event::CapturedEvent;

/// Default number of retained events
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Insertion-ordered event log; the oldest entry is evicted when full
#[derive(Clone)]
pub struct RequestLog {
    entries: Arc<RwLock<VecDeque<CapturedEvent>>>,
    capacity: usize,
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl RequestLog {
    /// Create a log holding at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    /// Append an event
    pub fn push(&self, event: CapturedEvent) {
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    /// All events, oldest first
    pub fn entries(&self) -> Vec<CapturedEvent> {
        self.entries.read().iter().cloned().collect()
    }

    /// Events captured by the named rule
    pub fn by_rule(&self, rule_name: &str) -> Vec<CapturedEvent> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.matched_rule_name.as_deref() == Some(rule_name))
            .cloned()
            .collect()
    }

    /// The `n` newest events, oldest first
    pub fn recent(&self, n: usize) -> Vec<CapturedEvent> {
        let entries = self.entries.read();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Maximum number of events
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all events
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Export as a JSON array
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.entries())
    }
}
