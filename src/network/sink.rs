// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Destination for completed captured events

use std::sync::Arc;

use parking_lot::Mutex;

use super::event::CapturedEvent;

/// Receives completed events from the normalizer.
///
/// `submit` is called from the observation path and must not block; long
/// work belongs on a spawned task.
pub trait EventSink: Send + Sync {
    /// Accept one event
    fn submit(&self, event: CapturedEvent);
}

impl<F> EventSink for F
where
    F: Fn(CapturedEvent) + Send + Sync,
{
    fn submit(&self, event: CapturedEvent) {
        self(event)
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn submit(&self, _event: CapturedEvent) {}
}

/// Sink that keeps events in memory
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CollectingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Number of events received
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing was received
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for CollectingSink {
    fn submit(&self, event: CapturedEvent) {
        self.events.lock().push(event);
    }
}
