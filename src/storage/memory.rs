// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! In-memory store

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{ChangeCallback, Observers, StateStore, StorageChange};
use crate::error::Result;

/// Process-local store, used for tests and ephemeral sessions
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<DashMap<String, Value>>,
    observers: Observers,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if store is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.records.get(key).map(|v| v.value().clone()))
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        self.records.insert(key.to_string(), value.clone());
        self.observers.notify(&StorageChange::Saved {
            key: key.to_string(),
            value: value.clone(),
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        if self.records.remove(key).is_some() {
            self.observers.notify(&StorageChange::Removed {
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn subscribe(&self, callback: ChangeCallback) {
        self.observers.add(callback);
    }
}
