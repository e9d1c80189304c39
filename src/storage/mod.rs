// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Durable key-value state with change notification
//!
//! Every record is a JSON document stored under a string key. Components keep
//! their own in-memory copy and use the store only to persist and restore it.

mod file;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key holding the credential record
pub const CREDENTIALS_KEY: &str = "credentials";
/// Key holding the cached capture rule list
pub const CAPTURE_RULES_KEY: &str = "capture_rules";
/// Key holding request statistics
pub const REQUEST_STATS_KEY: &str = "request_stats";

/// A change applied to a stored record
#[derive(Debug, Clone, PartialEq)]
pub enum StorageChange {
    /// Record written
    Saved { key: String, value: Value },
    /// Record deleted
    Removed { key: String },
}

impl StorageChange {
    /// Key the change applies to
    pub fn key(&self) -> &str {
        match self {
            StorageChange::Saved { key, .. } | StorageChange::Removed { key } => key,
        }
    }
}

/// Storage change callback type
pub type ChangeCallback = Arc<dyn Fn(&StorageChange) + Send + Sync>;

/// Durable key-value store
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a record
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Write a record and notify subscribers
    async fn save(&self, key: &str, value: &Value) -> Result<()>;

    /// Delete a record and notify subscribers
    async fn remove(&self, key: &str) -> Result<()>;

    /// Register a change observer
    fn subscribe(&self, callback: ChangeCallback);
}

/// Read a record and deserialize it
pub async fn load_as<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    match store.load(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Serialize a value and write it
pub async fn save_as<T: Serialize + ?Sized>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.save(key, &value).await
}

/// Observer list shared by the store implementations
#[derive(Default, Clone)]
pub(crate) struct Observers {
    callbacks: Arc<RwLock<Vec<ChangeCallback>>>,
}

impl Observers {
    pub(crate) fn add(&self, callback: ChangeCallback) {
        self.callbacks.write().push(callback);
    }

    pub(crate) fn notify(&self, change: &StorageChange) {
        // Snapshot so callbacks may subscribe without deadlocking
        let callbacks = self.callbacks.read().clone();
        for callback in callbacks {
            callback(change);
        }
    }
}
