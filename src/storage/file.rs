// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Directory-backed store: one `<key>.json` document per record

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use super::{ChangeCallback, Observers, StateStore, StorageChange};
use crate::error::{Error, Result};

/// Store writing each record as a JSON file under a directory
#[derive(Clone)]
pub struct FileStore {
    dir: PathBuf,
    observers: Observers,
}

impl FileStore {
    /// Open (and create if needed) a store directory
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            observers: Observers::default(),
        })
    }

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(Error::storage(format!("Invalid storage key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, value: &Value) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(value)?;

        // Write-then-rename so readers never see a half-written record
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        self.observers.notify(&StorageChange::Saved {
            key: key.to_string(),
            value: value.clone(),
        });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.observers.notify(&StorageChange::Removed {
                    key: key.to_string(),
                });
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn subscribe(&self, callback: ChangeCallback) {
        self.observers.add(callback);
    }
}
