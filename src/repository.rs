//! # Repository Records
//!
//! This module holds the value type identifying a remote repository and the
//! persistence collaborator the refresh pipeline talks to.
//!
//! The record store itself lives outside this crate. The pipeline only needs
//! two capabilities from it, captured by the [`RepositoryStore`] trait: look a
//! repository up by id, and record when it was last synchronized. An
//! in-memory implementation is provided for the command-line tool and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identifies a remote repository publishing a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHandle {
    /// Stable, unique identifier. Also used as the mirror directory name.
    pub id: String,
    /// Clone address of the remote repository.
    pub address: String,
    /// Commit that overrides branch-tip tracking when set.
    #[serde(default)]
    pub pinned_revision: Option<String>,
    /// When the repository was last successfully synchronized.
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl RepositoryHandle {
    pub fn new(id: &str, address: &str) -> Self {
        Self {
            id: id.to_string(),
            address: address.to_string(),
            pinned_revision: None,
            last_synced_at: None,
        }
    }

    /// Returns a copy of this handle pinned to `revision`.
    pub fn pinned(mut self, revision: &str) -> Self {
        self.pinned_revision = Some(revision.to_string());
        self
    }

    /// Returns a copy of this handle with `last_synced_at` set.
    pub fn synced_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_synced_at = Some(at);
        self
    }
}

/// Persistence collaborator that owns repository records.
pub trait RepositoryStore: Send + Sync {
    /// Looks up a repository record by id.
    fn find_repository(&self, id: &str) -> Result<Option<RepositoryHandle>>;

    /// Records a successful synchronization.
    fn update_last_synced_at(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// A `RepositoryStore` backed by a process-local map.
#[derive(Debug, Default)]
pub struct InMemoryRepositoryStore {
    records: Mutex<HashMap<String, RepositoryHandle>>,
}

impl InMemoryRepositoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a repository record.
    pub fn insert(&self, handle: RepositoryHandle) -> Result<()> {
        let mut records = self.records.lock().map_err(|_| Error::LockPoisoned {
            context: "repository store".to_string(),
        })?;
        records.insert(handle.id.clone(), handle);
        Ok(())
    }
}

impl RepositoryStore for InMemoryRepositoryStore {
    fn find_repository(&self, id: &str) -> Result<Option<RepositoryHandle>> {
        let records = self.records.lock().map_err(|_| Error::LockPoisoned {
            context: "repository store".to_string(),
        })?;
        Ok(records.get(id).cloned())
    }

    fn update_last_synced_at(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut records = self.records.lock().map_err(|_| Error::LockPoisoned {
            context: "repository store".to_string(),
        })?;
        match records.get_mut(id) {
            Some(record) => {
                record.last_synced_at = Some(at);
                Ok(())
            }
            None => Err(Error::RepositoryNotFound {
                repository_id: id.to_string(),
            }),
        }
    }
}
