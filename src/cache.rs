//! In-process caching of validated manifests

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::manifest::ValidatedManifest;
use crate::mirror::MirrorKind;

/// A validated manifest together with the mirror revision it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub repository_id: String,
    pub kind: MirrorKind,
    pub manifest: ValidatedManifest,
    /// `None` for mirror kinds that do not track revisions.
    pub source_revision: Option<String>,
}

type CacheKey = (String, MirrorKind);

/// Last validated manifest per repository id and mirror kind.
///
/// The full and manifest-only mirrors of one repository may sit at different
/// revisions, so each kind has its own entry. Entries never expire on their
/// own. The refresh pipeline invalidates an entry whenever it changes the
/// mirror the entry was read from.
#[derive(Debug, Clone, Default)]
pub struct ManifestCache {
    entries: Arc<Mutex<HashMap<CacheKey, CacheEntry>>>,
}

fn key(repository_id: &str, kind: MirrorKind) -> CacheKey {
    (repository_id.to_string(), kind)
}

impl ManifestCache {
    /// Create a new empty manifest cache
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<CacheKey, CacheEntry>>> {
        self.entries.lock().map_err(|_| Error::LockPoisoned {
            context: "manifest cache".to_string(),
        })
    }

    /// Get the cached manifest for a repository mirror
    pub fn get(&self, repository_id: &str, kind: MirrorKind) -> Result<Option<ValidatedManifest>> {
        Ok(self
            .lock()?
            .get(&key(repository_id, kind))
            .map(|e| e.manifest.clone()))
    }

    /// Get the full cache entry for a repository mirror
    pub fn entry(&self, repository_id: &str, kind: MirrorKind) -> Result<Option<CacheEntry>> {
        Ok(self.lock()?.get(&key(repository_id, kind)).cloned())
    }

    /// Store a manifest, replacing any previous entry for the repository mirror
    pub fn put(
        &self,
        repository_id: &str,
        kind: MirrorKind,
        manifest: ValidatedManifest,
        source_revision: Option<String>,
    ) -> Result<()> {
        let entry = CacheEntry {
            repository_id: repository_id.to_string(),
            kind,
            manifest,
            source_revision,
        };
        self.lock()?.insert(key(repository_id, kind), entry);
        Ok(())
    }

    /// Drop the entry for a repository mirror, if any
    pub fn invalidate(&self, repository_id: &str, kind: MirrorKind) -> Result<()> {
        self.lock()?.remove(&key(repository_id, kind));
        Ok(())
    }

    /// Clear all cached entries
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    /// Get the number of cached entries
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }
}
