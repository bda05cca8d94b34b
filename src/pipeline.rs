//! # Refresh Pipeline
//!
//! `RefreshPipeline` answers "give me the current manifest for repository R"
//! while touching the network and the mirror as little as possible.
//!
//! ## State Machine
//!
//! Each request walks the mirror through these states:
//!
//! ```text
//! Missing ──create──▶ Fresh
//! Fresh ──oracle──▶ Fresh | Stale
//! Stale ──update──▶ Fresh | Failed
//! Failed ──destroy and recreate (once)──▶ Fresh | fatal error
//! ```
//!
//! - A fresh mirror with a cached manifest is answered from the cache without
//!   touching the disk.
//! - Any successful create or update records the sync time with the
//!   repository store and invalidates the cached manifest.
//! - A failed update, or a failed manifest read against a mirror believed
//!   fresh, triggers exactly one destroy-and-recreate. If that fails too the
//!   caller receives `FatalSync` and the mirror is left as the recreate left it.
//! - A remote that cannot be reached for the very first clone is reported
//!   as-is, since there is nothing local to repair.
//! - Parse errors are never retried; they describe the remote content.
//!
//! ## Concurrency
//!
//! Refreshes of the same repository id are serialized by a per-id lock held
//! for the whole create/update/recover sequence. Different ids never contend.
//! The cache fast path takes no per-id lock. A caller that had to wait for
//! the lock re-checks staleness, since the mirror likely changed meanwhile.
//! Locks are dropped from the registry once no caller holds them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use chrono::Utc;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::archive::DefaultFileArchive;
use crate::cache::ManifestCache;
use crate::config::SyncConfig;
use crate::error::{Error, Result, SyncTarget};
use crate::fetch::{HttpFetcher, RawFileFetcher};
use crate::git::{DefaultGitOperations, GitOperations};
use crate::manifest::{ManifestValidator, ValidatedManifest};
use crate::mirror::{FullMirror, LocalMirrorStore, ManifestOnlyMirror, MirrorKind, MirrorState};
use crate::repository::{RepositoryHandle, RepositoryStore};
use crate::staleness::StalenessOracle;

/// Where a mirror stands before a refresh decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Assessment {
    Missing,
    Fresh,
    Stale,
}

/// One exclusive section per repository id.
#[derive(Debug, Default)]
struct RepositoryLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RepositoryLocks {
    fn registry(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>>> {
        self.locks.lock().map_err(|_| Error::LockPoisoned {
            context: "repository lock registry".to_string(),
        })
    }

    fn for_repository(&self, repository_id: &str) -> Result<Arc<Mutex<()>>> {
        let mut locks = self.registry()?;
        Ok(Arc::clone(
            locks.entry(repository_id.to_string()).or_default(),
        ))
    }

    /// Hands back a lock taken with `for_repository`, removing its registry
    /// entry when no other caller holds it.
    fn release(&self, repository_id: &str, lock: Arc<Mutex<()>>) -> Result<()> {
        let mut locks = self.registry()?;
        // Only the registry and `lock` itself remain.
        if Arc::strong_count(&lock) == 2
            && locks
                .get(repository_id)
                .is_some_and(|held| Arc::ptr_eq(held, &lock))
        {
            locks.remove(repository_id);
        }
        Ok(())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}

/// Keeps mirrors current and hands out validated manifests.
pub struct RefreshPipeline {
    mirrors: LocalMirrorStore,
    oracle: StalenessOracle,
    validator: ManifestValidator,
    cache: ManifestCache,
    repositories: Arc<dyn RepositoryStore>,
    locks: RepositoryLocks,
}

impl RefreshPipeline {
    /// Creates a pipeline using the system `git` binary and HTTP downloads.
    pub fn new(config: &SyncConfig, repositories: Arc<dyn RepositoryStore>) -> Result<Self> {
        let git: Arc<dyn GitOperations> = Arc::new(DefaultGitOperations);
        let fetcher: Arc<dyn RawFileFetcher> = Arc::new(HttpFetcher::new(config.http_timeout())?);
        Ok(Self::with_operations(config, git, fetcher, repositories))
    }

    /// Creates a pipeline over custom git and download implementations.
    pub fn with_operations(
        config: &SyncConfig,
        git: Arc<dyn GitOperations>,
        fetcher: Arc<dyn RawFileFetcher>,
        repositories: Arc<dyn RepositoryStore>,
    ) -> Self {
        let mirrors = LocalMirrorStore::new(
            config.mirror_root.clone(),
            Box::new(FullMirror::new(Arc::clone(&git))),
            Box::new(ManifestOnlyMirror::new(
                Arc::clone(&git),
                fetcher,
                &config.raw_content_host,
            )),
            Box::new(DefaultFileArchive),
        );
        Self::from_parts(
            mirrors,
            StalenessOracle::new(git, config.manifest_ttl()),
            ManifestValidator::new(&config.default_cluster),
            ManifestCache::new(),
            repositories,
        )
    }

    /// Assembles a pipeline from fully constructed components.
    pub fn from_parts(
        mirrors: LocalMirrorStore,
        oracle: StalenessOracle,
        validator: ManifestValidator,
        cache: ManifestCache,
        repositories: Arc<dyn RepositoryStore>,
    ) -> Self {
        Self {
            mirrors,
            oracle,
            validator,
            cache,
            repositories,
            locks: RepositoryLocks::default(),
        }
    }

    pub fn cache(&self) -> &ManifestCache {
        &self.cache
    }

    pub fn mirrors(&self) -> &LocalMirrorStore {
        &self.mirrors
    }

    /// Returns the current validated manifest of `handle`, refreshing its
    /// mirror first if needed.
    pub fn get_manifest(&self, handle: &RepositoryHandle, kind: MirrorKind) -> Result<ValidatedManifest> {
        let state = self.mirrors.inspect(handle, kind);
        let assessment = self.assess(handle, &state, kind);
        if assessment == Assessment::Fresh {
            if let Some(manifest) = self.cached(handle, kind, &state)? {
                debug!("Cache hit for {}", SyncTarget::new(&handle.id, kind));
                return Ok(manifest);
            }
        }

        let lock = self.locks.for_repository(&handle.id)?;
        let result = self.refresh_exclusive(&lock, handle, kind, state, assessment);
        self.locks.release(&handle.id, lock)?;
        result
    }

    /// Resolves `id` through the repository store, then behaves like
    /// [`get_manifest`](Self::get_manifest).
    pub fn get_manifest_by_id(&self, id: &str, kind: MirrorKind) -> Result<ValidatedManifest> {
        let handle = self
            .repositories
            .find_repository(id)?
            .ok_or_else(|| Error::RepositoryNotFound {
                repository_id: id.to_string(),
            })?;
        self.get_manifest(&handle, kind)
    }

    /// Refreshes many repositories in parallel, returning results in input
    /// order.
    pub fn refresh_all(
        &self,
        handles: &[RepositoryHandle],
        kind: MirrorKind,
    ) -> Vec<Result<ValidatedManifest>> {
        handles
            .par_iter()
            .map(|handle| self.get_manifest(handle, kind))
            .collect()
    }

    fn assess(&self, handle: &RepositoryHandle, state: &MirrorState, kind: MirrorKind) -> Assessment {
        if !state.exists_locally {
            Assessment::Missing
        } else if self.oracle.is_stale(handle, state, kind) {
            Assessment::Stale
        } else {
            Assessment::Fresh
        }
    }

    /// The cached manifest of a mirror, if it was read at the mirror's
    /// current revision.
    fn cached(
        &self,
        handle: &RepositoryHandle,
        kind: MirrorKind,
        state: &MirrorState,
    ) -> Result<Option<ValidatedManifest>> {
        Ok(self
            .cache
            .entry(&handle.id, kind)?
            .filter(|entry| entry.source_revision == state.local_revision)
            .map(|entry| entry.manifest))
    }

    /// Runs the refresh under the repository's lock.
    ///
    /// `state` and `assessment` come from the unlocked check and are reused
    /// when the lock was free and the store agrees with `handle`.
    fn refresh_exclusive(
        &self,
        lock: &Mutex<()>,
        handle: &RepositoryHandle,
        kind: MirrorKind,
        state: MirrorState,
        assessment: Assessment,
    ) -> Result<ValidatedManifest> {
        let poisoned = || Error::LockPoisoned {
            context: format!("refresh lock for {}", handle.id),
        };
        let (_guard, waited) = match lock.try_lock() {
            Ok(guard) => (guard, false),
            Err(TryLockError::WouldBlock) => (lock.lock().map_err(|_| poisoned())?, true),
            Err(TryLockError::Poisoned(_)) => return Err(poisoned()),
        };

        // The store holds the sync time recorded by whoever refreshed last.
        let current = self
            .repositories
            .find_repository(&handle.id)?
            .unwrap_or_else(|| handle.clone());

        if !waited && !assessment_inputs_differ(handle, &current, kind) {
            return self.refresh_locked(&current, kind, state, assessment);
        }
        let state = self.mirrors.inspect(&current, kind);
        let assessment = self.assess(&current, &state, kind);
        self.refresh_locked(&current, kind, state, assessment)
    }

    fn refresh_locked(
        &self,
        handle: &RepositoryHandle,
        kind: MirrorKind,
        state: MirrorState,
        assessment: Assessment,
    ) -> Result<ValidatedManifest> {
        let target = SyncTarget::new(&handle.id, kind);

        let state = match assessment {
            Assessment::Missing => match self.mirrors.ensure(handle, kind) {
                Ok(state) => self.synced(handle, kind, state)?,
                Err(e @ Error::RemoteUnreachable { .. }) => return Err(e),
                Err(e) => return self.recover(handle, kind, e),
            },
            Assessment::Stale => match self.mirrors.update(handle, kind) {
                Ok(state) => self.synced(handle, kind, state)?,
                Err(e) => return self.recover(handle, kind, e),
            },
            Assessment::Fresh => {
                if let Some(manifest) = self.cached(handle, kind, &state)? {
                    debug!("Cache hit for {} under refresh lock", target);
                    return Ok(manifest);
                }
                state
            }
        };

        match self.load_manifest(handle, kind, &state) {
            Ok(manifest) => Ok(manifest),
            Err(e) if e.is_recoverable() => self.recover(handle, kind, e),
            Err(e) => Err(e),
        }
    }

    /// Records a successful mirror mutation.
    ///
    /// A store that cannot record the sync time does not fail the request.
    fn synced(&self, handle: &RepositoryHandle, kind: MirrorKind, state: MirrorState) -> Result<MirrorState> {
        self.cache.invalidate(&handle.id, kind)?;
        if let Err(e) = self
            .repositories
            .update_last_synced_at(&handle.id, Utc::now())
        {
            warn!("Could not record sync time for {}: {}", handle.id, e);
        }
        Ok(state)
    }

    /// The single destroy-and-recreate attempt after `cause`.
    fn recover(&self, handle: &RepositoryHandle, kind: MirrorKind, cause: Error) -> Result<ValidatedManifest> {
        let target = SyncTarget::new(&handle.id, kind);
        warn!(
            "Recovering {} after {} failure: {}",
            target,
            cause.kind_label(),
            cause
        );

        let attempt = self
            .mirrors
            .destroy_and_recreate(handle, kind)
            .and_then(|state| self.synced(handle, kind, state))
            .and_then(|state| self.load_manifest(handle, kind, &state));

        match attempt {
            Ok(manifest) => {
                info!("Recovered {}", target);
                Ok(manifest)
            }
            Err(e @ Error::ManifestParse { .. }) => Err(e),
            Err(e) => Err(Error::FatalSync {
                target,
                source: Box::new(e),
            }),
        }
    }

    /// Reads, validates and caches the manifest of a mirror.
    fn load_manifest(
        &self,
        handle: &RepositoryHandle,
        kind: MirrorKind,
        state: &MirrorState,
    ) -> Result<ValidatedManifest> {
        let target = SyncTarget::new(&handle.id, kind);
        let path = self.mirrors.manifest_path(handle, kind);

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ManifestMissing { target, path });
            }
            Err(e) => {
                return Err(Error::CorruptLocalMirror {
                    target,
                    message: format!("cannot read {}: {}", path.display(), e),
                });
            }
        };

        let manifest = self
            .validator
            .normalize(&raw, &handle.address)
            .map_err(|e| e.with_target(&target))?;
        self.cache
            .put(&handle.id, kind, manifest.clone(), state.local_revision.clone())?;
        debug!("Loaded manifest for {}", target);
        Ok(manifest)
    }
}

/// Whether the staleness of `kind` could be judged differently for `current`
/// than for `seen`.
fn assessment_inputs_differ(seen: &RepositoryHandle, current: &RepositoryHandle, kind: MirrorKind) -> bool {
    seen.address != current.address
        || seen.pinned_revision != current.pinned_revision
        || (kind == MirrorKind::ManifestOnly && seen.last_synced_at != current.last_synced_at)
}
