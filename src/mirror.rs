//! # Local Mirror Store
//!
//! This module manages on-disk copies of remote repositories. Two kinds of
//! mirror exist side by side under a configured root:
//!
//! - **Full mirrors** (`<root>/<id>`): true git working copies obtained by
//!   cloning. When a handle carries a pinned revision, the working copy is
//!   checked out to exactly that revision after every clone or update.
//! - **Manifest-only mirrors** (`<root>/manifests/<id>`): a directory holding
//!   nothing but `manifest.json`, downloaded from the raw-content host at the
//!   pinned revision or, failing that, the remote's default branch.
//!
//! ## Design
//!
//! The two kinds differ only in how a mirror is created, updated and
//! inspected, so each is a [`MirrorStrategy`]. [`LocalMirrorStore`] owns the
//! directory layout and the lifecycle shared by both kinds (archive
//! housekeeping, wiping partial directories, destroy-and-recreate) and
//! delegates the rest to the strategy selected by [`MirrorKind`].
//!
//! Errors raised here are already classified for the refresh pipeline:
//! network failures become `RemoteUnreachable`, failures against an existing
//! working copy become `CorruptLocalMirror`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::archive::FileArchive;
use crate::error::{Error, Result, SyncTarget};
use crate::fetch::RawFileFetcher;
use crate::git::{raw_manifest_url, GitOperations};
use crate::repository::RepositoryHandle;

/// Name of the manifest file at the root of every mirror.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Sub-directory of the mirror root holding manifest-only mirrors.
pub const MANIFEST_ONLY_DIR: &str = "manifests";

/// The kind of local copy kept for a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorKind {
    /// A full git working copy.
    Full,
    /// A directory holding only the manifest file.
    ManifestOnly,
}

impl fmt::Display for MirrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorKind::Full => write!(f, "full"),
            MirrorKind::ManifestOnly => write!(f, "manifest-only"),
        }
    }
}

impl FromStr for MirrorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full" => Ok(MirrorKind::Full),
            "manifest-only" => Ok(MirrorKind::ManifestOnly),
            other => Err(format!(
                "unknown mirror kind '{}', expected 'full' or 'manifest-only'",
                other
            )),
        }
    }
}

/// Observed state of one mirror, derived from the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MirrorState {
    pub exists_locally: bool,
    /// Revision of the most recent local history entry (full mirrors only).
    pub local_revision: Option<String>,
    /// Modification time of the mirrored manifest file.
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// How one kind of mirror is created, updated and inspected.
pub trait MirrorStrategy: Send + Sync {
    fn kind(&self) -> MirrorKind;

    /// Whether `path` holds a usable mirror of this kind.
    fn is_present(&self, path: &Path) -> bool;

    /// Revision the mirror is at, when the kind tracks one.
    fn local_revision(&self, path: &Path) -> Option<String>;

    /// Populates an empty `path` from the remote.
    fn create(&self, handle: &RepositoryHandle, path: &Path) -> Result<()>;

    /// Brings an existing mirror at `path` up to date.
    fn update(&self, handle: &RepositoryHandle, path: &Path) -> Result<()>;
}

/// Git working copies.
pub struct FullMirror {
    git: Arc<dyn GitOperations>,
}

impl FullMirror {
    pub fn new(git: Arc<dyn GitOperations>) -> Self {
        Self { git }
    }

    fn checkout_pinned(&self, handle: &RepositoryHandle, path: &Path) -> Result<()> {
        if let Some(revision) = &handle.pinned_revision {
            self.git
                .checkout(path, revision)
                .map_err(|e| corrupt(handle, MirrorKind::Full, e))?;
        }
        Ok(())
    }
}

impl MirrorStrategy for FullMirror {
    fn kind(&self) -> MirrorKind {
        MirrorKind::Full
    }

    fn is_present(&self, path: &Path) -> bool {
        path.join(".git").is_dir()
    }

    fn local_revision(&self, path: &Path) -> Option<String> {
        match self.git.local_head(path) {
            Ok(revision) => revision,
            Err(e) => {
                debug!("Could not read local head of {}: {}", path.display(), e);
                None
            }
        }
    }

    fn create(&self, handle: &RepositoryHandle, path: &Path) -> Result<()> {
        self.git
            .clone_repository(&handle.address, path)
            .map_err(|e| unreachable_remote(handle, MirrorKind::Full, e))?;
        self.checkout_pinned(handle, path)
    }

    fn update(&self, handle: &RepositoryHandle, path: &Path) -> Result<()> {
        if handle.pinned_revision.is_some() {
            self.git
                .fetch(path)
                .map_err(|e| unreachable_remote(handle, MirrorKind::Full, e))?;
            self.checkout_pinned(handle, path)
        } else {
            self.git
                .pull(path)
                .map_err(|e| corrupt(handle, MirrorKind::Full, e))
        }
    }
}

/// Single-file copies of `manifest.json` downloaded from a raw-content host.
pub struct ManifestOnlyMirror {
    git: Arc<dyn GitOperations>,
    fetcher: Arc<dyn RawFileFetcher>,
    raw_host: String,
}

impl ManifestOnlyMirror {
    pub fn new(git: Arc<dyn GitOperations>, fetcher: Arc<dyn RawFileFetcher>, raw_host: &str) -> Self {
        Self {
            git,
            fetcher,
            raw_host: raw_host.to_string(),
        }
    }

    /// Pinned revision if set, otherwise the remote's default branch.
    fn resolve_revision(&self, handle: &RepositoryHandle) -> Result<String> {
        match &handle.pinned_revision {
            Some(revision) => Ok(revision.clone()),
            None => self
                .git
                .default_branch(&handle.address)
                .map_err(|e| unreachable_remote(handle, MirrorKind::ManifestOnly, e)),
        }
    }

    fn download(&self, handle: &RepositoryHandle, path: &Path) -> Result<()> {
        let target = SyncTarget::new(&handle.id, MirrorKind::ManifestOnly);
        let revision = self.resolve_revision(handle)?;
        let url = raw_manifest_url(&handle.address, &self.raw_host, &revision).map_err(|e| {
            Error::RemoteUnreachable {
                target: target.clone(),
                message: e.to_string(),
            }
        })?;

        debug!("Downloading {} for {}", url, target);
        let content = self
            .fetcher
            .fetch(&url)
            .map_err(|e| unreachable_remote(handle, MirrorKind::ManifestOnly, e))?;

        // Write beside the final file and rename so readers never see a
        // partially written manifest.
        let write = || -> std::io::Result<()> {
            fs::create_dir_all(path)?;
            let staging = path.join(format!("{}.partial", MANIFEST_FILE));
            fs::write(&staging, &content)?;
            fs::rename(&staging, path.join(MANIFEST_FILE))
        };
        write().map_err(|e| Error::CorruptLocalMirror {
            target,
            message: e.to_string(),
        })
    }
}

impl MirrorStrategy for ManifestOnlyMirror {
    fn kind(&self) -> MirrorKind {
        MirrorKind::ManifestOnly
    }

    fn is_present(&self, path: &Path) -> bool {
        path.join(MANIFEST_FILE).is_file()
    }

    fn local_revision(&self, _path: &Path) -> Option<String> {
        None
    }

    fn create(&self, handle: &RepositoryHandle, path: &Path) -> Result<()> {
        self.download(handle, path)
    }

    fn update(&self, handle: &RepositoryHandle, path: &Path) -> Result<()> {
        self.download(handle, path)
    }
}

fn unreachable_remote(handle: &RepositoryHandle, kind: MirrorKind, cause: Error) -> Error {
    Error::RemoteUnreachable {
        target: SyncTarget::new(&handle.id, kind),
        message: cause.to_string(),
    }
}

fn corrupt(handle: &RepositoryHandle, kind: MirrorKind, cause: Error) -> Error {
    Error::CorruptLocalMirror {
        target: SyncTarget::new(&handle.id, kind),
        message: cause.to_string(),
    }
}

/// Owns the mirror directory tree and the lifecycle of every mirror in it.
pub struct LocalMirrorStore {
    root: PathBuf,
    full: Box<dyn MirrorStrategy>,
    manifest_only: Box<dyn MirrorStrategy>,
    archive: Box<dyn FileArchive>,
}

impl LocalMirrorStore {
    pub fn new(
        root: PathBuf,
        full: Box<dyn MirrorStrategy>,
        manifest_only: Box<dyn MirrorStrategy>,
        archive: Box<dyn FileArchive>,
    ) -> Self {
        Self {
            root,
            full,
            manifest_only,
            archive,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn strategy(&self, kind: MirrorKind) -> &dyn MirrorStrategy {
        match kind {
            MirrorKind::Full => self.full.as_ref(),
            MirrorKind::ManifestOnly => self.manifest_only.as_ref(),
        }
    }

    /// Directory holding the mirror of `handle`.
    pub fn path_for(&self, handle: &RepositoryHandle, kind: MirrorKind) -> PathBuf {
        // Sanitize the id for the filesystem (replace separators with -)
        let safe_id = handle.id.replace(['/', '\\'], "-");
        match kind {
            MirrorKind::Full => self.root.join(safe_id),
            MirrorKind::ManifestOnly => self.root.join(MANIFEST_ONLY_DIR).join(safe_id),
        }
    }

    /// Path of the manifest file inside the mirror of `handle`.
    pub fn manifest_path(&self, handle: &RepositoryHandle, kind: MirrorKind) -> PathBuf {
        self.path_for(handle, kind).join(MANIFEST_FILE)
    }

    /// Reads the current state of a mirror without touching it.
    pub fn inspect(&self, handle: &RepositoryHandle, kind: MirrorKind) -> MirrorState {
        let strategy = self.strategy(kind);
        let path = self.path_for(handle, kind);
        if !strategy.is_present(&path) {
            return MirrorState::default();
        }

        let last_fetched_at = fs::metadata(path.join(MANIFEST_FILE))
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        MirrorState {
            exists_locally: true,
            local_revision: strategy.local_revision(&path),
            last_fetched_at,
        }
    }

    /// Makes sure a mirror exists, creating it if it does not.
    pub fn ensure(&self, handle: &RepositoryHandle, kind: MirrorKind) -> Result<MirrorState> {
        let path = self.path_for(handle, kind);
        self.archive.remove_stale_archive(&path)?;

        if !self.strategy(kind).is_present(&path) {
            info!("Creating {} mirror of {} at {}", kind, handle.id, path.display());
            self.create_clean(handle, kind, &path)?;
        }
        Ok(self.inspect(handle, kind))
    }

    /// Brings an existing mirror up to date.
    pub fn update(&self, handle: &RepositoryHandle, kind: MirrorKind) -> Result<MirrorState> {
        let path = self.path_for(handle, kind);
        self.archive.remove_stale_archive(&path)?;

        info!("Updating {} mirror of {}", kind, handle.id);
        self.strategy(kind).update(handle, &path)?;
        Ok(self.inspect(handle, kind))
    }

    /// Deletes the mirror unconditionally and creates it again from scratch.
    pub fn destroy_and_recreate(
        &self,
        handle: &RepositoryHandle,
        kind: MirrorKind,
    ) -> Result<MirrorState> {
        let path = self.path_for(handle, kind);
        self.archive.remove_stale_archive(&path)?;

        info!("Recreating {} mirror of {} at {}", kind, handle.id, path.display());
        self.create_clean(handle, kind, &path)?;
        Ok(self.inspect(handle, kind))
    }

    fn create_clean(&self, handle: &RepositoryHandle, kind: MirrorKind, path: &Path) -> Result<()> {
        // Remove target directory if it exists (git won't clone into existing non-empty dir)
        if path.exists() {
            fs::remove_dir_all(path)?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.strategy(kind).create(handle, path)
    }
}
