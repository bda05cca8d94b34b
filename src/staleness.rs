//! Decides whether a local mirror is out of date.
//!
//! Full mirrors compare revisions against the remote, which costs one
//! `ls-remote` round trip per check. Manifest-only mirrors trust a fixed
//! time window after the last successful sync instead and never touch the
//! network to decide.
//!
//! A check that cannot complete is logged and treated as stale.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::defaults;
use crate::error::SyncTarget;
use crate::git::GitOperations;
use crate::mirror::{MirrorKind, MirrorState};
use crate::repository::RepositoryHandle;

/// Freshness window for manifest-only mirrors.
pub const DEFAULT_MANIFEST_TTL: Duration = Duration::from_secs(defaults::MANIFEST_TTL_SECS);

pub struct StalenessOracle {
    git: Arc<dyn GitOperations>,
    manifest_ttl: Duration,
}

impl StalenessOracle {
    pub fn new(git: Arc<dyn GitOperations>, manifest_ttl: Duration) -> Self {
        Self { git, manifest_ttl }
    }

    pub fn manifest_ttl(&self) -> Duration {
        self.manifest_ttl
    }

    /// Whether the mirror described by `state` should be refreshed.
    pub fn is_stale(&self, handle: &RepositoryHandle, state: &MirrorState, kind: MirrorKind) -> bool {
        self.is_stale_at(handle, state, kind, Utc::now())
    }

    /// Like [`is_stale`](Self::is_stale), evaluated at `now`.
    pub fn is_stale_at(
        &self,
        handle: &RepositoryHandle,
        state: &MirrorState,
        kind: MirrorKind,
        now: DateTime<Utc>,
    ) -> bool {
        let stale = match kind {
            MirrorKind::Full => self.full_mirror_is_stale(handle, state),
            MirrorKind::ManifestOnly => self.manifest_is_stale(handle, now),
        };
        debug!(
            "{} is {}",
            SyncTarget::new(&handle.id, kind),
            if stale { "stale" } else { "fresh" }
        );
        stale
    }

    fn full_mirror_is_stale(&self, handle: &RepositoryHandle, state: &MirrorState) -> bool {
        let remote = match self.git.remote_head(&handle.address) {
            Ok(remote) => remote,
            Err(e) => {
                warn!(
                    "Staleness check for {} could not complete, treating as stale: {}",
                    SyncTarget::new(&handle.id, MirrorKind::Full),
                    e
                );
                return true;
            }
        };
        let Some(remote) = remote else {
            return true;
        };

        let local = state.local_revision.as_deref();
        let remote_disagrees = local != Some(remote.as_str());

        match handle.pinned_revision.as_deref() {
            // Already at the pin: only a moved remote head forces a checkout.
            Some(pinned) if local == Some(pinned) => remote_disagrees,
            Some(_) => true,
            None => remote_disagrees,
        }
    }

    fn manifest_is_stale(&self, handle: &RepositoryHandle, now: DateTime<Utc>) -> bool {
        let elapsed_secs = match handle.last_synced_at {
            Some(at) => now.signed_duration_since(at).num_seconds(),
            None => i64::MAX,
        };
        let ttl_secs = i64::try_from(self.manifest_ttl.as_secs()).unwrap_or(i64::MAX);
        elapsed_secs > ttl_secs
    }
}
