//! Shared test utilities for integration and E2E tests.
//!
//! This module provides an in-process fake git remote and raw-content host so
//! the refresh pipeline can be exercised end to end without network access.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let remote = FakeRemote::with_manifest(r#"{"name":"demo"}"#);
//! let fixture = PipelineFixture::new(remote);
//! ```

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use manifest_sync::config::SyncConfig;
use manifest_sync::error::{Error, Result};
use manifest_sync::fetch::RawFileFetcher;
use manifest_sync::git::GitOperations;
use manifest_sync::pipeline::RefreshPipeline;
use manifest_sync::repository::{InMemoryRepositoryStore, RepositoryHandle};
use url::Url;

/// Re-export commonly used test helpers for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use super::{FakeFetcher, FakeRemote, PipelineFixture, Rendezvous};
    #[allow(unused_imports)]
    pub use manifest_sync::mirror::MirrorKind;
    #[allow(unused_imports)]
    pub use manifest_sync::repository::{RepositoryHandle, RepositoryStore};
    #[allow(unused_imports)]
    pub use std::sync::atomic::Ordering;
}

/// File inside a fake working copy recording its checked-out revision.
const HEAD_FILE: &str = "FAKE_HEAD";

/// Lets `expected` threads proceed only once all of them have arrived.
pub struct Rendezvous {
    arrived: Mutex<usize>,
    all_arrived: Condvar,
    expected: usize,
}

impl Rendezvous {
    pub fn new(expected: usize) -> Arc<Self> {
        Arc::new(Self {
            arrived: Mutex::new(0),
            all_arrived: Condvar::new(),
            expected,
        })
    }

    /// Returns false if the other parties did not arrive within `timeout`.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut arrived = self.arrived.lock().unwrap();
        *arrived += 1;
        self.all_arrived.notify_all();
        let (arrived, result) = self
            .all_arrived
            .wait_timeout_while(arrived, timeout, |n| *n < self.expected)
            .unwrap();
        drop(arrived);
        !result.timed_out()
    }
}

/// An in-memory git remote with a linear history of manifest revisions.
#[derive(Default)]
pub struct FakeRemote {
    /// `(revision, manifest content)` pairs, oldest first.
    commits: Mutex<Vec<(String, Option<String>)>>,
    pub clones: AtomicUsize,
    pub pulls: AtomicUsize,
    pub fetches: AtomicUsize,
    pub checkouts: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub fail_clones: AtomicBool,
    clone_delay: Mutex<Option<Duration>>,
    rendezvous: Mutex<Option<Arc<Rendezvous>>>,
}

#[allow(dead_code)]
impl FakeRemote {
    /// A remote whose only commit publishes `manifest`.
    pub fn with_manifest(manifest: &str) -> Arc<Self> {
        let remote = Arc::new(Self::default());
        remote.commit(Some(manifest));
        remote
    }

    /// A remote whose only commit has no manifest file.
    pub fn without_manifest() -> Arc<Self> {
        let remote = Arc::new(Self::default());
        remote.commit(None);
        remote
    }

    /// Appends a commit and returns its revision.
    pub fn commit(&self, manifest: Option<&str>) -> String {
        let mut commits = self.commits.lock().unwrap();
        let revision = format!("{:040x}", commits.len() + 1);
        commits.push((revision.clone(), manifest.map(str::to_string)));
        revision
    }

    pub fn head(&self) -> Option<String> {
        self.commits.lock().unwrap().last().map(|(rev, _)| rev.clone())
    }

    pub fn set_clone_delay(&self, delay: Duration) {
        *self.clone_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_rendezvous(&self, rendezvous: Arc<Rendezvous>) {
        *self.rendezvous.lock().unwrap() = Some(rendezvous);
    }

    fn manifest_at(&self, revision: &str) -> Option<Option<String>> {
        self.commits
            .lock()
            .unwrap()
            .iter()
            .find(|(rev, _)| rev == revision)
            .map(|(_, manifest)| manifest.clone())
    }

    /// Makes `dir` look like a working copy at `revision`.
    fn write_checkout(&self, dir: &Path, revision: &str) -> Result<()> {
        let manifest = self.manifest_at(revision).ok_or_else(|| Error::GitCommand {
            command: format!("checkout {}", revision),
            location: dir.display().to_string(),
            stderr: "reference is not a tree".to_string(),
        })?;
        fs::create_dir_all(dir.join(".git"))?;
        fs::write(dir.join(".git").join(HEAD_FILE), revision)?;
        let manifest_path = dir.join("manifest.json");
        match manifest {
            Some(content) => fs::write(manifest_path, content)?,
            None if manifest_path.exists() => fs::remove_file(manifest_path)?,
            None => {}
        }
        Ok(())
    }
}

impl GitOperations for FakeRemote {
    fn clone_repository(&self, url: &str, target_dir: &Path) -> Result<()> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let result = (|| {
            let rendezvous = self.rendezvous.lock().unwrap().clone();
            if let Some(rendezvous) = rendezvous {
                if !rendezvous.wait(Duration::from_secs(5)) {
                    return Err(Error::GitCommand {
                        command: "clone".to_string(),
                        location: url.to_string(),
                        stderr: "rendezvous timed out".to_string(),
                    });
                }
            }
            let delay = *self.clone_delay.lock().unwrap();
            if let Some(delay) = delay {
                thread::sleep(delay);
            }
            if self.fail_clones.load(Ordering::SeqCst) {
                return Err(Error::GitCommand {
                    command: "clone".to_string(),
                    location: url.to_string(),
                    stderr: "Could not resolve host".to_string(),
                });
            }
            let head = self.head().ok_or_else(|| Error::GitCommand {
                command: "clone".to_string(),
                location: url.to_string(),
                stderr: "remote is empty".to_string(),
            })?;
            self.write_checkout(target_dir, &head)
        })();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn fetch(&self, _repo_dir: &Path) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pull(&self, repo_dir: &Path) -> Result<()> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        let head = self.head().unwrap_or_default();
        self.write_checkout(repo_dir, &head)
    }

    fn checkout(&self, repo_dir: &Path, revision: &str) -> Result<()> {
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        self.write_checkout(repo_dir, revision)
    }

    fn local_head(&self, repo_dir: &Path) -> Result<Option<String>> {
        Ok(Some(fs::read_to_string(repo_dir.join(".git").join(HEAD_FILE))?))
    }

    fn remote_head(&self, _url: &str) -> Result<Option<String>> {
        Ok(self.head())
    }

    fn default_branch(&self, _url: &str) -> Result<String> {
        Ok("main".to_string())
    }
}

/// Serves `<...>/<revision>/manifest.json` from a `FakeRemote`.
pub struct FakeFetcher {
    remote: Arc<FakeRemote>,
    pub downloads: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(remote: Arc<FakeRemote>) -> Arc<Self> {
        Arc::new(Self {
            remote,
            downloads: AtomicUsize::new(0),
        })
    }
}

impl RawFileFetcher for FakeFetcher {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let not_found = || Error::Network {
            url: url.to_string(),
            message: "unexpected status 404 Not Found".to_string(),
        };

        let segments: Vec<&str> = url.path_segments().ok_or_else(not_found)?.collect();
        let revision = match segments.as_slice() {
            [.., revision, "manifest.json"] => *revision,
            _ => return Err(not_found()),
        };
        let revision = if revision == "main" {
            self.remote.head().ok_or_else(not_found)?
        } else {
            revision.to_string()
        };

        match self.remote.manifest_at(&revision) {
            Some(Some(content)) => Ok(content.into_bytes()),
            _ => Err(not_found()),
        }
    }
}

/// A pipeline over a fake remote, rooted in a temporary directory.
pub struct PipelineFixture {
    pub temp_dir: tempfile::TempDir,
    pub remote: Arc<FakeRemote>,
    pub fetcher: Arc<FakeFetcher>,
    pub store: Arc<InMemoryRepositoryStore>,
    pub pipeline: RefreshPipeline,
}

#[allow(dead_code)]
impl PipelineFixture {
    pub fn new(remote: Arc<FakeRemote>) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(InMemoryRepositoryStore::new());
        let fetcher = FakeFetcher::new(remote.clone());
        let pipeline = Self::build(temp_dir.path(), &remote, &fetcher, &store);
        Self {
            temp_dir,
            remote,
            fetcher,
            store,
            pipeline,
        }
    }

    /// A second pipeline over the same mirror root and store, with an empty
    /// cache, as after a process restart.
    pub fn restarted(&self) -> RefreshPipeline {
        Self::build(self.temp_dir.path(), &self.remote, &self.fetcher, &self.store)
    }

    fn build(
        root: &Path,
        remote: &Arc<FakeRemote>,
        fetcher: &Arc<FakeFetcher>,
        store: &Arc<InMemoryRepositoryStore>,
    ) -> RefreshPipeline {
        let config = SyncConfig {
            mirror_root: root.to_path_buf(),
            ..SyncConfig::default()
        };
        RefreshPipeline::with_operations(&config, remote.clone(), fetcher.clone(), store.clone())
    }

    /// Registers a repository with the store and returns its handle.
    pub fn register(&self, id: &str) -> RepositoryHandle {
        let handle = RepositoryHandle::new(id, &format!("https://github.com/org/{}.git", id));
        self.store.insert(handle.clone()).unwrap();
        handle
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }
}
