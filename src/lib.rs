//! # Manifest Sync Library
//!
//! This library lets a job-execution platform fetch, validate and reuse the
//! executable manifests (`manifest.json`) published in remote git
//! repositories. It keeps local mirrors of those repositories, refreshes a
//! mirror only when the remote has moved on (or a freshness window has
//! passed), and normalizes each manifest into a bounded schema before any job
//! may use it.
//!
//! ## Quick Example
//!
//! ```
//! use manifest_sync::manifest::{ManifestValidator, ResourceRule};
//!
//! let raw = r#"{"name":"demo","slurm_input_rules":{"time":{"default_value":5}}}"#;
//! let manifest = ManifestValidator::default()
//!     .normalize(raw, "https://github.com/org/demo.git")
//!     .unwrap();
//!
//! assert_eq!(manifest.default_hpc, "keeling_community");
//! match &manifest.slurm_input_rules["time"] {
//!     ResourceRule::Integer(rule) => assert_eq!((rule.min, rule.max, rule.step), (0, 10, 1)),
//!     other => panic!("unexpected rule {:?}", other),
//! }
//! ```
//!
//! ## Core Concepts
//!
//! - **Repositories (`repository`)**: `RepositoryHandle` identifies a remote
//!   repository; `RepositoryStore` is the persistence collaborator that owns
//!   repository records and their last sync time.
//! - **Mirrors (`mirror`, `git`, `fetch`, `archive`)**: `LocalMirrorStore`
//!   manages full git working copies and manifest-only copies on disk.
//! - **Staleness (`staleness`)**: `StalenessOracle` compares revisions with the
//!   remote for full mirrors and applies a time window to manifest-only ones.
//! - **Validation (`manifest`)**: `ManifestValidator` turns raw JSON into a
//!   `ValidatedManifest`, dropping or defaulting invalid rules.
//! - **Caching (`cache`)**: `ManifestCache` memoizes the last validated
//!   manifest per repository and mirror kind.
//! - **Orchestration (`pipeline`)**: `RefreshPipeline` ties everything
//!   together, recovering from a broken mirror once by recreating it.
//!
//! ## Execution Flow
//!
//! A call to `RefreshPipeline::get_manifest`:
//!
//! 1.  Inspects the local mirror and asks the oracle whether it is stale.
//! 2.  Returns the cached manifest if the mirror is fresh and one is cached.
//! 3.  Otherwise takes the repository's refresh lock and creates, updates or
//!     keeps the mirror as needed.
//! 4.  Reads and validates `manifest.json`, caches it and returns it.
//! 5.  On a failed update or read, destroys and recreates the mirror once
//!     before giving up with `FatalSync`.

pub mod archive;
pub mod cache;
pub mod config;
pub mod defaults;
pub mod error;
pub mod fetch;
pub mod git;
pub mod manifest;
pub mod mirror;
pub mod pipeline;
pub mod repository;
pub mod staleness;

#[cfg(test)]
mod manifest_proptest;
