//! # Fetch Command Implementation
//!
//! This module implements the `fetch` subcommand, which runs the refresh
//! pipeline once for a single repository and prints its validated manifest.
//! The repository record lives only for the duration of the command, so the
//! mirror on disk is the only state carried between invocations.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use manifest_sync::config::SyncConfig;
use manifest_sync::mirror::MirrorKind;
use manifest_sync::pipeline::RefreshPipeline;
use manifest_sync::repository::{InMemoryRepositoryStore, RepositoryHandle};

/// Synchronize a repository and print its validated manifest
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Stable repository id, used as the mirror directory name.
    #[arg(long)]
    pub id: String,

    /// Clone address of the repository.
    #[arg(long, value_name = "URL")]
    pub url: String,

    /// Pin the mirror to this revision instead of the default branch.
    #[arg(long, value_name = "REV")]
    pub pin: Option<String>,

    /// Mirror kind: `full` clones the repository, `manifest-only` downloads
    /// just the manifest file.
    #[arg(long, value_name = "KIND", default_value = "full")]
    pub kind: MirrorKind,
}

/// Execute the `fetch` command.
pub fn execute(args: FetchArgs, config: &SyncConfig) -> Result<()> {
    let mut handle = RepositoryHandle::new(&args.id, &args.url);
    if let Some(pin) = &args.pin {
        handle = handle.pinned(pin);
    }

    let store = Arc::new(InMemoryRepositoryStore::new());
    store.insert(handle.clone())?;

    let pipeline = RefreshPipeline::new(config, store)?;
    let manifest = pipeline
        .get_manifest(&handle, args.kind)
        .with_context(|| format!("Failed to fetch manifest for {}", args.id))?;

    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}
