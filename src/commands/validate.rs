//! # Validate Command Implementation
//!
//! This module implements the `validate` subcommand, which normalizes a local
//! `manifest.json` exactly as the refresh pipeline would and prints the
//! validated document. It is a read-only operation that touches neither the
//! network nor the mirror root.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use manifest_sync::config::SyncConfig;
use manifest_sync::manifest::ManifestValidator;

/// Validate a manifest file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the manifest file to validate.
    #[arg(value_name = "FILE", default_value = "manifest.json")]
    pub file: PathBuf,

    /// Repository address recorded when the manifest does not name one.
    #[arg(long, value_name = "URL", default_value = "")]
    pub address: String,

    /// Print compact JSON instead of pretty-printed JSON.
    #[arg(long)]
    pub compact: bool,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs, config: &SyncConfig) -> Result<()> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let manifest = ManifestValidator::new(&config.default_cluster)
        .normalize(&raw, &args.address)
        .with_context(|| format!("Invalid manifest {}", args.file.display()))?;

    let output = if args.compact {
        serde_json::to_string(&manifest)?
    } else {
        serde_json::to_string_pretty(&manifest)?
    };
    println!("{}", output);
    Ok(())
}
