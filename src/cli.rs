//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use manifest_sync::config::SyncConfig;
use manifest_sync::defaults::MIRROR_ROOT_ENV;

use crate::commands;

/// Manifest Sync - Fetch and validate executable manifests from git repositories
#[derive(Parser, Debug)]
#[command(name = "manifest-sync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to a YAML sync configuration file
    #[arg(long, global = true, value_name = "FILE", env = "MANIFEST_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Directory under which mirrors are kept
    #[arg(long, global = true, value_name = "DIR", env = MIRROR_ROOT_ENV)]
    mirror_root: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a local manifest file and print the normalized result
    Validate(commands::validate::ValidateArgs),

    /// Synchronize a repository and print its validated manifest
    Fetch(commands::fetch::FetchArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(self.log_level.as_str()),
        )
        .init();

        let mut config = match &self.config {
            Some(path) => SyncConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => SyncConfig::default(),
        };
        if let Some(root) = self.mirror_root {
            config.mirror_root = root;
        }

        match self.command {
            Commands::Validate(args) => commands::validate::execute(args, &config),
            Commands::Fetch(args) => commands::fetch::execute(args, &config),
        }
    }
}
