//! # CLI Command Implementations
//!
//! Each subcommand of the `manifest-sync` tool lives in its own file and
//! contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and the effective
//!   `SyncConfig` and performs the command's logic by calling into the
//!   `manifest_sync` library.

pub mod fetch;
pub mod validate;
