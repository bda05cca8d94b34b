//! # Error Handling
//!
//! This module defines the centralized error type for `manifest-sync`. It uses
//! the `thiserror` library to build a single `Error` enum covering every
//! failure mode of the synchronization engine, with enough context attached
//! to diagnose a failure from a log line alone.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Synchronization failures carry a
//!   [`SyncTarget`] naming the repository id and the mirror kind involved.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! ## Recovery Classes
//!
//! The refresh pipeline distinguishes errors it may repair by destroying and
//! recreating a mirror (`CorruptLocalMirror`, `ManifestMissing`,
//! `RemoteUnreachable` against an existing mirror) from errors that reflect
//! defects in remote content (`ManifestParse`), which are never retried.
//! `FatalSync` is what callers see once the single recovery attempt failed.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::mirror::MirrorKind;

/// Identifies the repository and mirror kind an operation was acting on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncTarget {
    pub repository_id: String,
    pub kind: MirrorKind,
}

impl SyncTarget {
    pub fn new(repository_id: &str, kind: MirrorKind) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            kind,
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} mirror)", self.repository_id, self.kind)
    }
}

/// Main error type for manifest-sync operations
#[derive(Error, Debug)]
pub enum Error {
    /// A network operation (clone, fetch, ls-remote, raw download) failed.
    #[error("Remote unreachable for {target}: {message}")]
    RemoteUnreachable { target: SyncTarget, message: String },

    /// An operation against an existing local mirror (checkout, pull, log,
    /// file read) failed.
    #[error("Corrupt local mirror for {target}: {message}")]
    CorruptLocalMirror { target: SyncTarget, message: String },

    /// The mirror is in place but holds no manifest file.
    #[error("Manifest missing for {target}: {}", path.display())]
    ManifestMissing { target: SyncTarget, path: PathBuf },

    /// The manifest document is not well-formed.
    ///
    /// `origin` names where the document came from: a sync target once the
    /// pipeline has attached one, otherwise a file name or a generic label.
    #[error("Manifest parse error in {origin}: {message}")]
    ManifestParse { origin: String, message: String },

    /// Both the primary attempt and the single recovery attempt failed.
    #[error("Fatal sync error for {target}: {source}")]
    FatalSync {
        target: SyncTarget,
        #[source]
        source: Box<Error>,
    },

    /// The persistence collaborator has no record of the repository.
    #[error("Repository not found: {repository_id}")]
    RepositoryNotFound { repository_id: String },

    /// An error occurred while executing a Git command.
    #[error("Git command failed for {location}: {command} - {stderr}")]
    GitCommand {
        command: String,
        location: String,
        stderr: String,
    },

    /// An error occurred during an HTTP download.
    #[error("Network operation error: {url} - {message}")]
    Network { url: String, message: String },

    /// An error occurred while parsing the sync configuration file.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// An error indicating that a mutex has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Short, stable label for the error class, used in log lines.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Error::RemoteUnreachable { .. } => "remote-unreachable",
            Error::CorruptLocalMirror { .. } => "corrupt-local-mirror",
            Error::ManifestMissing { .. } => "manifest-missing",
            Error::ManifestParse { .. } => "manifest-parse",
            Error::FatalSync { .. } => "fatal-sync",
            Error::RepositoryNotFound { .. } => "repository-not-found",
            Error::GitCommand { .. } => "git-command",
            Error::Network { .. } => "network",
            Error::ConfigParse { .. } => "config-parse",
            Error::LockPoisoned { .. } => "lock-poisoned",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::UrlParse(_) => "url-parse",
        }
    }

    /// Whether a destroy-and-recreate of the mirror may repair this failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::RemoteUnreachable { .. }
                | Error::CorruptLocalMirror { .. }
                | Error::ManifestMissing { .. }
                | Error::Io(_)
        )
    }

    /// Rewrites the origin of a parse error to name the sync target.
    pub(crate) fn with_target(self, target: &SyncTarget) -> Self {
        match self {
            Error::ManifestParse { message, .. } => Error::ManifestParse {
                origin: target.to_string(),
                message,
            },
            other => other,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
