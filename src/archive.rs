//! Housekeeping for compressed archives left next to mirror directories.
//!
//! Packaging steps outside this crate may leave `<mirror>.zip` or
//! `<mirror>.tar.gz` beside a mirror. These are removed before any mirror
//! operation so a stale archive is never shipped alongside fresh content.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::Result;

/// Archive suffixes considered stale packaging artifacts.
pub const ARCHIVE_SUFFIXES: [&str; 2] = [".zip", ".tar.gz"];

/// Removes leftover packaging artifacts for a mirror path.
pub trait FileArchive: Send + Sync {
    fn remove_stale_archive(&self, mirror_path: &Path) -> Result<()>;
}

/// Deletes `<mirror_path>.zip` and `<mirror_path>.tar.gz` if present.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFileArchive;

/// Returns the archive paths associated with `mirror_path`.
pub fn archive_paths(mirror_path: &Path) -> Vec<PathBuf> {
    ARCHIVE_SUFFIXES
        .iter()
        .map(|suffix| {
            let mut name = OsString::from(mirror_path.as_os_str());
            name.push(suffix);
            PathBuf::from(name)
        })
        .collect()
}

impl FileArchive for DefaultFileArchive {
    fn remove_stale_archive(&self, mirror_path: &Path) -> Result<()> {
        for archive in archive_paths(mirror_path) {
            match fs::remove_file(&archive) {
                Ok(()) => debug!("Removed stale archive {}", archive.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
