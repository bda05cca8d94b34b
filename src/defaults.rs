//! Default values for manifest-sync configuration.
//!
//! This module provides centralized default values used by the library and
//! the command-line tool, ensuring consistency and avoiding duplication.

use std::path::PathBuf;

/// Environment variable overriding the mirror root.
pub const MIRROR_ROOT_ENV: &str = "MANIFEST_SYNC_ROOT";

/// Seconds a manifest-only mirror stays fresh after a sync.
pub const MANIFEST_TTL_SECS: u64 = 120;

/// Host serving raw file contents for manifest-only mirrors.
pub const RAW_CONTENT_HOST: &str = "raw.githubusercontent.com";

/// Timeout applied to raw manifest downloads.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Returns the default mirror root directory.
///
/// Uses `MANIFEST_SYNC_ROOT` when set, otherwise the platform-appropriate
/// cache directory:
/// - Linux: `~/.cache/manifest-sync` (XDG Base Directory)
/// - macOS: `~/Library/Caches/manifest-sync`
/// - Windows: `{FOLDERID_LocalAppData}\manifest-sync`
///
/// Falls back to `.manifest-sync/manifest-sync` in the current directory if
/// the platform cache directory cannot be determined.
pub fn default_mirror_root() -> PathBuf {
    if let Some(root) = std::env::var_os(MIRROR_ROOT_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(root);
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".manifest-sync"))
        .join("manifest-sync")
}
