//! # Sync Configuration
//!
//! `SyncConfig` collects the few knobs the synchronization engine exposes.
//! It can be read from a YAML file, and every field has a default so an
//! empty file (or no file at all) yields a working configuration:
//!
//! ```yaml
//! mirror_root: /var/lib/manifest-sync
//! manifest_ttl_secs: 120
//! raw_content_host: raw.githubusercontent.com
//! default_cluster: keeling_community
//! http_timeout_secs: 30
//! ```
//!
//! Unknown keys are rejected so typos do not silently fall back to defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::manifest::DEFAULT_CLUSTER;

/// Configuration for the refresh pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Directory under which all mirrors live.
    pub mirror_root: PathBuf,
    /// Freshness window for manifest-only mirrors.
    pub manifest_ttl_secs: u64,
    /// Host substituted into repository addresses for raw downloads.
    pub raw_content_host: String,
    /// Cluster assumed by manifests that do not list any.
    pub default_cluster: String,
    /// Timeout for raw manifest downloads.
    pub http_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mirror_root: defaults::default_mirror_root(),
            manifest_ttl_secs: defaults::MANIFEST_TTL_SECS,
            raw_content_host: defaults::RAW_CONTENT_HOST.to_string(),
            default_cluster: DEFAULT_CLUSTER.to_string(),
            http_timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

impl SyncConfig {
    /// Parses a configuration from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| {
            let message = e.to_string();
            let hint = message.contains("unknown field").then(|| {
                "supported keys are mirror_root, manifest_ttl_secs, raw_content_host, \
                 default_cluster, http_timeout_secs"
                    .to_string()
            });
            Error::ConfigParse { message, hint }
        })
    }

    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn manifest_ttl(&self) -> Duration {
        Duration::from_secs(self.manifest_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
