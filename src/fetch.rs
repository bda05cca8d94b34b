//! Raw-file retrieval over HTTP for manifest-only mirrors.

use std::time::Duration;

use reqwest::blocking::Client;
use url::Url;

use crate::error::{Error, Result};

/// Downloads a single file by URL.
pub trait RawFileFetcher: Send + Sync {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

/// A `RawFileFetcher` backed by a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("manifest-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network {
                url: String::new(),
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

impl RawFileFetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let network_error = |message: String| Error::Network {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url.as_str())
            .send()
            .map_err(|e| network_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(network_error(format!("unexpected status {}", status)));
        }

        let body = response.bytes().map_err(|e| network_error(e.to_string()))?;
        Ok(body.to_vec())
    }
}
