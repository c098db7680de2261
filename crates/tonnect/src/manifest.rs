//! Fetching dApp manifests.

use std::time::Duration;
use tonnect_protocol::{AppManifest, WalletError};
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches and decodes `tonconnect-manifest.json` documents.
///
/// Failures map onto the two protocol error codes dApp SDKs distinguish:
/// unreachable or non-2xx urls are "manifest not found", a reachable
/// document that does not decode is a "manifest content error".
pub(crate) struct ManifestClient {
    client: reqwest::Client,
}

impl ManifestClient {
    pub(crate) fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client })
    }

    pub(crate) async fn fetch(&self, url: &Url) -> Result<AppManifest, WalletError> {
        let response = self.client.get(url.clone()).send().await.map_err(|err| {
            tracing::debug!(target: "tonnect::engine", %url, %err, "manifest fetch failed");
            WalletError::manifest_not_found()
        })?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(target: "tonnect::engine", %url, %status, "manifest fetch rejected");
            return Err(WalletError::manifest_not_found());
        }
        let body = response.text().await.map_err(|err| {
            tracing::debug!(target: "tonnect::engine", %url, %err, "manifest body unreadable");
            WalletError::manifest_not_found()
        })?;
        serde_json::from_str(&body).map_err(|err| {
            tracing::debug!(target: "tonnect::engine", %url, %err, "manifest does not decode");
            WalletError::manifest_content_error()
        })
    }
}
