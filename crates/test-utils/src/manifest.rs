//! A manifest host for connect tests.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::task::JoinHandle;
use tonnect_protocol::AppManifest;
use url::Url;

/// A plausible dApp manifest for tests.
pub fn sample_manifest() -> AppManifest {
    AppManifest {
        url: "https://app.example".into(),
        name: "Example dApp".into(),
        icon_url: "https://app.example/icon.png".into(),
        description: Some("Example dApp for wallet tests".into()),
        terms_of_use_url: None,
        privacy_policy_url: None,
    }
}

struct ManifestState {
    status: StatusCode,
    body: String,
    hits: AtomicU64,
}

async fn serve_manifest(State(state): State<Arc<ManifestState>>) -> (StatusCode, String) {
    state.hits.fetch_add(1, Ordering::Relaxed);
    (state.status, state.body.clone())
}

/// Hosts one dApp manifest on an ephemeral local port.
pub struct ManifestServer {
    addr: SocketAddr,
    state: Arc<ManifestState>,
    server: JoinHandle<()>,
}

impl ManifestServer {
    /// Serves the manifest the way a dApp would.
    pub async fn serve(manifest: &AppManifest) -> Self {
        let body = serde_json::to_string(manifest).expect("serialize manifest");
        Self::with_response(StatusCode::OK, body).await
    }

    /// Serves an arbitrary response, for the fetch-failure paths.
    pub async fn with_response(status: StatusCode, body: impl Into<String>) -> Self {
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind manifest server");
        let addr = listener.local_addr().expect("manifest server local addr");
        let state = Arc::new(ManifestState { status, body: body.into(), hits: AtomicU64::new(0) });
        let app = Router::new()
            .route("/tonconnect-manifest.json", get(serve_manifest))
            .with_state(state.clone());
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, state, server }
    }

    /// The url a connect request would carry.
    pub fn manifest_url(&self) -> Url {
        format!("http://{}/tonconnect-manifest.json", self.addr).parse().expect("manifest url")
    }

    /// How many times the manifest was fetched.
    pub fn hits(&self) -> u64 {
        self.state.hits.load(Ordering::Relaxed)
    }
}

impl Drop for ManifestServer {
    fn drop(&mut self) {
        self.server.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_the_manifest() {
        let server = ManifestServer::serve(&sample_manifest()).await;
        let body = reqwest::get(server.manifest_url()).await.unwrap().text().await.unwrap();
        let manifest: AppManifest = serde_json::from_str(&body).unwrap();
        assert_eq!(manifest, sample_manifest());
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn canned_failures_come_back_as_is() {
        let server = ManifestServer::with_response(StatusCode::NOT_FOUND, "gone").await;
        let response = reqwest::get(server.manifest_url()).await.unwrap();
        assert_eq!(response.status().as_u16(), 404);
    }
}
