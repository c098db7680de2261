//! The emulation endpoint client.

use crate::types::{EmulationRequest, EmulationTrace};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Endpoints answer with this body when the sending account has no state
/// on chain yet.
const ACCOUNT_NOT_FOUND_MARKER: &str = "Account not found";

/// Errors from trace emulation.
#[derive(Debug, thiserror::Error)]
pub enum EmulationError {
    #[error("the sending account is not deployed on chain")]
    AccountNotFound,
    #[error("emulation endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("malformed emulation response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Emulates a transaction request against current chain state.
#[async_trait]
pub trait EmulationClient: Send + Sync + 'static {
    async fn emulate(&self, request: &EmulationRequest) -> Result<EmulationTrace, EmulationError>;
}

/// [`EmulationClient`] over HTTP.
pub struct HttpEmulationClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpEmulationClient {
    pub fn builder(endpoint: Url) -> HttpEmulationClientBuilder {
        HttpEmulationClientBuilder { endpoint, api_key: None, timeout: DEFAULT_TIMEOUT }
    }

    /// A client with the default timeout and no API key.
    pub fn new(endpoint: Url) -> Result<Self, EmulationError> {
        Self::builder(endpoint).build()
    }
}

/// Configures an [`HttpEmulationClient`].
#[derive(Debug)]
pub struct HttpEmulationClientBuilder {
    endpoint: Url,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpEmulationClientBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpEmulationClient, EmulationError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            if let Ok(value) = HeaderValue::from_str(key) {
                headers.insert("X-Api-Key", value);
            }
        }
        let client =
            reqwest::Client::builder().timeout(self.timeout).default_headers(headers).build()?;
        Ok(HttpEmulationClient { client, endpoint: self.endpoint })
    }
}

#[async_trait]
impl EmulationClient for HttpEmulationClient {
    async fn emulate(&self, request: &EmulationRequest) -> Result<EmulationTrace, EmulationError> {
        tracing::debug!(
            target: "tonnect::emulation",
            from = %request.from,
            messages = request.messages.len(),
            "emulating transaction request"
        );
        let response = self.client.post(self.endpoint.clone()).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_endpoint_error(status.as_u16(), body));
        }
        let body = response.text().await?;
        let trace: EmulationTrace = serde_json::from_str(&body)?;
        tracing::debug!(
            target: "tonnect::emulation",
            transactions = trace.transactions.len(),
            actions = trace.actions.len(),
            "emulation finished"
        );
        Ok(trace)
    }
}

fn classify_endpoint_error(status: u16, body: String) -> EmulationError {
    if body.contains(ACCOUNT_NOT_FOUND_MARKER) {
        EmulationError::AccountNotFound
    } else {
        EmulationError::Endpoint { status, body }
    }
}
