//! The HTTP relay bridge transport.
//!
//! Remote dApps and the wallet never talk directly; both sides post sealed
//! messages to a bridge under their client ids and poll for messages
//! addressed to them. The bridge API this client speaks:
//!
//! * `GET {bridge}/messages?client_id=&after=&wait=` long-polls for sealed
//!   messages addressed to `client_id` with event ids above `after`,
//!   answering `{"messages": [{"event_id", "from", "message"}]}`.
//! * `POST {bridge}/message?client_id=&to=&ttl=` stores a sealed message,
//!   base64 in the request body.
//!
//! One poll task runs per listening wallet keypair. Messages that fail to
//! decrypt are dropped where they arrive; the bridge is untrusted.

use crate::{
    crypto::SessionCrypto, InboundMessage, Origin, Transport, TransportError, TransportKind,
    INBOUND_CHANNEL_CAPACITY,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle};
use tonnect_sessions::{SessionKeys, SessionTransport};
use url::Url;

const DEFAULT_POLL_WAIT: Duration = Duration::from_secs(25);
const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(300);
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const BACKOFF_MIN: Duration = Duration::from_millis(250);
const BACKOFF_MAX: Duration = Duration::from_secs(8);

/// One sealed message as the bridge stores it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMessage {
    pub event_id: u64,
    /// Sender client id, which is also its public key in hex.
    pub from: String,
    /// The sealed payload, base64.
    pub message: String,
}

/// What a poll returns. May be empty when the wait elapsed quietly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeBatch {
    pub messages: Vec<BridgeMessage>,
}

/// Mints a fresh wallet-side keypair for a new relay session.
pub fn generate_session_keys() -> SessionKeys {
    let crypto = SessionCrypto::generate();
    SessionKeys { public: crypto.client_id(), secret: crypto.secret_hex() }
}

/// [`Transport`] over an HTTP bridge.
pub struct RelayTransport {
    client: reqwest::Client,
    inbound: broadcast::Sender<InboundMessage>,
    pollers: Mutex<HashMap<String, JoinHandle<()>>>,
    poll_wait: Duration,
    ttl: Duration,
}

impl RelayTransport {
    pub fn builder() -> RelayTransportBuilder {
        RelayTransportBuilder { poll_wait: DEFAULT_POLL_WAIT, ttl: DEFAULT_MESSAGE_TTL }
    }

    pub fn new() -> Result<Self, TransportError> {
        Self::builder().build()
    }

    /// Starts polling the bridge for messages addressed to `keys`. Starting
    /// an already listening keypair is a no-op.
    pub fn listen(&self, bridge_url: &Url, keys: &SessionKeys) -> Result<(), TransportError> {
        let crypto = SessionCrypto::from_secret_hex(&keys.secret)?;
        let client_id = crypto.client_id();
        let mut pollers = self.pollers.lock();
        if let Some(handle) = pollers.get(&client_id) {
            if !handle.is_finished() {
                return Ok(());
            }
        }
        let handle = tokio::spawn(poll_loop(
            self.client.clone(),
            bridge_url.clone(),
            crypto,
            self.inbound.clone(),
            self.poll_wait,
        ));
        pollers.insert(client_id, handle);
        Ok(())
    }

    /// Stops the poll task of one keypair. Returns false when none ran.
    pub fn stop(&self, client_id: &str) -> bool {
        match self.pollers.lock().remove(client_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        for (_, handle) in self.pollers.lock().drain() {
            handle.abort();
        }
    }

    /// Client ids currently being polled for.
    pub fn listening(&self) -> Vec<String> {
        self.pollers.lock().keys().cloned().collect()
    }
}

impl Drop for RelayTransport {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Configures a [`RelayTransport`].
#[derive(Debug)]
pub struct RelayTransportBuilder {
    poll_wait: Duration,
    ttl: Duration,
}

impl RelayTransportBuilder {
    /// How long one poll is allowed to hang before the bridge answers empty.
    pub fn poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait = wait;
        self
    }

    /// How long the bridge keeps an undelivered outbound message.
    pub fn message_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn build(self) -> Result<RelayTransport, TransportError> {
        let client = reqwest::Client::builder().build()?;
        let (inbound, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
        Ok(RelayTransport {
            client,
            inbound,
            pollers: Mutex::new(HashMap::new()),
            poll_wait: self.poll_wait,
            ttl: self.ttl,
        })
    }
}

#[async_trait]
impl Transport for RelayTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Relay
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.inbound.subscribe()
    }

    async fn send(&self, binding: &SessionTransport, body: &str) -> Result<(), TransportError> {
        let SessionTransport::Relay { bridge_url, dapp_client_id, wallet_keys } = binding else {
            return Err(TransportError::WrongTransport { expected: TransportKind::Relay });
        };
        let crypto = SessionCrypto::from_secret_hex(&wallet_keys.secret)?;
        let sealed = crypto.seal(dapp_client_id, body.as_bytes())?;

        let mut url = endpoint(bridge_url, "message")?;
        url.query_pairs_mut()
            .append_pair("client_id", &wallet_keys.public)
            .append_pair("to", dapp_client_id)
            .append_pair("ttl", &self.ttl.as_secs().to_string());
        tracing::debug!(
            target: "tonnect::relay",
            to = %dapp_client_id,
            bytes = sealed.len(),
            "posting message to bridge"
        );
        let response =
            self.client.post(url).timeout(SEND_TIMEOUT).body(STANDARD.encode(sealed)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Relay { status: status.as_u16(), body });
        }
        Ok(())
    }
}

async fn poll_loop(
    client: reqwest::Client,
    bridge_url: Url,
    crypto: SessionCrypto,
    inbound: broadcast::Sender<InboundMessage>,
    wait: Duration,
) {
    let client_id = crypto.client_id();
    let mut after = 0u64;
    let mut backoff = BACKOFF_MIN;
    loop {
        match poll_once(&client, &bridge_url, &client_id, after, wait).await {
            Ok(batch) => {
                backoff = BACKOFF_MIN;
                for message in batch.messages {
                    after = after.max(message.event_id);
                    match decode_envelope(&crypto, &message) {
                        Ok(body) => {
                            let inbound_message = InboundMessage {
                                origin: Origin::Relay {
                                    wallet_client_id: client_id.clone(),
                                    dapp_client_id: message.from,
                                },
                                body,
                            };
                            // nobody listening yet is fine
                            let _ = inbound.send(inbound_message);
                        }
                        Err(err) => {
                            tracing::warn!(
                                target: "tonnect::relay",
                                from = %message.from,
                                %err,
                                "dropping undecodable relay message"
                            );
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(target: "tonnect::relay", %err, "bridge poll failed, backing off");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(BACKOFF_MAX);
            }
        }
    }
}

async fn poll_once(
    client: &reqwest::Client,
    bridge_url: &Url,
    client_id: &str,
    after: u64,
    wait: Duration,
) -> Result<BridgeBatch, TransportError> {
    let mut url = endpoint(bridge_url, "messages")?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("after", &after.to_string())
        .append_pair("wait", &wait.as_secs().to_string());
    let response = client.get(url).timeout(wait + SEND_TIMEOUT).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Relay { status: status.as_u16(), body });
    }
    Ok(response.json().await?)
}

fn decode_envelope(
    crypto: &SessionCrypto,
    message: &BridgeMessage,
) -> Result<String, TransportError> {
    let sealed = STANDARD
        .decode(&message.message)
        .map_err(|_| TransportError::Envelope("payload is not base64"))?;
    let plaintext = crypto.open(&message.from, &sealed)?;
    String::from_utf8(plaintext).map_err(|_| TransportError::Envelope("plaintext is not utf-8"))
}

fn endpoint(base: &Url, segment: &str) -> Result<Url, TransportError> {
    let mut url = base.clone();
    url.path_segments_mut().map_err(|_| TransportError::BadBridgeUrl)?.pop_if_empty().push(segment);
    Ok(url)
}
