//! # tonnect-transports
//!
//! How dApp traffic reaches the wallet and how replies travel back. Three
//! transports exist: an HTTP relay bridge for remote dApps, an injected
//! frame bus for pages embedded in the wallet, and a reverse RPC channel
//! through the host application. All of them publish decrypted inbound
//! payloads on a broadcast channel the engine subscribes to, and all of
//! them deliver outbound payloads addressed by the session's transport
//! binding.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use async_trait::async_trait;
use std::{fmt, time::Duration};
use tokio::sync::broadcast;
use tonnect_sessions::{SessionId, SessionTransport};

pub mod crypto;
pub mod injected;
pub mod relay;
pub mod reverse_rpc;

pub use crypto::{CryptoError, SessionCrypto};
pub use injected::{Frame, FrameBus, InjectedTransport};
pub use relay::{BridgeBatch, BridgeMessage, RelayTransport, RelayTransportBuilder};
pub use reverse_rpc::{
    CorrelationTable, HostBridge, PeerEnvelope, ReverseRpcClient, ReverseRpcTransport,
    DEFAULT_CALL_TIMEOUT,
};

/// Capacity of each transport's inbound broadcast channel.
pub const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Which transport a session or message belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Relay,
    Injected,
    ReverseRpc,
}

impl TransportKind {
    /// The transport that carries sessions with this binding.
    pub fn of(transport: &SessionTransport) -> Self {
        match transport {
            SessionTransport::Relay { .. } => Self::Relay,
            SessionTransport::Injected { .. } => Self::Injected,
            SessionTransport::ReverseRpc { .. } => Self::ReverseRpc,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Relay => "relay",
            Self::Injected => "injected",
            Self::ReverseRpc => "reverse-rpc",
        })
    }
}

/// Where an inbound message came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    Relay {
        /// The wallet keypair that received the message, hex encoded.
        wallet_client_id: String,
        /// The sender's client id on the bridge.
        dapp_client_id: String,
    },
    Injected { frame_id: String },
    ReverseRpc { peer: String },
}

impl Origin {
    /// The session id messages from this origin are correlated under.
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Relay { dapp_client_id, .. } => SessionId::from(dapp_client_id.as_str()),
            Self::Injected { frame_id } => SessionId::from(frame_id.as_str()),
            Self::ReverseRpc { peer } => SessionId::from(peer.as_str()),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Relay { .. } => TransportKind::Relay,
            Self::Injected { .. } => TransportKind::Injected,
            Self::ReverseRpc { .. } => TransportKind::ReverseRpc,
        }
    }
}

/// One decrypted inbound payload, ready for protocol decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub origin: Origin,
    /// The payload as JSON text.
    pub body: String,
}

/// Transport failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("session is not carried by the {expected} transport")]
    WrongTransport { expected: TransportKind },
    #[error("no frame registered under id {0}")]
    UnknownFrame(String),
    #[error("bridge url cannot take path segments")]
    BadBridgeUrl,
    #[error("relay returned status {status}: {body}")]
    Relay { status: u16, body: String },
    #[error("undecodable relay payload: {0}")]
    Envelope(&'static str),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("host answered the call with an error: {0}")]
    Call(#[from] tonnect_protocol::WalletError),
    #[error("no answer from the peer within {0:?}")]
    Timeout(Duration),
    #[error("response channel closed before an answer arrived")]
    Closed,
    #[error("host bridge failed: {0}")]
    Bridge(String),
}

/// A channel between the wallet and its dApp peers.
///
/// Implementations publish inbound traffic on a broadcast channel so any
/// number of engine tasks can observe it, and deliver outbound payloads to
/// the peer a session is bound to.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Whether the transport can currently deliver anything at all.
    fn is_available(&self) -> bool {
        true
    }

    /// A fresh receiver for inbound messages. Messages published before the
    /// call are not replayed.
    fn subscribe(&self) -> broadcast::Receiver<InboundMessage>;

    /// Delivers a JSON payload to the dApp side of `binding`. Takes the
    /// transport binding rather than a whole session so replies can go out
    /// before a session exists, as connect rejections must. Fails with
    /// [`TransportError::WrongTransport`] when the binding belongs to a
    /// different transport.
    async fn send(&self, binding: &SessionTransport, body: &str) -> Result<(), TransportError>;
}
