//! The session record.

use serde::{Deserialize, Serialize};
use std::fmt;
use tonnect_primitives::WalletId;
use tonnect_protocol::AppManifest;
use url::Url;

/// Stable identifier of a session.
///
/// For relay connections this is the dApp's client id on the bridge; for
/// injected connections the frame id; for reverse-RPC connections the peer
/// name the host chose.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// An established dApp connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// The wallet account this session is bound to.
    pub wallet: WalletId,
    pub dapp: DappInfo,
    /// Host of the dApp's manifest url. Injected connections have no
    /// meaningful origin and leave this unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub transport: SessionTransport,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds of the last request or event on this session.
    pub last_activity_at: u64,
    /// Next wallet event id. Event ids must increase for the session's
    /// lifetime so the dApp can discard replays.
    pub next_event_id: u64,
}

impl Session {
    /// Hands out the next event id and advances the counter. The caller is
    /// responsible for persisting the session afterwards.
    pub fn issue_event_id(&mut self) -> u64 {
        let id = self.next_event_id;
        self.next_event_id += 1;
        id
    }

    pub fn touch(&mut self, now: u64) {
        self.last_activity_at = now;
    }
}

/// How the session reaches its dApp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionTransport {
    /// Via an HTTP bridge. Messages are end-to-end encrypted with the
    /// session keys; the dApp's client id doubles as its public key.
    Relay { bridge_url: Url, dapp_client_id: String, wallet_keys: SessionKeys },
    /// Via a page embedded in the wallet, addressed by frame id.
    Injected { frame_id: String },
    /// Via the host application itself.
    ReverseRpc { peer: String },
}

impl SessionTransport {
    /// The session id a connection over this transport is keyed by.
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Relay { dapp_client_id, .. } => SessionId::new(dapp_client_id.clone()),
            Self::Injected { frame_id } => SessionId::new(frame_id.clone()),
            Self::ReverseRpc { peer } => SessionId::new(peer.clone()),
        }
    }
}

/// The wallet-side x25519 keypair of a relay session, hex encoded.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKeys {
    pub public: String,
    pub secret: String,
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys").field("public", &self.public).field("secret", &"…").finish()
    }
}

/// What the wallet remembers about the dApp for display and origin checks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DappInfo {
    pub name: String,
    pub url: String,
    pub icon_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&AppManifest> for DappInfo {
    fn from(manifest: &AppManifest) -> Self {
        Self {
            name: manifest.name.clone(),
            url: manifest.url.clone(),
            icon_url: manifest.icon_url.clone(),
            description: manifest.description.clone(),
        }
    }
}
