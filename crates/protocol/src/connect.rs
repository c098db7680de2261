//! Connection establishment: what a dApp asks for and what the wallet
//! provides.

use serde::{Deserialize, Serialize};
use tonnect_primitives::{Boc, Network, TonAddress};
use url::Url;

/// The connection request embedded in a connect link or injected handshake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    /// Where the dApp's manifest lives. The wallet fetches and shows it
    /// before asking the user to approve.
    pub manifest_url: Url,
    pub items: Vec<ConnectItem>,
}

/// One requested connection item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ConnectItem {
    /// The dApp wants the wallet address.
    TonAddr,
    /// The dApp wants an ownership proof over its payload.
    TonProof { payload: String },
    /// An item this implementation does not know. Kept so a request with a
    /// foreign item still decodes and the known items can be answered.
    #[serde(untagged)]
    Unknown(serde_json::Value),
}

/// One item in the `connect` event reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ConnectItemReply {
    TonAddr(TonAddrItem),
    TonProof(TonProofItem),
}

/// The wallet's account details.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TonAddrItem {
    pub address: TonAddress,
    pub network: Network,
    /// Hex-encoded 32-byte public key of the wallet contract.
    pub public_key: String,
    pub wallet_state_init: Boc,
}

/// An address ownership proof.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TonProofItem {
    pub proof: TonProof,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TonProof {
    /// Unix seconds at signing time.
    pub timestamp: u64,
    pub domain: ProofDomain,
    /// Base64-encoded ed25519 signature.
    pub signature: String,
    /// The dApp's challenge payload, echoed back.
    pub payload: String,
}

/// The dApp domain the proof is bound to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofDomain {
    pub length_bytes: u32,
    pub value: String,
}

impl ProofDomain {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self { length_bytes: value.len() as u32, value }
    }
}
