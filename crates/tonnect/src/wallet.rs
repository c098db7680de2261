//! The signing seam between the engine and the host wallet.
//!
//! The engine never sees a private key. Everything that needs one goes
//! through [`WalletAdapter`], which the host implements over its keystore,
//! hardware wallet or remote signer. The digest helpers here define the
//! exact bytes each signature covers, so adapters that sign raw digests
//! and verifiers on the dApp side agree without re-deriving the scheme.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tonnect_primitives::{Boc, Network, TonAddress, WalletId};
use tonnect_protocol::{SignDataPayload, TransactionRequest, WalletError};

/// Domain separator of address ownership proofs.
const PROOF_ITEM_PREFIX: &[u8] = b"ton-proof-item-v2/";
const PROOF_OUTER_PREFIX: &[u8] = b"ton-connect";

/// Domain separator of arbitrary-data signatures.
const SIGN_DATA_PREFIX: &[u8] = b"ton-connect/sign-data/";

/// What the host wallet provides to the engine.
///
/// The account facts are synchronous because the engine consults them on
/// every inbound request; adapters backed by something remote cache them
/// up front (see `RemoteWallet`). The signing operations are async and
/// may take arbitrarily long, a hardware wallet confirmation included.
#[async_trait::async_trait]
pub trait WalletAdapter: Send + Sync + 'static {
    /// The wallet contract's ed25519 public key.
    fn public_key(&self) -> [u8; 32];

    fn network(&self) -> Network;

    fn address(&self) -> TonAddress;

    fn wallet_id(&self) -> WalletId {
        WalletId::new(self.network(), self.address())
    }

    /// The contract's state init, sent to dApps in the address item.
    async fn state_init(&self) -> eyre::Result<Boc>;

    /// Builds and signs the external message for a transaction request,
    /// returning its bag of cells. With [`SignOptions::fake_signature`] the
    /// wallet must zero the signature so the result can be emulated but
    /// never sent.
    async fn signed_send_transaction(
        &self,
        request: &TransactionRequest,
        options: &SignOptions,
    ) -> eyre::Result<Boc>;

    /// Signs [`sign_data_digest`] of the payload.
    async fn signed_sign_data(
        &self,
        payload: &SignDataPayload,
        meta: &SignDataMeta,
    ) -> eyre::Result<[u8; 64]>;

    /// Signs [`ton_proof_digest`] of the challenge.
    async fn signed_ton_proof(&self, challenge: &ProofChallenge) -> eyre::Result<[u8; 64]>;
}

/// Options for [`WalletAdapter::signed_send_transaction`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SignOptions {
    /// Replace the signature with zero bytes.
    pub fake_signature: bool,
}

/// The context an arbitrary-data signature is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignDataMeta {
    /// The dApp domain, as stored on the session.
    pub domain: String,
    /// Unix seconds at signing time.
    pub timestamp: u64,
}

/// An address ownership challenge from a connect request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofChallenge {
    /// The dApp's opaque challenge payload.
    pub payload: String,
    /// The dApp domain, from its manifest url.
    pub domain: String,
    /// Unix seconds at signing time.
    pub timestamp: u64,
}

/// The digest an address ownership proof signs.
///
/// `sha256(0xffff ++ "ton-connect" ++ sha256("ton-proof-item-v2/" ++
/// workchain ++ account ++ domain_len ++ domain ++ timestamp ++ payload))`
/// with the workchain big endian and the domain length and timestamp
/// little endian, as the dApp SDKs verify it.
pub fn ton_proof_digest(address: &TonAddress, challenge: &ProofChallenge) -> [u8; 32] {
    let domain = challenge.domain.as_bytes();
    let mut message =
        Vec::with_capacity(PROOF_ITEM_PREFIX.len() + 48 + domain.len() + challenge.payload.len());
    message.extend_from_slice(PROOF_ITEM_PREFIX);
    message.extend_from_slice(&i32::from(address.workchain()).to_be_bytes());
    message.extend_from_slice(address.account_id());
    message.extend_from_slice(&(domain.len() as u32).to_le_bytes());
    message.extend_from_slice(domain);
    message.extend_from_slice(&challenge.timestamp.to_le_bytes());
    message.extend_from_slice(challenge.payload.as_bytes());

    let mut outer = Vec::with_capacity(2 + PROOF_OUTER_PREFIX.len() + 32);
    outer.extend_from_slice(&[0xff, 0xff]);
    outer.extend_from_slice(PROOF_OUTER_PREFIX);
    outer.extend_from_slice(&Sha256::digest(&message));
    Sha256::digest(&outer).into()
}

/// The digest an arbitrary-data signature signs.
///
/// Text and binary payloads hash
/// `0xffff ++ "ton-connect/sign-data/" ++ workchain ++ account ++
/// domain_len ++ domain ++ timestamp ++ tag ++ content_len ++ content`
/// with every integer big endian and `tag` either `txt` or `bin`. Cell
/// payloads sign the cell's representation hash directly, so on-chain code
/// can check the signature against the same cell.
///
/// Fails with a bad-request error when the payload itself is malformed,
/// which callers surface to the dApp unchanged.
pub fn sign_data_digest(
    address: &TonAddress,
    payload: &SignDataPayload,
    meta: &SignDataMeta,
) -> Result<[u8; 32], WalletError> {
    let (tag, content): (&[u8; 3], Vec<u8>) = match payload {
        SignDataPayload::Text { text } => (b"txt", text.as_bytes().to_vec()),
        SignDataPayload::Binary { bytes } => {
            let decoded = STANDARD
                .decode(bytes)
                .map_err(|e| WalletError::bad_request(format!("sign data bytes: {e}")))?;
            (b"bin", decoded)
        }
        SignDataPayload::Cell { cell, .. } => {
            let root = cell
                .parse_root()
                .map_err(|e| WalletError::bad_request(format!("sign data cell: {e}")))?;
            return Ok(root.repr_hash());
        }
    };

    let domain = meta.domain.as_bytes();
    let mut message =
        Vec::with_capacity(2 + SIGN_DATA_PREFIX.len() + 55 + domain.len() + content.len());
    message.extend_from_slice(&[0xff, 0xff]);
    message.extend_from_slice(SIGN_DATA_PREFIX);
    message.extend_from_slice(&i32::from(address.workchain()).to_be_bytes());
    message.extend_from_slice(address.account_id());
    message.extend_from_slice(&(domain.len() as u32).to_be_bytes());
    message.extend_from_slice(domain);
    message.extend_from_slice(&meta.timestamp.to_be_bytes());
    message.extend_from_slice(tag);
    message.extend_from_slice(&(content.len() as u32).to_be_bytes());
    message.extend_from_slice(&content);
    Ok(Sha256::digest(&message).into())
}
