//! End-to-end encryption for relayed messages.
//!
//! Each relay session has an x25519 keypair per side; the hex form of the
//! public key doubles as the side's client id on the bridge. A payload is
//! sealed as `nonce || ciphertext` with XChaCha20-Poly1305 under a key
//! hashed from the x25519 shared secret, so a fresh random nonce per
//! message is safe.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

/// Nonce length in bytes, prepended to every sealed message.
pub const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("key is not 32 bytes of hex")]
    BadKey,
    #[error("sealed message is too short to hold a nonce and a tag")]
    TooShort,
    #[error("message failed authentication")]
    Rejected,
}

/// One side's keypair plus the sealing and opening logic.
pub struct SessionCrypto {
    secret: StaticSecret,
    public: PublicKey,
}

impl SessionCrypto {
    pub fn generate() -> Self {
        Self::from_secret_bytes(StaticSecret::random_from_rng(OsRng).to_bytes())
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn from_secret_hex(secret: &str) -> Result<Self, CryptoError> {
        Ok(Self::from_secret_bytes(decode_key(secret)?))
    }

    /// The public key in hex, which is also this side's bridge client id.
    pub fn client_id(&self) -> String {
        hex::encode(self.public.as_bytes())
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.to_bytes())
    }

    /// Seals `plaintext` for the peer identified by its hex public key.
    pub fn seal(&self, peer_hex: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = self.cipher_for(peer_hex)?;
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let mut ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::Rejected)?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.append(&mut ciphertext);
        Ok(sealed)
    }

    /// Opens a sealed message from the peer identified by its hex public key.
    pub fn open(&self, peer_hex: &str, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::TooShort);
        }
        let cipher = self.cipher_for(peer_hex)?;
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        cipher.decrypt(XNonce::from_slice(nonce), ciphertext).map_err(|_| CryptoError::Rejected)
    }

    fn cipher_for(&self, peer_hex: &str) -> Result<XChaCha20Poly1305, CryptoError> {
        let peer = PublicKey::from(decode_key(peer_hex)?);
        let shared = self.secret.diffie_hellman(&peer);
        let key: [u8; 32] = Sha256::digest(shared.as_bytes()).into();
        Ok(XChaCha20Poly1305::new((&key).into()))
    }
}

fn decode_key(hex_str: &str) -> Result<[u8; 32], CryptoError> {
    hex::decode(hex_str)
        .ok()
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(CryptoError::BadKey)
}
