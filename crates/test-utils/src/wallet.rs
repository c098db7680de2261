//! A deterministic wallet for tests. Signatures are real ed25519; the
//! address is derived from the state init bytes, which is stable and unique
//! per key without implementing contract address hashing.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tonnect_primitives::{Boc, Cell, CellBuilder, TonAddress};

/// Marker stored in the fake code cell.
const TEST_CODE_MARKER: u32 = 0x7e57_c0de;

pub struct TestWallet {
    signing: SigningKey,
}

impl TestWallet {
    /// The fixed wallet most tests share.
    pub fn deterministic() -> Self {
        Self::from_seed([7u8; 32])
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { signing: SigningKey::from_bytes(&seed) }
    }

    pub fn random() -> Self {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// A plausible wallet state init: a marker code cell and a data cell
    /// holding a zero seqno plus the public key.
    pub fn state_init(&self) -> Boc {
        let code = {
            let mut builder = CellBuilder::new();
            builder.store_u32(TEST_CODE_MARKER).expect("code cell");
            Arc::new(builder.build())
        };
        let data = {
            let mut builder = CellBuilder::new();
            builder.store_u32(0).expect("seqno");
            builder.store_raw(&self.public_key(), 256).expect("public key");
            Arc::new(builder.build())
        };
        let root = {
            let mut builder = CellBuilder::new();
            builder.store_bit(false).expect("split depth");
            builder.store_bit(false).expect("special");
            builder.store_bit(true).expect("code flag");
            builder.store_ref(code).expect("code ref");
            builder.store_bit(true).expect("data flag");
            builder.store_ref(data).expect("data ref");
            builder.store_bit(false).expect("library");
            Arc::new(builder.build())
        };
        Boc::from_root(&root).expect("state init bag")
    }

    pub fn address(&self) -> TonAddress {
        let digest: [u8; 32] = Sha256::digest(self.state_init().as_bytes()).into();
        TonAddress::new(0, digest)
    }

    /// The data cell layout, for tests that pick the key back out.
    pub fn data_cell(&self) -> Arc<Cell> {
        let parsed = self.state_init().parse_root().expect("state init root");
        parsed.references()[1].clone()
    }
}
