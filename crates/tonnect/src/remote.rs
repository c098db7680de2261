//! A wallet adapter that lives in the host application.
//!
//! Embedders whose keys sit behind their own process boundary implement
//! [`HostBridge`] and let the kit call back over reverse RPC. The account
//! facts are fetched once at connect time because [`WalletAdapter`] serves
//! them synchronously; every signature stays a live call so the host can
//! put its own confirmation UI in front of it.

use crate::wallet::{ProofChallenge, SignDataMeta, SignOptions, WalletAdapter};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use eyre::{bail, Context as _};
use std::sync::Arc;
use tonnect_primitives::{Boc, Network, TonAddress};
use tonnect_protocol::{SignDataPayload, TransactionRequest};
use tonnect_transports::{HostBridge, ReverseRpcClient};

#[derive(Debug)]
pub struct RemoteWallet<B> {
    client: Arc<ReverseRpcClient<B>>,
    public_key: [u8; 32],
    network: Network,
    address: TonAddress,
}

impl<B: HostBridge + 'static> RemoteWallet<B> {
    /// Fetches the account facts and caches them for the sync accessors.
    pub async fn connect(client: Arc<ReverseRpcClient<B>>) -> eyre::Result<Self> {
        let public_key = client.call("getPublicKey", vec![]).await?;
        let public_key = decode_key(&expect_string(public_key, "public key")?)?;

        let network = client.call("getNetwork", vec![]).await?;
        let network: Network =
            serde_json::from_value(network).context("host returned a bad network id")?;

        let address = client.call("getAddress", vec![]).await?;
        let address: TonAddress = expect_string(address, "address")?
            .parse()
            .context("host returned a bad address")?;

        Ok(Self { client, public_key, network, address })
    }

    pub fn client(&self) -> &Arc<ReverseRpcClient<B>> {
        &self.client
    }
}

#[async_trait::async_trait]
impl<B: HostBridge + 'static> WalletAdapter for RemoteWallet<B> {
    fn public_key(&self) -> [u8; 32] {
        self.public_key
    }

    fn network(&self) -> Network {
        self.network
    }

    fn address(&self) -> TonAddress {
        self.address
    }

    async fn state_init(&self) -> eyre::Result<Boc> {
        let value = self.client.call("getStateInit", vec![]).await?;
        Ok(Boc::from_base64(&expect_string(value, "state init")?)?)
    }

    async fn signed_send_transaction(
        &self,
        request: &TransactionRequest,
        options: &SignOptions,
    ) -> eyre::Result<Boc> {
        let params = vec![serde_json::to_string(request)?, serde_json::to_string(options)?];
        let value = self.client.call("getSignedSendTransaction", params).await?;
        Ok(Boc::from_base64(&expect_string(value, "signed transaction")?)?)
    }

    async fn signed_sign_data(
        &self,
        payload: &SignDataPayload,
        meta: &SignDataMeta,
    ) -> eyre::Result<[u8; 64]> {
        let params = vec![serde_json::to_string(payload)?, serde_json::to_string(meta)?];
        let value = self.client.call("getSignedSignData", params).await?;
        decode_signature(&expect_string(value, "data signature")?)
    }

    async fn signed_ton_proof(&self, challenge: &ProofChallenge) -> eyre::Result<[u8; 64]> {
        let params = vec![serde_json::to_string(challenge)?];
        let value = self.client.call("getSignedTonProof", params).await?;
        decode_signature(&expect_string(value, "proof signature")?)
    }
}

fn expect_string(value: serde_json::Value, what: &str) -> eyre::Result<String> {
    match value {
        serde_json::Value::String(s) => Ok(s),
        other => bail!("host returned {other} for the {what}, expected a string"),
    }
}

fn decode_key(encoded: &str) -> eyre::Result<[u8; 32]> {
    let bytes = hex::decode(encoded).context("public key is not hex")?;
    match <[u8; 32]>::try_from(bytes.as_slice()) {
        Ok(key) => Ok(key),
        Err(_) => bail!("public key is {} bytes, expected 32", bytes.len()),
    }
}

fn decode_signature(encoded: &str) -> eyre::Result<[u8; 64]> {
    let bytes = STANDARD.decode(encoded).context("signature is not base64")?;
    match <[u8; 64]>::try_from(bytes.as_slice()) {
        Ok(signature) => Ok(signature),
        Err(_) => bail!("signature is {} bytes, expected 64", bytes.len()),
    }
}
