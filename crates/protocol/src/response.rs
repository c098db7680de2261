//! Responses a wallet sends back for app requests.

use crate::{
    error::WalletError,
    request::{RequestId, SignDataPayload},
};
use serde::{Deserialize, Serialize};
use tonnect_primitives::TonAddress;

/// The response envelope: the request id plus either `result` or `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletResponse {
    pub id: RequestId,
    #[serde(flatten)]
    pub result: ResponseResult,
}

impl WalletResponse {
    pub fn success(id: RequestId, result: serde_json::Value) -> Self {
        Self { id, result: ResponseResult::Success(result) }
    }

    pub fn error(id: RequestId, error: WalletError) -> Self {
        Self { id, result: ResponseResult::Error(error) }
    }
}

/// Outcome of an app request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ResponseResult {
    #[serde(rename = "result")]
    Success(serde_json::Value),
    #[serde(rename = "error")]
    Error(WalletError),
}

impl ResponseResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Result body of an approved `signData` request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignDataResult {
    /// Base64-encoded ed25519 signature.
    pub signature: String,
    /// The signing wallet's address in raw form.
    pub address: TonAddress,
    /// Unix seconds at signing time.
    pub timestamp: u64,
    /// The dApp domain the signature is bound to.
    pub domain: String,
    /// The payload that was signed, echoed back.
    pub payload: SignDataPayload,
}
