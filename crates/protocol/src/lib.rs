//! # tonnect-protocol
//!
//! The JSON envelopes exchanged between a dApp and a wallet: app requests,
//! wallet responses, wallet events, connection items and the dApp manifest.
//! These types mirror the wire format exactly; higher layers decide what to
//! do with them.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod connect;
pub mod error;
pub mod event;
pub mod manifest;
pub mod request;
pub mod response;

pub use connect::{
    ConnectItem, ConnectItemReply, ConnectRequest, ProofDomain, TonAddrItem, TonProof,
    TonProofItem,
};
pub use error::{ErrorCode, WalletError};
pub use event::{
    ConnectEventPayload, DeviceInfo, DisconnectPayload, EventBody, Feature, WalletEvent,
};
pub use manifest::AppManifest;
pub use request::{
    AppRequest, RequestId, RequestMethod, RequestPayload, SignDataPayload, TransactionMessage,
    TransactionRequest, MAX_MESSAGES,
};
pub use response::{ResponseResult, SignDataResult, WalletResponse};
