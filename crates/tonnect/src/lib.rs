//! # tonnect
//!
//! The wallet-side connection kit for TON dApps: session and request
//! lifecycle over relay, injected and reverse-RPC transports, with
//! emulation-backed money-flow previews for transaction requests.
//!
//! The crate wires the protocol, session, transport, emulation and
//! validator crates into one engine behind [`WalletKit`]. A host wallet
//! supplies a [`WalletAdapter`] over its keys, a session store and its
//! event listeners; everything between payload decode and signature lives
//! here. See [`WalletKit`] for the entry point.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod config;
mod engine;
pub mod error;
pub mod events;
pub mod intents;
mod kit;
mod manifest;
pub mod preview;
mod remote;
pub mod requests;
pub mod wallet;

pub use config::{KitConfig, MismatchPolicy};
pub use error::KitError;
pub use events::{
    ConnectRequestEvent, DisconnectEvent, RequestErrorEvent, SignDataRequestEvent, Subscription,
    TransactionRequestEvent,
};
pub use intents::{ConnectIntent, Intent, IntentError, TransferIntent};
pub use kit::WalletKit;
pub use preview::Preview;
pub use remote::RemoteWallet;
pub use requests::{ActionKind, PendingId, PendingRequest, RequestState};
pub use wallet::{
    sign_data_digest, ton_proof_digest, ProofChallenge, SignDataMeta, SignOptions, WalletAdapter,
};

// The subsystem crates, re-exported for hosts that need more than the kit
// surface.
pub use tonnect_emulation as emulation;
pub use tonnect_primitives as primitives;
pub use tonnect_protocol as protocol;
pub use tonnect_sessions as sessions;
pub use tonnect_transports as transports;
pub use tonnect_validator as validator;
