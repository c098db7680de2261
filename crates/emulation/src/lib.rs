//! # tonnect-emulation
//!
//! Talks to a trace emulation endpoint: given a would-be transaction, the
//! endpoint executes it against current chain state and returns the full
//! transaction tree it would cause. The validator consumes that tree; the
//! preview layer shows it.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod actions;
pub mod client;
pub mod types;

pub use actions::{
    Action, CallContractAction, ContractDeployAction, JettonSwapAction, JettonTransferAction,
    TonTransferAction,
};
pub use client::{EmulationClient, EmulationError, HttpEmulationClient, HttpEmulationClientBuilder};
pub use types::{
    AddressBookEntry, AddressMetadata, EmulationRequest, EmulationTrace, Message, MessageContent,
    Opcode, TokenInfo, TraceNode, Transaction, TxDescription,
};
