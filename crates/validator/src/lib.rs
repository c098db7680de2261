//! # tonnect-validator
//!
//! Re-derives what a transaction request moves, twice: once locally from the
//! request itself and once from the emulation trace, then compares the two.
//! A dApp that understates what it asks the wallet to sign shows up here as
//! a mismatch before the user ever sees a preview.
//!
//! Everything in this crate is pure; emulation IO happens upstream.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod flow;
pub mod verdict;

pub use flow::{emulated_flow, expected_flow, AssetType, FlowEntry, JettonKey, MoneyFlow};
pub use verdict::{compare, validate, FlowMismatch, UnverifiedReason, Validation, Verdict};
