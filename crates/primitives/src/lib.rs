//! # tonnect-primitives
//!
//! Core TON value types shared by the rest of the kit: account addresses,
//! nanoton amounts, network ids, a bag-of-cells codec for message payloads
//! and the jetton transfer body layout built on top of it.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod address;
pub mod boc;
pub mod coins;
pub mod jetton;
pub mod network;

pub use address::{AddressError, TonAddress};
pub use boc::{Boc, BocError, Cell, CellBuilder, CellSlice};
pub use coins::Coins;
pub use jetton::{JettonNotification, JettonTransfer};
pub use network::{Network, WalletId};
