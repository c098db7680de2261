//! Jetton (fungible token) message bodies.
//!
//! Only the transfer body is decoded in full; the remaining opcodes are
//! recognized so callers can classify traffic without parsing it.

use crate::{
    address::TonAddress,
    boc::{BocError, Cell},
    coins::Coins,
};

/// Well-known jetton wallet opcodes.
pub mod ops {
    /// Owner asks its jetton wallet to move tokens.
    pub const TRANSFER: u32 = 0x0f8a7ea5;
    /// Jetton wallet to jetton wallet movement.
    pub const INTERNAL_TRANSFER: u32 = 0x178d4519;
    /// Receiving wallet notifies its owner of an incoming transfer.
    pub const TRANSFER_NOTIFICATION: u32 = 0x7362d09c;
    /// Leftover gas returned to the response destination.
    pub const EXCESSES: u32 = 0xd53276db;
}

/// Reads the opcode without committing to any body layout.
pub fn peek_op(cell: &Cell) -> Option<u32> {
    let mut s = cell.parse();
    if s.remaining_bits() < 32 {
        return None;
    }
    s.load_u32().ok()
}

/// The `transfer` body a wallet owner sends to its jetton wallet.
///
/// `amount` is in the token's elementary units, not nanotons. The custom and
/// forward payloads are skipped during decoding since the money flow does not
/// depend on them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JettonTransfer {
    pub query_id: u64,
    pub amount: Coins,
    pub destination: TonAddress,
    pub response_destination: Option<TonAddress>,
    pub forward_ton_amount: Coins,
}

impl JettonTransfer {
    /// Decodes a message body as a jetton transfer.
    ///
    /// Returns `Ok(None)` when the body carries a different opcode or no
    /// opcode at all. A body that starts with the transfer opcode but does
    /// not parse is an error, not a mismatch.
    pub fn decode(cell: &Cell) -> Result<Option<Self>, BocError> {
        let mut s = cell.parse();
        if s.remaining_bits() < 32 {
            return Ok(None);
        }
        if s.load_u32()? != ops::TRANSFER {
            return Ok(None);
        }
        let query_id = s.load_u64()?;
        let amount = s.load_coins()?;
        let destination = s.load_address()?.ok_or(BocError::InvalidAddress)?;
        let response_destination = s.load_address()?;
        s.load_maybe_ref()?;
        let forward_ton_amount = s.load_coins()?;
        Ok(Some(Self { query_id, amount, destination, response_destination, forward_ton_amount }))
    }

    pub fn encode(&self) -> Result<Cell, BocError> {
        let mut b = Cell::builder();
        b.store_u32(ops::TRANSFER)?;
        b.store_u64(self.query_id)?;
        b.store_coins(self.amount)?;
        b.store_address(Some(&self.destination))?;
        b.store_address(self.response_destination.as_ref())?;
        b.store_bit(false)?;
        b.store_coins(self.forward_ton_amount)?;
        b.store_bit(false)?;
        Ok(b.build())
    }
}

/// The `transfer_notification` a receiving jetton wallet sends to its owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JettonNotification {
    pub query_id: u64,
    /// Token amount in elementary units.
    pub amount: Coins,
    /// Original token sender; absent when the tokens were minted.
    pub sender: Option<TonAddress>,
}

impl JettonNotification {
    /// Decodes a message body as a transfer notification, with the same
    /// opcode-mismatch contract as [`JettonTransfer::decode`].
    pub fn decode(cell: &Cell) -> Result<Option<Self>, BocError> {
        let mut s = cell.parse();
        if s.remaining_bits() < 32 {
            return Ok(None);
        }
        if s.load_u32()? != ops::TRANSFER_NOTIFICATION {
            return Ok(None);
        }
        let query_id = s.load_u64()?;
        let amount = s.load_coins()?;
        let sender = s.load_address()?;
        Ok(Some(Self { query_id, amount, sender }))
    }

    pub fn encode(&self) -> Result<Cell, BocError> {
        let mut b = Cell::builder();
        b.store_u32(ops::TRANSFER_NOTIFICATION)?;
        b.store_u64(self.query_id)?;
        b.store_coins(self.amount)?;
        b.store_address(self.sender.as_ref())?;
        b.store_bit(false)?;
        Ok(b.build())
    }
}
