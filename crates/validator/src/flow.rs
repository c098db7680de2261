//! Asset flow derivation.
//!
//! A [`MoneyFlow`] is the asset movement of one account: entries for toncoin
//! and token transfers in both directions, plus the fees emulation observed.
//! [`expected_flow`] computes it from the request alone, [`emulated_flow`]
//! from the trace. The two must be built with the same rules for the same
//! things, so both live in this file.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use tonnect_emulation::{EmulationTrace, Opcode};
use tonnect_primitives::{jetton, Coins, TonAddress};
use tonnect_protocol::TransactionRequest;

/// What kind of asset a flow entry moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Ton,
    Jetton,
}

/// One asset movement, relative to the flow's account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub asset: AssetType,
    /// Nanotons for [`AssetType::Ton`], elementary token units otherwise.
    pub amount: Coins,
    /// The other party: recipient for outgoing entries, sender for incoming.
    pub counterparty: TonAddress,
    /// The token wallet carrying the transfer, for jetton entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<TonAddress>,
}

impl FlowEntry {
    fn ton(amount: Coins, counterparty: TonAddress) -> Self {
        Self { asset: AssetType::Ton, amount, counterparty, token_address: None }
    }

    fn jetton(amount: Coins, counterparty: TonAddress, token_wallet: TonAddress) -> Self {
        Self { asset: AssetType::Jetton, amount, counterparty, token_address: Some(token_wallet) }
    }
}

/// Identity of a jetton transfer for set comparison.
///
/// Keyed by the token wallet rather than the jetton master: the master is
/// not derivable from the request alone, while the token wallet address is
/// right there in the outgoing message.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JettonKey {
    pub token_wallet: TonAddress,
    pub from: TonAddress,
    pub to: TonAddress,
}

impl fmt::Display for JettonKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {} via token wallet {}", self.from, self.to, self.token_wallet)
    }
}

/// The asset movement of `account`, as derived from one evidence source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyFlow {
    /// The account the flow is relative to.
    pub account: TonAddress,
    pub incoming: Vec<FlowEntry>,
    pub outgoing: Vec<FlowEntry>,
    /// Fees actually charged in emulation. Always zero on the expected side;
    /// shown in previews, never part of the output comparison.
    pub fees: Coins,
}

impl MoneyFlow {
    fn new(account: TonAddress) -> Self {
        Self { account, incoming: Vec::new(), outgoing: Vec::new(), fees: Coins::ZERO }
    }

    /// Total toncoin leaving the account.
    pub fn ton_out(&self) -> Coins {
        sum_ton(&self.outgoing)
    }

    /// Total toncoin entering the account.
    pub fn ton_in(&self) -> Coins {
        sum_ton(&self.incoming)
    }

    /// Outgoing jetton transfers as a keyed set, amounts summed per key.
    pub fn jetton_outgoing(&self) -> BTreeMap<JettonKey, Coins> {
        let mut set = BTreeMap::new();
        for entry in &self.outgoing {
            let Some(token_wallet) = entry.token_address else { continue };
            let key =
                JettonKey { token_wallet, from: self.account, to: entry.counterparty };
            let total: &mut Coins = set.entry(key).or_default();
            *total = total.saturating_add(entry.amount);
        }
        set
    }
}

fn sum_ton(entries: &[FlowEntry]) -> Coins {
    entries
        .iter()
        .filter(|e| e.asset == AssetType::Ton)
        .fold(Coins::ZERO, |acc, e| acc.saturating_add(e.amount))
}

/// Derives the flow the request claims: one toncoin entry per message, and
/// one jetton entry per message whose payload decodes as a jetton transfer.
/// Payloads that do not decode contribute no jetton entry; if emulation
/// understands them anyway, the comparison catches it.
pub fn expected_flow(account: TonAddress, request: &TransactionRequest) -> MoneyFlow {
    let mut flow = MoneyFlow::new(account);
    for message in &request.messages {
        if !message.amount.is_zero() {
            flow.outgoing.push(FlowEntry::ton(message.amount, message.address));
        }
        let transfer = message
            .payload
            .as_ref()
            .and_then(|boc| boc.parse_root().ok())
            .and_then(|cell| jetton::JettonTransfer::decode(&cell).ok().flatten());
        if let Some(transfer) = transfer {
            flow.outgoing.push(FlowEntry::jetton(
                transfer.amount,
                transfer.destination,
                message.address,
            ));
        }
    }
    flow
}

/// Derives the flow emulation observed for `account`.
///
/// Only transactions executing on the account itself count. On the incoming
/// side, external-in messages, bounced messages and excess gas returns are
/// skipped; excesses in particular would otherwise flag every ordinary
/// jetton transfer. Incoming transfer notifications additionally yield a
/// jetton entry so previews can show what arrives.
pub fn emulated_flow(account: TonAddress, trace: &EmulationTrace) -> MoneyFlow {
    let mut flow = MoneyFlow::new(account);
    for tx in trace.transactions_in_order() {
        if tx.account != account {
            continue;
        }
        flow.fees = flow.fees.saturating_add(tx.total_fees);

        if let Some(in_msg) = &tx.in_msg {
            let excluded = in_msg.is_external()
                || in_msg.bounced
                || in_msg.opcode == Some(Opcode(jetton::ops::EXCESSES));
            if !excluded {
                let value = in_msg.value_or_zero();
                if !value.is_zero() {
                    if let Some(source) = in_msg.source {
                        flow.incoming.push(FlowEntry::ton(value, source));
                    }
                }
                if let Some(notification) = in_msg.jetton_notification() {
                    if let (Some(sender), Some(token_wallet)) =
                        (notification.sender, in_msg.source)
                    {
                        flow.incoming.push(FlowEntry::jetton(
                            notification.amount,
                            sender,
                            token_wallet,
                        ));
                    }
                }
            }
        }

        for out in &tx.out_msgs {
            let value = out.value_or_zero();
            let Some(destination) = out.destination else { continue };
            if !value.is_zero() {
                flow.outgoing.push(FlowEntry::ton(value, destination));
            }
            if let Some(transfer) = out.jetton_transfer() {
                flow.outgoing.push(FlowEntry::jetton(
                    transfer.amount,
                    transfer.destination,
                    destination,
                ));
            }
        }
    }
    flow
}
