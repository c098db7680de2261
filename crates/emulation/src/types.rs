//! Emulation request and trace models.
//!
//! The shapes follow the indexer wire format: amounts and logical times as
//! decimal strings, addresses in raw form, opcodes as `0x` hex strings.
//! Unknown fields are ignored everywhere so a newer endpoint does not break
//! decoding.

use crate::actions::Action;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::HashMap, fmt, sync::Arc};
use tonnect_primitives::{Boc, Cell, Coins, JettonNotification, JettonTransfer, TonAddress};
use tonnect_protocol::TransactionMessage;

/// What the kit sends to the emulation endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmulationRequest {
    /// The wallet account the messages are sent from.
    pub from: TonAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<u64>,
    pub messages: Vec<TransactionMessage>,
    #[serde(default)]
    pub include_code_data: bool,
    #[serde(default)]
    pub include_address_book: bool,
    #[serde(default)]
    pub include_metadata: bool,
    #[serde(default)]
    pub with_actions: bool,
}

impl EmulationRequest {
    /// A request with all the enrichment the preview layer wants.
    pub fn full(
        from: TonAddress,
        valid_until: Option<u64>,
        messages: Vec<TransactionMessage>,
    ) -> Self {
        Self {
            from,
            valid_until,
            messages,
            include_code_data: false,
            include_address_book: true,
            include_metadata: true,
            with_actions: true,
        }
    }
}

/// The emulated transaction tree and its lookup tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmulationTrace {
    pub trace: TraceNode,
    /// Transactions keyed by hash; the tree nodes refer into this map.
    pub transactions: HashMap<String, Transaction>,
    #[serde(default)]
    pub address_book: HashMap<String, AddressBookEntry>,
    #[serde(default)]
    pub metadata: HashMap<String, AddressMetadata>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl EmulationTrace {
    /// Transactions in depth-first tree order. Nodes whose hash is missing
    /// from the map are skipped.
    pub fn transactions_in_order(&self) -> Vec<&Transaction> {
        let mut out = Vec::new();
        let mut stack = vec![&self.trace];
        while let Some(node) = stack.pop() {
            if let Some(tx) = self.transactions.get(&node.tx_hash) {
                out.push(tx);
            }
            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Resolves the jetton master behind a token wallet from the emulated
    /// actions, if the endpoint identified one.
    pub fn jetton_master_for(&self, token_wallet: &TonAddress) -> Option<&TonAddress> {
        self.actions.iter().find_map(|action| match action {
            Action::JettonTransfer(t) if t.sender_jetton_wallet == *token_wallet => {
                t.asset.as_ref()
            }
            _ => None,
        })
    }

    /// User-friendly form of an address if the address book has one.
    pub fn friendly_address(&self, address: &TonAddress) -> Option<&str> {
        self.address_book.get(&address.to_raw()).map(|e| e.user_friendly.as_str())
    }
}

/// One node of the trace tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceNode {
    pub tx_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_msg_hash: Option<String>,
    #[serde(default)]
    pub children: Vec<TraceNode>,
}

/// One emulated transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    /// The account whose state this transaction ran on.
    pub account: TonAddress,
    #[serde(with = "lenient_u64")]
    pub lt: u64,
    #[serde(default)]
    pub now: u64,
    #[serde(default)]
    pub total_fees: Coins,
    #[serde(default)]
    pub description: TxDescription,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_msg: Option<Message>,
    #[serde(default)]
    pub out_msgs: Vec<Message>,
}

impl Transaction {
    pub fn aborted(&self) -> bool {
        self.description.aborted
    }
}

/// The slice of the transaction description the kit cares about.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TxDescription {
    #[serde(default)]
    pub aborted: bool,
    #[serde(default)]
    pub destroyed: bool,
}

/// One message in a transaction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Absent for external-in messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TonAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<TonAddress>,
    /// Attached toncoin; absent for external messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Coins>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opcode: Option<Opcode>,
    #[serde(default)]
    pub bounce: bool,
    #[serde(default)]
    pub bounced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_content: Option<MessageContent>,
}

impl Message {
    /// True when this is an external-in message, which carries no value.
    pub fn is_external(&self) -> bool {
        self.source.is_none()
    }

    pub fn value_or_zero(&self) -> Coins {
        self.value.unwrap_or(Coins::ZERO)
    }

    /// The message body as a cell, if present and well formed.
    pub fn body_cell(&self) -> Option<Arc<Cell>> {
        self.message_content.as_ref()?.body.as_ref()?.parse_root().ok()
    }

    /// Decodes the body as a jetton transfer. Malformed bodies yield `None`;
    /// the caller treats that the same as no transfer, which fails closed in
    /// comparisons.
    pub fn jetton_transfer(&self) -> Option<JettonTransfer> {
        JettonTransfer::decode(&*self.body_cell()?).ok().flatten()
    }

    /// Decodes the body as a jetton transfer notification.
    pub fn jetton_notification(&self) -> Option<JettonNotification> {
        JettonNotification::decode(&*self.body_cell()?).ok().flatten()
    }
}

/// Message body plus its hash.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Boc>,
}

/// An address book entry mapping a raw address to its display form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AddressBookEntry {
    pub user_friendly: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Indexer metadata about an address.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressMetadata {
    #[serde(default)]
    pub is_indexed: bool,
    #[serde(default)]
    pub token_info: Vec<TokenInfo>,
}

/// Token details attached to an address by the indexer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A 32-bit message opcode.
///
/// The wire form is a `0x` hex string; some endpoints emit signed decimal
/// numbers instead, so both are accepted.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(pub u32);

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opcode({:#010x})", self.0)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl Serialize for Opcode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Opcode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OpcodeVisitor;

        impl<'de> de::Visitor<'de> for OpcodeVisitor {
            type Value = Opcode;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an opcode as a 0x hex string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                let digits = v.strip_prefix("0x").or_else(|| v.strip_prefix("0X"));
                match digits {
                    Some(digits) => u32::from_str_radix(digits, 16)
                        .map(Opcode)
                        .map_err(|_| E::custom(format!("invalid opcode {v:?}"))),
                    None => v
                        .parse::<i64>()
                        .map(|n| Opcode(n as u32))
                        .map_err(|_| E::custom(format!("invalid opcode {v:?}"))),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(Opcode(v as u32))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Opcode(v as u32))
            }

            fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                // arbitrary_precision delivers numbers as a single-entry map.
                match map.next_entry::<de::IgnoredAny, String>()? {
                    Some((_, digits)) => self.visit_str(&digits),
                    None => Err(de::Error::custom("expected a number")),
                }
            }
        }

        deserializer.deserialize_any(OpcodeVisitor)
    }
}

/// Logical times arrive as decimal strings but old endpoints send numbers.
mod lenient_u64 {
    use serde::{de, Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        struct LtVisitor;

        impl<'de> de::Visitor<'de> for LtVisitor {
            type Value = u64;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a logical time as a decimal string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(de::Error::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(v)
            }

            fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                // arbitrary_precision delivers numbers as a single-entry map.
                match map.next_entry::<de::IgnoredAny, String>()? {
                    Some((_, digits)) => self.visit_str(&digits),
                    None => Err(de::Error::custom("expected a number")),
                }
            }
        }

        deserializer.deserialize_any(LtVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonnect_primitives::jetton;

    const WALLET: &str = "0:1111111111111111111111111111111111111111111111111111111111111111";
    const TOKEN_WALLET: &str = "0:2222222222222222222222222222222222222222222222222222222222222222";

    fn trace_json() -> serde_json::Value {
        serde_json::json!({
            "trace": {
                "tx_hash": "root",
                "in_msg_hash": "ext",
                "children": [ { "tx_hash": "child", "children": [] } ]
            },
            "transactions": {
                "root": {
                    "hash": "root",
                    "account": WALLET,
                    "lt": "1000",
                    "now": 1700000000,
                    "total_fees": "3000000",
                    "description": { "aborted": false },
                    "in_msg": { "destination": WALLET },
                    "out_msgs": [ {
                        "source": WALLET,
                        "destination": TOKEN_WALLET,
                        "value": "50000000",
                        "opcode": "0x0f8a7ea5"
                    } ]
                },
                "child": {
                    "hash": "child",
                    "account": TOKEN_WALLET,
                    "lt": 1001,
                    "description": { "aborted": false },
                    "out_msgs": []
                }
            },
            "address_book": {
                WALLET: { "user_friendly": "UQAA..." }
            },
            "metadata": {
                TOKEN_WALLET: {
                    "is_indexed": true,
                    "token_info": [ { "type": "jetton_wallets", "extra": { "decimals": "9" } } ]
                }
            },
            "actions": []
        })
    }

    #[test]
    fn decodes_indexer_shapes() {
        let trace: EmulationTrace = serde_json::from_value(trace_json()).unwrap();
        let in_order = trace.transactions_in_order();
        assert_eq!(in_order.len(), 2);
        assert_eq!(in_order[0].hash, "root");
        assert_eq!(in_order[0].lt, 1000);
        assert_eq!(in_order[1].lt, 1001);
        assert_eq!(in_order[0].total_fees, Coins::from_nano(3_000_000));
        assert!(!in_order[0].aborted());

        let out = &in_order[0].out_msgs[0];
        assert_eq!(out.opcode, Some(Opcode(jetton::ops::TRANSFER)));
        assert_eq!(out.value_or_zero(), Coins::from_nano(50_000_000));
        assert!(!out.is_external());
        assert!(in_order[0].in_msg.as_ref().is_some_and(Message::is_external));

        let wallet: TonAddress = WALLET.parse().unwrap();
        assert_eq!(trace.friendly_address(&wallet), Some("UQAA..."));
    }

    #[test]
    fn opcode_forms() {
        assert_eq!(serde_json::from_str::<Opcode>("\"0x0f8a7ea5\"").unwrap(), Opcode(0x0f8a7ea5));
        assert_eq!(serde_json::from_str::<Opcode>("\"0xD53276DB\"").unwrap(), Opcode(0xd53276db));
        // signed decimal form of 0xd53276db
        assert_eq!(serde_json::from_str::<Opcode>("-718113061").unwrap(), Opcode(0xd53276db));
        assert_eq!(serde_json::to_string(&Opcode(0x0f8a7ea5)).unwrap(), "\"0x0f8a7ea5\"");
    }

    #[test]
    fn jetton_transfer_from_body() {
        let transfer = JettonTransfer {
            query_id: 1,
            amount: Coins::from_nano(100),
            destination: WALLET.parse().unwrap(),
            response_destination: None,
            forward_ton_amount: Coins::ZERO,
        };
        let body = Boc::from_root(&Arc::new(transfer.encode().unwrap())).unwrap();
        let message = Message {
            message_content: Some(MessageContent { hash: None, body: Some(body) }),
            ..Default::default()
        };
        assert_eq!(message.jetton_transfer(), Some(transfer));

        let garbage = Message {
            message_content: Some(MessageContent {
                hash: None,
                body: Some(Boc::from_bytes(vec![1, 2, 3])),
            }),
            ..Default::default()
        };
        assert_eq!(garbage.jetton_transfer(), None);
    }

    #[test]
    fn missing_tree_hash_is_skipped() {
        let mut json = trace_json();
        json["trace"]["children"][0]["tx_hash"] = "not-there".into();
        let trace: EmulationTrace = serde_json::from_value(json).unwrap();
        assert_eq!(trace.transactions_in_order().len(), 1);
    }
}
