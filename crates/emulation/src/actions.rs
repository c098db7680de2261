//! High-level actions the endpoint derives from a trace.
//!
//! Actions are advisory: the validator works from the raw transactions and
//! only uses actions to resolve jetton masters and label previews. The
//! union is open ended on the wire, so decoding keeps unknown kinds as
//! [`Action::Unknown`] instead of failing the whole trace.

use crate::types::Opcode;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tonnect_primitives::{Coins, TonAddress};

/// One derived action, tagged by `type` with the body under `details`.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    TonTransfer(TonTransferAction),
    JettonTransfer(JettonTransferAction),
    JettonSwap(JettonSwapAction),
    CallContract(CallContractAction),
    ContractDeploy(ContractDeployAction),
    /// Any action kind this implementation does not know.
    Unknown { kind: String, details: Value },
}

impl Action {
    pub fn kind(&self) -> &str {
        match self {
            Self::TonTransfer(_) => "ton_transfer",
            Self::JettonTransfer(_) => "jetton_transfer",
            Self::JettonSwap(_) => "jetton_swap",
            Self::CallContract(_) => "call_contract",
            Self::ContractDeploy(_) => "contract_deploy",
            Self::Unknown { kind, .. } => kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TonTransferAction {
    pub source: TonAddress,
    pub destination: TonAddress,
    pub value: Coins,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JettonTransferAction {
    /// The jetton master, when the indexer recognized the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<TonAddress>,
    pub sender: TonAddress,
    pub receiver: TonAddress,
    pub sender_jetton_wallet: TonAddress,
    /// Token amount in elementary units.
    pub amount: Coins,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_amount: Option<Coins>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// A DEX swap the indexer recognized in the trace. Advisory only: the
/// validator still accounts the underlying jetton transfers individually.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JettonSwapAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dex: Option<String>,
    pub sender: TonAddress,
    /// Master of the token given away, when recognized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_in: Option<TonAddress>,
    /// Master of the token received, when recognized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_out: Option<TonAddress>,
    pub amount_in: Coins,
    pub amount_out: Coins,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallContractAction {
    pub destination: TonAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Coins>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opcode: Option<Opcode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractDeployAction {
    pub destination: TonAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Coins>,
}

// Hand-rolled so unknown `type` values become Action::Unknown; a derived
// tagged enum would reject the whole actions array instead.
impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| de::Error::missing_field("type"))?
            .to_string();
        let details = raw.get("details").cloned().unwrap_or(Value::Null);
        let action = match kind.as_str() {
            "ton_transfer" => {
                Self::TonTransfer(serde_json::from_value(details).map_err(de::Error::custom)?)
            }
            "jetton_transfer" => {
                Self::JettonTransfer(serde_json::from_value(details).map_err(de::Error::custom)?)
            }
            "jetton_swap" => {
                Self::JettonSwap(serde_json::from_value(details).map_err(de::Error::custom)?)
            }
            "call_contract" => {
                Self::CallContract(serde_json::from_value(details).map_err(de::Error::custom)?)
            }
            "contract_deploy" => {
                Self::ContractDeploy(serde_json::from_value(details).map_err(de::Error::custom)?)
            }
            _ => Self::Unknown { kind, details },
        };
        Ok(action)
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let details = match self {
            Self::TonTransfer(d) => serde_json::to_value(d).map_err(serde::ser::Error::custom)?,
            Self::JettonTransfer(d) => serde_json::to_value(d).map_err(serde::ser::Error::custom)?,
            Self::JettonSwap(d) => serde_json::to_value(d).map_err(serde::ser::Error::custom)?,
            Self::CallContract(d) => serde_json::to_value(d).map_err(serde::ser::Error::custom)?,
            Self::ContractDeploy(d) => serde_json::to_value(d).map_err(serde::ser::Error::custom)?,
            Self::Unknown { details, .. } => details.clone(),
        };
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", self.kind())?;
        map.serialize_entry("details", &details)?;
        map.end()
    }
}
