//! Requests a connected dApp sends to the wallet.
//!
//! The envelope is `{ id, method, params }` where `id` is a stringified
//! counter and every `params` entry is itself a JSON document encoded as a
//! string. [`AppRequest::parse_payload`] peels that second layer off into a
//! typed [`RequestPayload`].

use crate::error::WalletError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::BTreeMap, fmt, str::FromStr};
use tonnect_primitives::{Boc, Coins, Network, TonAddress};

/// Upper bound on outgoing messages in a single transaction request.
pub const MAX_MESSAGES: usize = 4;

/// A dApp-assigned request identifier.
///
/// The wire form is a string holding a decimal number, but some SDKs send a
/// bare number. Serialization always uses the string form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for RequestId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl<'de> de::Visitor<'de> for IdVisitor {
            type Value = RequestId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a request id as a decimal string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(|_| E::custom(format!("invalid request id {v:?}")))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(RequestId(v))
            }

            fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                // arbitrary_precision delivers numbers as a single-entry map.
                match map.next_entry::<de::IgnoredAny, String>()? {
                    Some((_, digits)) => self.visit_str(&digits),
                    None => Err(de::Error::custom("expected a number")),
                }
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// The method field of an app request. Unknown methods are preserved so the
/// wallet can answer them with a proper error instead of failing to decode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestMethod {
    #[serde(rename = "sendTransaction")]
    SendTransaction,
    #[serde(rename = "signData")]
    SignData,
    #[serde(rename = "disconnect")]
    Disconnect,
    #[serde(untagged)]
    Other(String),
}

impl RequestMethod {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SendTransaction => "sendTransaction",
            Self::SignData => "signData",
            Self::Disconnect => "disconnect",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for RequestMethod {
    fn from(name: &str) -> Self {
        match name {
            "sendTransaction" => Self::SendTransaction,
            "signData" => Self::SignData,
            "disconnect" => Self::Disconnect,
            other => Self::Other(other.to_string()),
        }
    }
}

/// The outer request envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppRequest {
    pub id: RequestId,
    pub method: RequestMethod,
    #[serde(default)]
    pub params: Vec<String>,
}

impl AppRequest {
    /// Decodes the double-encoded `params` into a typed payload.
    pub fn parse_payload(&self) -> Result<RequestPayload, WalletError> {
        match &self.method {
            RequestMethod::SendTransaction => {
                let raw = self.first_param()?;
                let request: TransactionRequest = serde_json::from_str(raw).map_err(|e| {
                    WalletError::bad_request(format!("malformed transaction request: {e}"))
                })?;
                Ok(RequestPayload::SendTransaction(request))
            }
            RequestMethod::SignData => {
                let raw = self.first_param()?;
                let payload: SignDataPayload = serde_json::from_str(raw).map_err(|e| {
                    WalletError::bad_request(format!("malformed sign data payload: {e}"))
                })?;
                Ok(RequestPayload::SignData(payload))
            }
            RequestMethod::Disconnect => Ok(RequestPayload::Disconnect),
            RequestMethod::Other(name) => {
                Err(WalletError::method_not_supported(format!("method {name:?} is not supported")))
            }
        }
    }

    fn first_param(&self) -> Result<&str, WalletError> {
        self.params
            .first()
            .map(String::as_str)
            .ok_or_else(|| WalletError::bad_request("missing request params"))
    }
}

/// A decoded request payload.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestPayload {
    SendTransaction(TransactionRequest),
    SignData(SignDataPayload),
    Disconnect,
}

/// The `sendTransaction` payload.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Unix seconds after which the request must not be signed.
    #[serde(default, alias = "validUntil", skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<TonAddress>,
    pub messages: Vec<TransactionMessage>,
}

impl TransactionRequest {
    /// Structural checks that do not need wallet state: at least one message
    /// and no more than the protocol maximum.
    pub fn validate(&self) -> Result<(), WalletError> {
        if self.messages.is_empty() {
            return Err(WalletError::bad_request("transaction request has no messages"));
        }
        if self.messages.len() > MAX_MESSAGES {
            return Err(WalletError::bad_request(format!(
                "transaction request has {} messages, at most {MAX_MESSAGES} are allowed",
                self.messages.len()
            )));
        }
        Ok(())
    }
}

/// One outgoing internal message inside a transaction request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionMessage {
    /// Destination account.
    pub address: TonAddress,
    /// Attached toncoin, in nanotons.
    pub amount: Coins,
    /// Message body as a bag of cells.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Boc>,
    /// State init for deploying the destination.
    #[serde(default, rename = "stateInit", skip_serializing_if = "Option::is_none")]
    pub state_init: Option<Boc>,
    /// Send mode flags, forwarded to the signer untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u8>,
    /// Extra currency amounts by currency id.
    #[serde(default, rename = "extraCurrency", skip_serializing_if = "Option::is_none")]
    pub extra_currency: Option<BTreeMap<u32, Coins>>,
}

/// The `signData` payload variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignDataPayload {
    Text { text: String },
    Binary { bytes: String },
    Cell { schema: String, cell: Boc },
}
