//! Chain identifiers and wallet identity.

use crate::address::{AddressError, TonAddress};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// The TON network a session is pinned to.
///
/// Chain ids are the string forms used by the connection protocol, `-239` for
/// mainnet and `-3` for testnet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "-239",
            Self::Testnet => "-3",
        }
    }

    pub const fn is_testnet(&self) -> bool {
        matches!(self, Self::Testnet)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "-239" => Ok(Self::Mainnet),
            "-3" => Ok(Self::Testnet),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown network id {0:?}")]
pub struct UnknownNetwork(String);

impl Serialize for Network {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Network {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(NetworkVisitor)
    }
}

/// Accepts both the protocol's string ids and bare integers, which some
/// dApp SDKs send.
struct NetworkVisitor;

impl<'de> de::Visitor<'de> for NetworkVisitor {
    type Value = Network;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a network id (\"-239\" or \"-3\")")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(de::Error::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        match v {
            -239 => Ok(Network::Mainnet),
            -3 => Ok(Network::Testnet),
            other => Err(E::custom(format!("unknown network id {other}"))),
        }
    }

    fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        // arbitrary_precision delivers numbers as a single-entry map.
        match map.next_entry::<de::IgnoredAny, String>()? {
            Some((_, digits)) => self.visit_str(&digits),
            None => Err(de::Error::custom("expected a number")),
        }
    }
}

/// Identifies a wallet account across networks: the network id plus the raw
/// account address, rendered as `<network>:<workchain>:<hex>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WalletId {
    pub network: Network,
    pub address: TonAddress,
}

impl WalletId {
    pub const fn new(network: Network, address: TonAddress) -> Self {
        Self { network, address }
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.network, self.address)
    }
}

impl FromStr for WalletId {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (network, address) =
            s.split_once(':').ok_or_else(|| AddressError::InvalidRawFormat(s.to_string()))?;
        let network = network
            .parse::<Network>()
            .map_err(|_| AddressError::InvalidRawFormat(s.to_string()))?;
        Ok(Self { network, address: address.parse()? })
    }
}

impl Serialize for WalletId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for WalletId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_serde() {
        assert_eq!(serde_json::to_string(&Network::Mainnet).unwrap(), "\"-239\"");
        assert_eq!(serde_json::from_str::<Network>("\"-3\"").unwrap(), Network::Testnet);
        assert_eq!(serde_json::from_str::<Network>("-239").unwrap(), Network::Mainnet);
        assert!(serde_json::from_str::<Network>("\"1\"").is_err());
    }

    #[test]
    fn wallet_id_round_trip() {
        let id = WalletId::new(Network::Mainnet, TonAddress::ZERO);
        let s = id.to_string();
        assert!(s.starts_with("-239:0:"));
        assert_eq!(s.parse::<WalletId>().unwrap(), id);
    }

    #[test]
    fn wallet_id_rejects_bad_network() {
        assert!("7:0:0000000000000000000000000000000000000000000000000000000000000000"
            .parse::<WalletId>()
            .is_err());
    }
}
