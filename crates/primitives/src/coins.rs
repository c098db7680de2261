//! Nanoton amounts.
//!
//! Amounts travel over the wire as decimal strings of nanotons. On-chain they
//! are `VarUInteger 16` values, so the largest representable amount is
//! `2^120 - 1`. The type stores the nanoton count and compares numerically.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Upper bound of `VarUInteger 16`: fifteen value bytes.
pub const MAX_COINS: u128 = (1 << 120) - 1;

/// An amount of toncoin, in nanotons.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coins(u128);

impl Coins {
    pub const ZERO: Self = Self(0);

    /// One whole toncoin.
    pub const TON: Self = Self(1_000_000_000);

    pub const fn from_nano(nano: u128) -> Self {
        Self(nano)
    }

    pub const fn as_nano(&self) -> u128 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coins({})", self.0)
    }
}

impl FromStr for Coins {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u128>().map(Self)
    }
}

impl From<u64> for Coins {
    fn from(nano: u64) -> Self {
        Self(nano as u128)
    }
}

impl Serialize for Coins {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Coins {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CoinsVisitor)
    }
}

/// Accepts the decimal-string wire form plus plain JSON numbers, which some
/// indexer responses emit for small amounts.
struct CoinsVisitor;

impl<'de> de::Visitor<'de> for CoinsVisitor {
    type Value = Coins;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a nanoton amount as a decimal string or unsigned integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(|_| E::custom(format!("invalid nanoton amount {v:?}")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Coins(v as u128))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Self::Value, E> {
        Ok(Coins(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u128::try_from(v).map(Coins).map_err(|_| E::custom("nanoton amount cannot be negative"))
    }

    fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        // serde_json with arbitrary_precision hands numbers over as a
        // single-entry map with the digits as the value.
        let entry = map.next_entry::<de::IgnoredAny, String>()?;
        match entry {
            Some((_, digits)) => self.visit_str(&digits),
            None => Err(de::Error::custom("expected a number")),
        }
    }
}
