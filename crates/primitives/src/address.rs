//! TON account addresses.
//!
//! An address is a workchain id plus a 256-bit account id. Two textual forms
//! are in circulation: the raw form `0:<64 hex chars>` and the user-friendly
//! form, a 36-byte package (tag, workchain, account id, crc16) in base64.
//! Equality and hashing are structural, so the two forms of the same account
//! compare equal after parsing.

use base64::{engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE, Engine as _};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Tag byte of a bounceable user-friendly address.
const TAG_BOUNCEABLE: u8 = 0x11;
/// Tag byte of a non-bounceable user-friendly address.
const TAG_NON_BOUNCEABLE: u8 = 0x51;
/// Flag bit marking an address as testnet-only.
const FLAG_TESTNET: u8 = 0x80;

/// Errors produced while parsing an address.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("invalid raw address {0:?}: expected `<workchain>:<64 hex chars>`")]
    InvalidRawFormat(String),
    #[error("invalid workchain id {0:?}")]
    InvalidWorkchain(String),
    #[error("user-friendly address must decode to 36 bytes, got {0}")]
    InvalidLength(usize),
    #[error("user-friendly address has unknown tag byte {0:#04x}")]
    UnknownTag(u8),
    #[error("user-friendly address checksum mismatch")]
    BadChecksum,
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
}

/// A TON account address: workchain id and 256-bit account id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TonAddress {
    workchain: i8,
    account: [u8; 32],
}

impl TonAddress {
    /// The zero account in the basechain, commonly used as a burn address.
    pub const ZERO: Self = Self { workchain: 0, account: [0; 32] };

    pub const fn new(workchain: i8, account: [u8; 32]) -> Self {
        Self { workchain, account }
    }

    pub const fn workchain(&self) -> i8 {
        self.workchain
    }

    pub const fn account_id(&self) -> &[u8; 32] {
        &self.account
    }

    /// Parses the raw `<workchain>:<hex>` form.
    pub fn from_raw(s: &str) -> Result<Self, AddressError> {
        let (wc, account_hex) =
            s.split_once(':').ok_or_else(|| AddressError::InvalidRawFormat(s.to_string()))?;
        let workchain =
            wc.parse::<i8>().map_err(|_| AddressError::InvalidWorkchain(wc.to_string()))?;
        if account_hex.len() != 64 {
            return Err(AddressError::InvalidRawFormat(s.to_string()));
        }
        let bytes = hex::decode(account_hex)?;
        let account: [u8; 32] =
            bytes.try_into().map_err(|_| AddressError::InvalidRawFormat(s.to_string()))?;
        Ok(Self { workchain, account })
    }

    /// Parses the user-friendly base64 form, accepting both the url-safe and
    /// the standard alphabet.
    pub fn from_friendly(s: &str) -> Result<Self, AddressError> {
        let normalized: String =
            s.chars().map(|c| match c {
                '-' => '+',
                '_' => '/',
                c => c,
            }).collect();
        let bytes = STANDARD.decode(normalized.as_bytes())?;
        if bytes.len() != 36 {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        let expected = u16::from_be_bytes([bytes[34], bytes[35]]);
        if crc16_xmodem(&bytes[..34]) != expected {
            return Err(AddressError::BadChecksum);
        }
        let tag = bytes[0] & !FLAG_TESTNET;
        if tag != TAG_BOUNCEABLE && tag != TAG_NON_BOUNCEABLE {
            return Err(AddressError::UnknownTag(bytes[0]));
        }
        let workchain = bytes[1] as i8;
        let mut account = [0u8; 32];
        account.copy_from_slice(&bytes[2..34]);
        Ok(Self { workchain, account })
    }

    /// Renders the user-friendly base64url form.
    pub fn to_friendly(&self, bounceable: bool, testnet: bool) -> String {
        let mut tag = if bounceable { TAG_BOUNCEABLE } else { TAG_NON_BOUNCEABLE };
        if testnet {
            tag |= FLAG_TESTNET;
        }
        let mut buf = [0u8; 36];
        buf[0] = tag;
        buf[1] = self.workchain as u8;
        buf[2..34].copy_from_slice(&self.account);
        let crc = crc16_xmodem(&buf[..34]);
        buf[34..36].copy_from_slice(&crc.to_be_bytes());
        URL_SAFE.encode(buf)
    }

    /// Renders the raw `<workchain>:<hex>` form.
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.account))
    }
}

impl fmt::Display for TonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workchain, hex::encode(self.account))
    }
}

impl fmt::Debug for TonAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TonAddress({self})")
    }
}

impl FromStr for TonAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            Self::from_raw(s)
        } else {
            Self::from_friendly(s)
        }
    }
}

impl Serialize for TonAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_raw())
    }
}

impl<'de> Deserialize<'de> for TonAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// CRC-16/XMODEM, the checksum used by the user-friendly address package.
fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}
