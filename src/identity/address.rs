//! Ledger address parsing and validation.
//!
//! Addresses are 32 bytes rendered as `0x` + 64 hex characters. Every address
//! that enters the system goes through [`LedgerAddress::parse`] so downstream
//! code never has to re-validate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of raw bytes in a ledger address.
pub const ADDRESS_BYTES: usize = 32;

/// Hex characters in a canonical address, excluding the `0x` prefix.
pub const ADDRESS_HEX_LEN: usize = ADDRESS_BYTES * 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is missing the 0x prefix")]
    MissingPrefix,

    #[error("address has wrong length: expected {expected} hex chars, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("address contains non-hex characters")]
    InvalidHex,
}

/// A validated ledger address.
///
/// Stored in canonical form: `0x` prefix followed by 64 lowercase hex
/// characters. Construction is only possible through [`LedgerAddress::parse`],
/// so holding a `LedgerAddress` implies well-formedness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LedgerAddress(String);

impl LedgerAddress {
    /// Parse and canonicalize an address string.
    ///
    /// Accepts uppercase hex; the stored form is lowercased. Rejects missing
    /// prefix, wrong length, and non-hex characters.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let hex_part = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;

        if hex_part.len() != ADDRESS_HEX_LEN {
            return Err(AddressError::WrongLength {
                expected: ADDRESS_HEX_LEN,
                got: hex_part.len(),
            });
        }

        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::InvalidHex);
        }

        Ok(Self(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    /// Build an address from raw bytes (always well-formed).
    pub fn from_bytes(bytes: &[u8; ADDRESS_BYTES]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    /// The canonical string form, including the `0x` prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the address back into raw bytes.
    pub fn to_bytes(&self) -> [u8; ADDRESS_BYTES] {
        let mut out = [0u8; ADDRESS_BYTES];
        // Infallible: the constructor guarantees 64 valid hex chars.
        if let Ok(decoded) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&decoded);
        }
        out
    }
}

impl fmt::Display for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for LedgerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for LedgerAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "0x69029bc61f9828ed712a9238f70b4fe629b35144cd638a50f60bd278916b33c5";

    #[test]
    fn test_parse_valid_address() {
        let addr = LedgerAddress::parse(VALID).unwrap();
        assert_eq!(addr.as_str(), VALID);
    }

    #[test]
    fn test_parse_uppercase_is_canonicalized() {
        let upper = VALID.to_ascii_uppercase().replace("0X", "0x");
        let addr = LedgerAddress::parse(&upper).unwrap();
        assert_eq!(addr.as_str(), VALID);
    }

    #[test]
    fn test_missing_prefix_rejected() {
        let bare = &VALID[2..];
        assert_eq!(
            LedgerAddress::parse(bare),
            Err(AddressError::MissingPrefix)
        );
    }

    #[test]
    fn test_truncated_address_rejected() {
        assert_eq!(
            LedgerAddress::parse("0x..."),
            Err(AddressError::WrongLength {
                expected: ADDRESS_HEX_LEN,
                got: 3
            })
        );
        assert_eq!(
            LedgerAddress::parse("0x1234"),
            Err(AddressError::WrongLength {
                expected: ADDRESS_HEX_LEN,
                got: 4
            })
        );
    }

    #[test]
    fn test_non_hex_rejected() {
        let bad = format!("0x{}", "zz".repeat(32));
        assert_eq!(LedgerAddress::parse(&bad), Err(AddressError::InvalidHex));
    }

    #[test]
    fn test_bytes_roundtrip() {
        let addr = LedgerAddress::parse(VALID).unwrap();
        let bytes = addr.to_bytes();
        assert_eq!(LedgerAddress::from_bytes(&bytes), addr);
    }
}
