//! Identity and signing material.
//!
//! Holds the local Ed25519 keypair, the ledger address derived from it, and
//! the registry of trusted counterpart identities. The address of a peer *is*
//! its hex-encoded verifying key, so any well-formed address can be checked
//! against a signature without a pre-shared session.

mod address;
mod signature;

pub use address::{AddressError, LedgerAddress, ADDRESS_BYTES, ADDRESS_HEX_LEN};
pub use signature::SignatureCodec;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("private key is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("private key has wrong length: expected 32 bytes, got {0}")]
    WrongLength(usize),
}

/// Local signing material plus known counterpart identities.
pub struct KeyMaterial {
    signing_key: SigningKey,
    address: LedgerAddress,
    trusted_peers: HashMap<LedgerAddress, VerifyingKey>,
}

impl KeyMaterial {
    /// Load a keypair from a hex-encoded private key.
    ///
    /// Accepts the raw 64 hex chars as well as the `0x` and `ed25519-priv-0x`
    /// prefixed forms that ledger tooling exports.
    pub fn from_private_key_hex(raw: &str) -> Result<Self, KeyError> {
        let stripped = raw
            .strip_prefix("ed25519-priv-0x")
            .or_else(|| raw.strip_prefix("0x"))
            .unwrap_or(raw);

        let bytes = hex::decode(stripped)?;
        let key_bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::WrongLength(bytes.len()))?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&key_bytes)))
    }

    /// Generate a fresh keypair (development and tests).
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = LedgerAddress::from_bytes(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            address,
            trusted_peers: HashMap::new(),
        }
    }

    /// The local ledger address (hex-encoded verifying key).
    pub fn address(&self) -> &LedgerAddress {
        &self.address
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Register a counterpart identity under an explicit address.
    ///
    /// Useful when a peer's on-ledger address differs from its raw verifying
    /// key; addresses that *are* encoded verifying keys need no registration.
    pub fn register_peer(&mut self, address: LedgerAddress, key: VerifyingKey) {
        self.trusted_peers.insert(address, key);
    }

    /// Resolve the verifying key for a peer address.
    ///
    /// Falls back to decoding the address itself as a verifying key, since a
    /// canonical address is exactly 32 bytes.
    pub fn peer_key(&self, address: &LedgerAddress) -> Option<VerifyingKey> {
        if let Some(key) = self.trusted_peers.get(address) {
            return Some(*key);
        }
        VerifyingKey::from_bytes(&address.to_bytes()).ok()
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("address", &self.address)
            .field("trusted_peers", &self.trusted_peers.len())
            .finish_non_exhaustive()
    }
}
