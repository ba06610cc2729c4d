//! Envelope signing and verification.
//!
//! The signed message is the exact concatenation of the sender's address
//! string and the session id string, in that order, as raw UTF-8 bytes. No
//! separators, no pre-hashing; Ed25519 applies its own digest internally.
//!
//! Verification fails closed: a malformed address, malformed signature
//! encoding, unknown sender, or mismatched signature all yield `false`.
//! Nothing in this module panics or returns an error to the caller's flow.

use ed25519_dalek::{Signature, Signer, Verifier};
use std::sync::Arc;
use tracing::debug;

use super::{KeyMaterial, LedgerAddress};

/// Hex characters in an Ed25519 signature (64 bytes).
const SIGNATURE_HEX_LEN: usize = 128;

/// Signs and verifies envelope authentication messages.
#[derive(Clone)]
pub struct SignatureCodec {
    key: Arc<KeyMaterial>,
}

impl SignatureCodec {
    pub fn new(key: Arc<KeyMaterial>) -> Self {
        Self { key }
    }

    /// The local signing address carried in outbound envelopes.
    pub fn local_address(&self) -> &LedgerAddress {
        self.key.address()
    }

    /// The canonical byte string covered by the signature.
    fn message_bytes(sender_address: &str, session_id: &str) -> Vec<u8> {
        format!("{sender_address}{session_id}").into_bytes()
    }

    /// Sign a session id with the local key.
    ///
    /// Returns the signature as `0x` + 128 hex characters.
    pub fn sign(&self, session_id: &str) -> String {
        let message = Self::message_bytes(self.key.address().as_str(), session_id);
        let signature = self.key.signing_key().sign(&message);
        format!("0x{}", hex::encode(signature.to_bytes()))
    }

    /// Verify an inbound signature against the claimed sender.
    ///
    /// Accepts signatures with or without the `0x` prefix. Returns `false` on
    /// any malformation or mismatch, never an error.
    pub fn verify(&self, sender_address: &str, session_id: &str, signature_hex: &str) -> bool {
        let sender = match LedgerAddress::parse(sender_address) {
            Ok(addr) => addr,
            Err(e) => {
                debug!("signature rejected: malformed sender address: {e}");
                return false;
            }
        };

        let stripped = signature_hex.strip_prefix("0x").unwrap_or(signature_hex);
        if stripped.len() != SIGNATURE_HEX_LEN {
            debug!(
                "signature rejected: expected {SIGNATURE_HEX_LEN} hex chars, got {}",
                stripped.len()
            );
            return false;
        }

        let sig_bytes = match hex::decode(stripped) {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!("signature rejected: not valid hex");
                return false;
            }
        };
        let sig_array: [u8; 64] = match sig_bytes.as_slice().try_into() {
            Ok(arr) => arr,
            Err(_) => return false,
        };
        let signature = Signature::from_bytes(&sig_array);

        let Some(peer_key) = self.key.peer_key(&sender) else {
            debug!("signature rejected: no verifying key for {sender}");
            return false;
        };

        let message = Self::message_bytes(sender.as_str(), session_id);
        peer_key.verify(&message, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::KeyMaterial;

    fn codec_pair() -> (SignatureCodec, SignatureCodec) {
        let sender = Arc::new(KeyMaterial::generate());
        let receiver = Arc::new(KeyMaterial::generate());
        (SignatureCodec::new(sender), SignatureCodec::new(receiver))
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let (sender, receiver) = codec_pair();
        let session = "session-1234";
        let signature = sender.sign(session);
        assert!(receiver.verify(sender.local_address().as_str(), session, &signature));
    }

    #[test]
    fn test_verify_accepts_unprefixed_signature() {
        let (sender, receiver) = codec_pair();
        let signature = sender.sign("s");
        let unprefixed = signature.trim_start_matches("0x");
        assert!(receiver.verify(sender.local_address().as_str(), "s", unprefixed));
    }

    #[test]
    fn test_single_bit_flip_fails() {
        let (sender, receiver) = codec_pair();
        let session = "session-1234";
        let signature = sender.sign(session);

        // Flip one bit in the last byte of the signature.
        let mut bytes = hex::decode(signature.trim_start_matches("0x")).unwrap();
        bytes[63] ^= 0x01;
        let mutated = format!("0x{}", hex::encode(bytes));

        assert!(!receiver.verify(sender.local_address().as_str(), session, &mutated));
    }

    #[test]
    fn test_wrong_session_fails() {
        let (sender, receiver) = codec_pair();
        let signature = sender.sign("session-a");
        assert!(!receiver.verify(sender.local_address().as_str(), "session-b", &signature));
    }

    #[test]
    fn test_wrong_sender_fails() {
        let (sender, receiver) = codec_pair();
        let signature = sender.sign("session-a");
        // Claiming the receiver's own address as sender must not verify.
        let other = receiver.local_address().as_str().to_string();
        assert!(!receiver.verify(&other, "session-a", &signature));
    }

    #[test]
    fn test_malformed_inputs_fail_closed() {
        let (sender, receiver) = codec_pair();
        let signature = sender.sign("s");
        let addr = sender.local_address().as_str();

        assert!(!receiver.verify("0x...", "s", &signature));
        assert!(!receiver.verify("not-an-address", "s", &signature));
        assert!(!receiver.verify(addr, "s", "0x1234"));
        assert!(!receiver.verify(addr, "s", &"zz".repeat(64)));
        assert!(!receiver.verify(addr, "s", ""));
    }
}
