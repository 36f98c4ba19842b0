//! Order signing capability.
//!
//! Holds the wallet key material and signs order payloads for the
//! execution venue. The decision pipeline itself never touches this; only
//! the venue does. Key material lives in `secrecy::SecretString` so it is
//! zeroized on drop and never lands in logs or Debug output.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::AgentError;

pub struct Signer {
    key: SecretString,
    address: String,
    nonce: AtomicU64,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("address", &self.address)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl Signer {
    pub fn new(key: SecretString) -> Result<Self, AgentError> {
        if key.expose_secret().trim().is_empty() {
            return Err(AgentError::Signing("wallet key is empty".to_string()));
        }

        // Display address: first 20 bytes of the key digest.
        let digest = Sha256::digest(key.expose_secret().as_bytes());
        let address = format!("0x{}", hex::encode(&digest[..20]));

        Ok(Self {
            key,
            address,
            nonce: AtomicU64::new(0),
        })
    }

    /// The signer's display address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign an order payload. Each call consumes a fresh nonce, so two
    /// signatures over the same payload never collide.
    pub fn sign(&self, payload: &str) -> String {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(self.key.expose_secret().as_bytes());
        hasher.update(payload.as_bytes());
        hasher.update(nonce.to_be_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_signer(key: &str) -> Signer {
        Signer::new(SecretString::new(key.to_string())).unwrap()
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(Signer::new(SecretString::new(String::new())).is_err());
        assert!(Signer::new(SecretString::new("   ".to_string())).is_err());
    }

    #[test]
    fn test_address_is_stable_per_key() {
        let a = make_signer("test-key-1");
        let b = make_signer("test-key-1");
        assert_eq!(a.address(), b.address());
        assert!(a.address().starts_with("0x"));
        assert_eq!(a.address().len(), 42); // 0x + 20 bytes hex
    }

    #[test]
    fn test_different_keys_different_addresses() {
        assert_ne!(make_signer("key-a").address(), make_signer("key-b").address());
    }

    #[test]
    fn test_signatures_never_repeat() {
        let signer = make_signer("test-key");
        let first = signer.sign("order-payload");
        let second = signer.sign("order-payload");
        assert_ne!(first, second);
        assert!(first.starts_with("0x"));
        assert_eq!(first.len(), 66); // 0x + 32 bytes hex
    }

    #[test]
    fn test_debug_redacts_key() {
        let signer = make_signer("super-secret");
        let debug = format!("{signer:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }
}
