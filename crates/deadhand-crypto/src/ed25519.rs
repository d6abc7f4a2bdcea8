//! Ed25519 heartbeat signatures.
//!
//! A guardian is identified by its Ed25519 public key and signs every
//! heartbeat digest with the matching secret. Verification is strict:
//! small-order keys and malleable signatures are refused.

use ed25519_dalek::Signer;

use crate::{CryptoError, Result};

/// A guardian's secret signing key. The inner key wipes itself on drop.
pub struct SigningKey(ed25519_dalek::SigningKey);

/// A guardian's public identity key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

/// A detached 64-byte signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl SigningKey {
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(secret))
    }

    /// The 32-byte secret seed, for writing a key file.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SigningKey").field(&self.verifying_key()).finish()
    }
}

impl VerifyingKey {
    /// Decode a public key. Fails for bytes that are not a curve point.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.0
            .verify_strict(message, &signature.0)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

impl Signature {
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self(ed25519_dalek::Signature::from_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        self.0.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_digest_verifies_under_its_key_only() {
        let guardian = SigningKey::generate();
        let stranger = SigningKey::generate();
        let digest = [9u8; 32];
        let sig = guardian.sign(&digest);

        assert!(guardian.verifying_key().verify(&digest, &sig).is_ok());
        assert_eq!(
            guardian.verifying_key().verify(&[8u8; 32], &sig),
            Err(CryptoError::SignatureVerification)
        );
        assert!(stranger.verifying_key().verify(&digest, &sig).is_err());
    }

    #[test]
    fn test_zero_signature_rejected() {
        let key = SigningKey::generate();
        let sig = Signature::from_bytes(&[0u8; 64]);
        assert!(key.verifying_key().verify(b"heartbeat", &sig).is_err());
    }

    #[test]
    fn test_key_file_seed_restores_identity() {
        let key = SigningKey::generate();
        let restored = SigningKey::from_bytes(&key.to_bytes());
        assert_eq!(restored.verifying_key(), key.verifying_key());

        let decoded = VerifyingKey::from_bytes(&key.verifying_key().to_bytes()).expect("valid key");
        assert_eq!(decoded, key.verifying_key());
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = SigningKey::from_bytes(&[42u8; 32]);
        let shown = format!("{key:?}");
        assert!(shown.starts_with("SigningKey("));
        assert!(!shown.contains(&format!("{:?}", [42u8; 32])));
    }
}
