//! X25519 key agreement (RFC 7748).
//!
//! Guardians publish an X25519 public key alongside their Ed25519 identity;
//! shares are sealed to it.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

/// An X25519 static secret key.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct X25519StaticSecret {
    inner: StaticSecret,
}

/// An X25519 public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct X25519PublicKey {
    bytes: [u8; 32],
}

/// An X25519 shared secret.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl X25519StaticSecret {
    /// Generate a new random static secret.
    pub fn random() -> Self {
        Self {
            inner: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            inner: StaticSecret::from(bytes),
        }
    }

    /// Raw secret bytes, for writing a key file.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Compute the corresponding public key.
    pub fn public_key(&self) -> X25519PublicKey {
        let pk = PublicKey::from(&self.inner);
        X25519PublicKey {
            bytes: pk.to_bytes(),
        }
    }

    /// Perform Diffie-Hellman key agreement.
    pub fn diffie_hellman(&self, their_public: &X25519PublicKey) -> SharedSecret {
        let pk = PublicKey::from(their_public.bytes);
        let shared = self.inner.diffie_hellman(&pk);
        SharedSecret {
            bytes: *shared.as_bytes(),
        }
    }
}

impl X25519PublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the raw bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.bytes
    }

    /// Get the raw bytes as a slice.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl SharedSecret {
    /// Get the raw bytes of the shared secret.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// All-zero output means the peer sent a low-order point.
    pub fn is_contributory(&self) -> bool {
        self.bytes.iter().fold(0u8, |acc, b| acc | b) != 0
    }
}
