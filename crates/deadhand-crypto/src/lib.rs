//! # deadhand-crypto
//!
//! Cryptographic primitives for the Deadhand release-readiness core.
//!
//! The suite is fixed: AES-256-GCM for message and attachment encryption,
//! Shamir secret sharing over GF(256) for the data-encryption key,
//! Ed25519 for guardian heartbeats, and X25519 + BLAKE3 + AES-256-GCM for
//! sealing shares to individual guardians.
//!
//! Every function here is safe to call with attacker-controlled input:
//! malformed data yields a [`CryptoError`], never a panic.
//!
//! ## Modules
//!
//! - [`aead`] - AES-256-GCM encryption and the `EncryptedBlob` wire form
//! - [`shamir`] - Threshold secret splitting and reconstruction
//! - [`ed25519`] - Heartbeat signing and verification
//! - [`x25519`] - Key agreement for share sealing
//! - [`seal`] - Sealing a share to a guardian's X25519 key
//! - [`blake3`] - Domain-separated hashing and key derivation

pub mod aead;
pub mod blake3;
pub mod ed25519;
pub mod seal;
pub mod shamir;
pub mod x25519;

/// Error types for cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// AEAD authentication failed: ciphertext, IV, tag or key is wrong.
    #[error("authentication failed")]
    Authentication,

    /// Ciphertext or wire data could not be parsed.
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Not enough distinct shares to reconstruct.
    #[error("insufficient shares: have {available}, need {required}")]
    InsufficientShares { available: usize, required: usize },

    /// A share is malformed or conflicts with another share.
    #[error("invalid share: {0}")]
    InvalidShare(String),

    /// Threshold parameters outside `2 <= k <= n <= 255`.
    #[error("invalid threshold {needed}-of-{total}")]
    InvalidThreshold { needed: u8, total: u8 },

    /// Input exceeds the configured size bound.
    #[error("input too large: {len} bytes exceeds limit of {max}")]
    InputTooLarge { len: usize, max: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
