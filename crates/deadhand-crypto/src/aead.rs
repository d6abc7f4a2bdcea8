//! AES-256-GCM authenticated encryption.
//!
//! Used for the switch message, its attachments, and as the inner cipher
//! of share sealing. Each call to [`encrypt`] draws a fresh random 96-bit
//! IV, so a key may encrypt many blobs without IV reuse in practice; the
//! caller should still prefer one [`DataKey`] per message.
//!
//! The tag is checked before any plaintext leaves [`decrypt`]. There is no
//! partial or best-effort decryption.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Key, Nonce, Tag,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{CryptoError, Result};

/// IV size for AES-256-GCM (96 bits = 12 bytes).
pub const IV_SIZE: usize = 12;

/// Key size for AES-256-GCM (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Authentication tag size (128 bits = 16 bytes).
pub const TAG_SIZE: usize = 16;

/// Largest plaintext accepted by [`encrypt`] (16 MiB).
pub const MAX_PLAINTEXT_LEN: usize = 16 * 1024 * 1024;

/// Associated data binding every blob to its algorithm version.
const BLOB_AAD: &[u8] = b"deadhand/aes-256-gcm/v1";

/// AEAD algorithm tag carried by every blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
}

/// A 256-bit data-encryption key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; KEY_SIZE]);

impl DataKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap existing key material.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a key from a slice, e.g. a reconstructed secret.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey(..)")
    }
}

/// Ciphertext with its IV and detached authentication tag.
///
/// JSON wire form carries base64 fields:
/// `{"ciphertext": "...", "iv": "...", "auth_tag": "...", "algorithm": "aes-256-gcm"}`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    #[serde_as(as = "serde_with::base64::Base64")]
    pub ciphertext: Vec<u8>,
    #[serde_as(as = "serde_with::base64::Base64")]
    pub iv: [u8; IV_SIZE],
    #[serde_as(as = "serde_with::base64::Base64")]
    pub auth_tag: [u8; TAG_SIZE],
    pub algorithm: Algorithm,
}

impl EncryptedBlob {
    /// Parse the JSON wire form.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(|e| CryptoError::MalformedCiphertext(e.to_string()))
    }

    /// Render the JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CryptoError::InvalidInput(e.to_string()))
    }
}

/// Encrypt `plaintext` under `key` with a fresh random IV.
///
/// # Errors
///
/// - [`CryptoError::InputTooLarge`] if the plaintext exceeds [`MAX_PLAINTEXT_LEN`]
pub fn encrypt(plaintext: &[u8], key: &DataKey) -> Result<EncryptedBlob> {
    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    encrypt_with_iv(plaintext, key, iv)
}

fn encrypt_with_iv(plaintext: &[u8], key: &DataKey, iv: [u8; IV_SIZE]) -> Result<EncryptedBlob> {
    if plaintext.len() > MAX_PLAINTEXT_LEN {
        return Err(CryptoError::InputTooLarge {
            len: plaintext.len(),
            max: MAX_PLAINTEXT_LEN,
        });
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), BLOB_AAD, &mut buffer)
        .map_err(|_| CryptoError::InvalidInput("AES-256-GCM encryption failed".into()))?;

    let mut auth_tag = [0u8; TAG_SIZE];
    auth_tag.copy_from_slice(tag.as_slice());

    Ok(EncryptedBlob {
        ciphertext: buffer,
        iv,
        auth_tag,
        algorithm: Algorithm::Aes256Gcm,
    })
}

/// Decrypt a blob, verifying its tag first.
///
/// # Errors
///
/// - [`CryptoError::Authentication`] if the ciphertext, IV, tag or key is wrong
/// - [`CryptoError::InputTooLarge`] if the ciphertext exceeds [`MAX_PLAINTEXT_LEN`]
pub fn decrypt(blob: &EncryptedBlob, key: &DataKey) -> Result<Zeroizing<Vec<u8>>> {
    if blob.ciphertext.len() > MAX_PLAINTEXT_LEN {
        return Err(CryptoError::InputTooLarge {
            len: blob.ciphertext.len(),
            max: MAX_PLAINTEXT_LEN,
        });
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let mut buffer = Zeroizing::new(blob.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&blob.iv),
            BLOB_AAD,
            buffer.as_mut_slice(),
            Tag::from_slice(&blob.auth_tag),
        )
        .map_err(|_| CryptoError::Authentication)?;

    Ok(buffer)
}
