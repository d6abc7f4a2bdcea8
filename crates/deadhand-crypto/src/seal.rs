//! Sealing a payload to a guardian's X25519 key.
//!
//! ECIES over X25519, BLAKE3 and AES-256-GCM:
//!
//! ```text
//! Seal(recipient_pk, plaintext, aad):
//!   1. eph_sk random, eph_pk = X25519_basepoint_mult(eph_sk)
//!   2. shared = X25519(eph_sk, recipient_pk)
//!   3. key   = BLAKE3::derive_key("Deadhand v1 share-seal-key",
//!                                 shared || eph_pk || recipient_pk)
//!   4. nonce = BLAKE3::derive_key("Deadhand v1 share-seal-nonce",
//!                                 shared || eph_pk)[:12]
//!   5. ct || tag = AES-256-GCM(key, nonce, plaintext, aad = eph_pk || aad)
//! ```
//!
//! The caller's `aad` binds the envelope to its addressee (the guardian
//! identity for shares), so a sealed share cannot be re-addressed.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use zeroize::Zeroizing;

use crate::aead::TAG_SIZE;
use crate::blake3::{self, contexts};
use crate::x25519::{SharedSecret, X25519PublicKey, X25519StaticSecret};
use crate::{CryptoError, Result};

/// Ephemeral public key plus AES-256-GCM ciphertext with appended tag.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    #[serde_as(as = "serde_with::hex::Hex")]
    pub eph_pk: [u8; 32],
    #[serde_as(as = "serde_with::base64::Base64")]
    pub ciphertext_and_tag: Vec<u8>,
}

/// Seal `plaintext` to `recipient_pk` with a random ephemeral key.
pub fn seal(recipient_pk: &X25519PublicKey, plaintext: &[u8], aad: &[u8]) -> Result<SealedEnvelope> {
    seal_with_ephemeral(&X25519StaticSecret::random(), recipient_pk, plaintext, aad)
}

fn seal_with_ephemeral(
    eph_secret: &X25519StaticSecret,
    recipient_pk: &X25519PublicKey,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<SealedEnvelope> {
    let eph_pk = eph_secret.public_key().to_bytes();
    let shared = eph_secret.diffie_hellman(recipient_pk);
    if !shared.is_contributory() {
        return Err(CryptoError::InvalidInput(
            "recipient key is a low-order point".into(),
        ));
    }

    let (key, nonce) = derive_envelope_keys(&shared, &eph_pk, recipient_pk);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
    let full_aad = blake3::encode_multi_field(&[&eph_pk[..], aad]);
    let ciphertext_and_tag = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &full_aad,
            },
        )
        .map_err(|_| CryptoError::InvalidInput("seal encryption failed".into()))?;

    Ok(SealedEnvelope {
        eph_pk,
        ciphertext_and_tag,
    })
}

/// Open an envelope with the recipient's static secret.
///
/// # Errors
///
/// - [`CryptoError::Authentication`] if the envelope was tampered with, was
///   sealed to another key, or `aad` differs from the sealing call
pub fn open(
    recipient_sk: &X25519StaticSecret,
    envelope: &SealedEnvelope,
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if envelope.ciphertext_and_tag.len() < TAG_SIZE {
        return Err(CryptoError::MalformedCiphertext(
            "sealed envelope too short".into(),
        ));
    }

    let eph_pk = X25519PublicKey::from_bytes(envelope.eph_pk);
    let recipient_pk = recipient_sk.public_key();
    let shared = recipient_sk.diffie_hellman(&eph_pk);
    if !shared.is_contributory() {
        return Err(CryptoError::Authentication);
    }

    let (key, nonce) = derive_envelope_keys(&shared, &envelope.eph_pk, &recipient_pk);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));
    let full_aad = blake3::encode_multi_field(&[&envelope.eph_pk[..], aad]);
    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &envelope.ciphertext_and_tag,
                aad: &full_aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Authentication)
}

fn derive_envelope_keys(
    shared: &SharedSecret,
    eph_pk: &[u8; 32],
    recipient_pk: &X25519PublicKey,
) -> (Zeroizing<[u8; 32]>, [u8; 12]) {
    let mut key_material = Zeroizing::new(Vec::with_capacity(96));
    key_material.extend_from_slice(shared.as_bytes());
    key_material.extend_from_slice(eph_pk);
    key_material.extend_from_slice(recipient_pk.as_bytes());
    let key = Zeroizing::new(blake3::derive_key(contexts::SHARE_SEAL_KEY, &key_material));

    let mut nonce_material = Zeroizing::new(Vec::with_capacity(64));
    nonce_material.extend_from_slice(shared.as_bytes());
    nonce_material.extend_from_slice(eph_pk);
    let nonce_full = blake3::derive_key(contexts::SHARE_SEAL_NONCE, &nonce_material);
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&nonce_full[..12]);

    (key, nonce)
}
