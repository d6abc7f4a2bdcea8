//! Shamir secret sharing over GF(2^8).
//!
//! The data-encryption key (never the plaintext) is split byte-wise: for
//! each secret byte a random polynomial of degree `k - 1` is drawn with
//! the byte as constant term, and share `i` holds its evaluation at
//! `x = i` for `i` in `1..=n`. Any `k` distinct shares recover the
//! constant term by Lagrange interpolation at zero; fewer than `k` leave
//! every candidate secret equally likely.
//!
//! Field: GF(256) with the AES reduction polynomial
//! `x^8 + x^4 + x^3 + x + 1` (0x11B). Multiplication runs a fixed eight
//! rounds with no secret-dependent branches.

use std::collections::BTreeMap;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{CryptoError, Result};

/// Largest secret accepted for splitting (64 KiB).
pub const MAX_SECRET_LEN: usize = 64 * 1024;

/// Smallest threshold the scheme accepts.
pub const MIN_THRESHOLD: u8 = 2;

/// One share: a non-zero x-coordinate and the evaluations at that point.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    pub index: u8,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub value: Vec<u8>,
}

impl Share {
    /// Serialize as `index || value`.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::with_capacity(1 + self.value.len()));
        out.push(self.index);
        out.extend_from_slice(&self.value);
        out
    }

    /// Parse `index || value`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        match data.split_first() {
            Some((&index, value)) if index != 0 && !value.is_empty() => Ok(Self {
                index,
                value: value.to_vec(),
            }),
            _ => Err(CryptoError::InvalidShare(
                "share must be a non-zero index followed by at least one byte".into(),
            )),
        }
    }
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("len", &self.value.len())
            .finish()
    }
}

/// The output of [`split_secret`].
#[derive(Clone, Debug)]
pub struct ShareSet {
    /// Shares needed (k).
    pub threshold: u8,
    /// Shares issued (n).
    pub total: u8,
    /// Shares with indices `1..=n`, in index order.
    pub shares: Vec<Share>,
}

impl ShareSet {
    /// Look up the share with a given index.
    pub fn share(&self, index: u8) -> Option<&Share> {
        self.shares.iter().find(|s| s.index == index)
    }
}

/// Split `secret` into `n` shares with threshold `k` using the OS RNG.
///
/// # Errors
///
/// - [`CryptoError::InvalidThreshold`] unless `2 <= k <= n`
/// - [`CryptoError::InvalidInput`] if the secret is empty
/// - [`CryptoError::InputTooLarge`] if the secret exceeds [`MAX_SECRET_LEN`]
pub fn split_secret(secret: &[u8], k: u8, n: u8) -> Result<ShareSet> {
    split_secret_with_rng(secret, k, n, &mut rand::rngs::OsRng)
}

/// Split with a caller-supplied RNG. Tests use a seeded one.
pub fn split_secret_with_rng<R: RngCore + CryptoRng>(
    secret: &[u8],
    k: u8,
    n: u8,
    rng: &mut R,
) -> Result<ShareSet> {
    if k < MIN_THRESHOLD || k > n {
        return Err(CryptoError::InvalidThreshold {
            needed: k,
            total: n,
        });
    }
    if secret.is_empty() {
        return Err(CryptoError::InvalidInput("secret is empty".into()));
    }
    if secret.len() > MAX_SECRET_LEN {
        return Err(CryptoError::InputTooLarge {
            len: secret.len(),
            max: MAX_SECRET_LEN,
        });
    }

    let mut shares: Vec<Share> = (1..=n)
        .map(|index| Share {
            index,
            value: Vec::with_capacity(secret.len()),
        })
        .collect();

    let mut coefficients = Zeroizing::new(vec![0u8; k as usize]);
    for &byte in secret {
        coefficients[0] = byte;
        rng.fill_bytes(&mut coefficients[1..]);
        for share in shares.iter_mut() {
            share.value.push(eval_poly(&coefficients, share.index));
        }
    }

    Ok(ShareSet {
        threshold: k,
        total: n,
        shares,
    })
}

/// Reconstruct the secret from at least `k` distinct-index shares.
///
/// Duplicate copies of the same share are tolerated. When more than `k`
/// distinct shares are given, the `k` lowest indices are used; any
/// qualifying subset yields the same secret.
///
/// # Errors
///
/// - [`CryptoError::InsufficientShares`] with fewer than `k` distinct indices
/// - [`CryptoError::InvalidShare`] for index zero, mismatched lengths, or two
///   different values under one index
/// - [`CryptoError::InvalidThreshold`] if `k < 2`
pub fn reconstruct_secret(shares: &[Share], k: u8) -> Result<Zeroizing<Vec<u8>>> {
    if k < MIN_THRESHOLD {
        return Err(CryptoError::InvalidThreshold {
            needed: k,
            total: u8::try_from(shares.len()).unwrap_or(u8::MAX),
        });
    }

    let mut distinct: BTreeMap<u8, &Share> = BTreeMap::new();
    let mut secret_len: Option<usize> = None;
    for share in shares {
        if share.index == 0 {
            return Err(CryptoError::InvalidShare("share index zero".into()));
        }
        if share.value.is_empty() || share.value.len() > MAX_SECRET_LEN {
            return Err(CryptoError::InvalidShare(format!(
                "share {} has unusable length {}",
                share.index,
                share.value.len()
            )));
        }
        match secret_len {
            Some(len) if len != share.value.len() => {
                return Err(CryptoError::InvalidShare(format!(
                    "share {} has length {}, expected {len}",
                    share.index,
                    share.value.len()
                )));
            }
            _ => secret_len = Some(share.value.len()),
        }
        if let Some(existing) = distinct.get(&share.index) {
            if existing.value != share.value {
                return Err(CryptoError::InvalidShare(format!(
                    "conflicting values for share {}",
                    share.index
                )));
            }
            continue;
        }
        distinct.insert(share.index, share);
    }

    if distinct.len() < k as usize {
        return Err(CryptoError::InsufficientShares {
            available: distinct.len(),
            required: k as usize,
        });
    }

    let chosen: Vec<&Share> = distinct.values().take(k as usize).copied().collect();
    let xs: Vec<u8> = chosen.iter().map(|s| s.index).collect();
    let basis = lagrange_basis_at_zero(&xs);

    let len = secret_len.unwrap_or(0);
    let mut secret = Zeroizing::new(vec![0u8; len]);
    for (share, &weight) in chosen.iter().zip(basis.iter()) {
        for (out, &y) in secret.iter_mut().zip(share.value.iter()) {
            *out ^= gf_mul(weight, y);
        }
    }

    Ok(secret)
}

/// Evaluate a polynomial (constant term first) at `x` by Horner's rule.
fn eval_poly(coefficients: &[u8], x: u8) -> u8 {
    coefficients
        .iter()
        .rev()
        .fold(0u8, |acc, &c| gf_mul(acc, x) ^ c)
}

/// Lagrange basis values `l_i(0) = prod_{j != i} x_j / (x_j - x_i)`.
fn lagrange_basis_at_zero(xs: &[u8]) -> Vec<u8> {
    xs.iter()
        .enumerate()
        .map(|(i, &xi)| {
            xs.iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .fold(1u8, |acc, (_, &xj)| gf_mul(acc, gf_div(xj, xj ^ xi)))
        })
        .collect()
}

/// Multiply in GF(256) modulo 0x11B.
fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0u8;
    for _ in 0..8 {
        product ^= a & 0u8.wrapping_sub(b & 1);
        let carry = a >> 7;
        a = (a << 1) ^ (0x1B & 0u8.wrapping_sub(carry));
        b >>= 1;
    }
    product
}

/// Multiplicative inverse via `a^254`. Maps zero to zero.
fn gf_inv(a: u8) -> u8 {
    let mut result = 1u8;
    let mut base = a;
    let mut exp = 254u8;
    while exp > 0 {
        if exp & 1 == 1 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    result
}

fn gf_div(a: u8, b: u8) -> u8 {
    gf_mul(a, gf_inv(b))
}
