//! Share distribution.
//!
//! Each guardian receives exactly one share, sealed to its X25519
//! encryption key. The envelope is bound to the guardian's identity and the
//! share index, so a share delivered to one guardian cannot be replayed as
//! another guardian's, and a guardian cannot relabel its share.

use std::collections::HashSet;

use async_trait::async_trait;
use deadhand_crypto::blake3;
use deadhand_crypto::seal::{self, SealedEnvelope};
use deadhand_crypto::shamir::{Share, ShareSet};
use deadhand_crypto::x25519::{X25519PublicKey, X25519StaticSecret};
use deadhand_types::guardian::Guardian;
use deadhand_types::GuardianId;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{GuardianError, Result};

/// A share sealed to one guardian.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedShare {
    pub guardian: GuardianId,
    pub share_index: u8,
    pub envelope: SealedEnvelope,
}

/// Delivery channel to guardians.
#[async_trait]
pub trait ShareSink: Send + Sync {
    async fn deliver(&self, share: &SealedShare) -> std::result::Result<(), String>;
}

/// Outcome of a distribution round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistributionReport {
    pub delivered: Vec<GuardianId>,
    pub failed: Vec<(GuardianId, String)>,
}

impl DistributionReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

fn share_aad(guardian: &GuardianId, index: u8) -> Vec<u8> {
    blake3::encode_multi_field(&[&guardian.as_bytes()[..], &[index][..]])
}

/// Seal `share` to `guardian`.
pub fn seal_share(guardian: &Guardian, share: &Share) -> Result<SealedShare> {
    let recipient = X25519PublicKey::from_bytes(guardian.encryption_key);
    let envelope = seal::seal(
        &recipient,
        &share.to_bytes(),
        &share_aad(&guardian.identity, share.index),
    )?;
    Ok(SealedShare {
        guardian: guardian.identity,
        share_index: share.index,
        envelope,
    })
}

/// Open a sealed share with the guardian's X25519 secret.
pub fn open_share(sealed: &SealedShare, secret: &X25519StaticSecret) -> Result<Share> {
    let plaintext = seal::open(
        secret,
        &sealed.envelope,
        &share_aad(&sealed.guardian, sealed.share_index),
    )?;
    let share = Share::from_bytes(&plaintext)?;
    if share.index != sealed.share_index {
        return Err(GuardianError::ShareIndexMismatch {
            expected: sealed.share_index,
            actual: share.index,
        });
    }
    Ok(share)
}

/// Seal and deliver each guardian's assigned share.
///
/// Every guardian must have a share in `shares` before anything is sent.
/// Delivery failures are reported per guardian and leave that guardian's
/// `share_distributed` flag unset so the round can be retried.
pub async fn distribute_shares(
    shares: &ShareSet,
    guardians: &mut [Guardian],
    sink: &dyn ShareSink,
) -> Result<DistributionReport> {
    let mut sealed = Vec::with_capacity(guardians.len());
    for guardian in guardians.iter() {
        let share = shares
            .share(guardian.assigned_share_index)
            .ok_or_else(|| GuardianError::MissingShare {
                guardian: guardian.identity.short(),
                index: guardian.assigned_share_index,
            })?;
        sealed.push(seal_share(guardian, share)?);
    }

    let mut report = DistributionReport::default();
    for (guardian, envelope) in guardians.iter_mut().zip(sealed) {
        match sink.deliver(&envelope).await {
            Ok(()) => {
                guardian.share_distributed = true;
                report.delivered.push(guardian.identity);
            }
            Err(reason) => {
                tracing::warn!(
                    guardian = %guardian.identity.short(),
                    index = guardian.assigned_share_index,
                    %reason,
                    "share delivery failed"
                );
                report.failed.push((guardian.identity, reason));
            }
        }
    }

    tracing::info!(
        delivered = report.delivered.len(),
        failed = report.failed.len(),
        "share distribution finished"
    );
    Ok(report)
}

/// Sink that keeps delivered shares in memory.
#[derive(Debug, Default)]
pub struct MemoryShareSink {
    delivered: Mutex<Vec<SealedShare>>,
    unreachable: HashSet<GuardianId>,
}

impl MemoryShareSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse deliveries to `guardian`.
    pub fn with_unreachable(mut self, guardian: GuardianId) -> Self {
        self.unreachable.insert(guardian);
        self
    }

    pub async fn delivered(&self) -> Vec<SealedShare> {
        self.delivered.lock().await.clone()
    }

    pub async fn for_guardian(&self, guardian: &GuardianId) -> Option<SealedShare> {
        self.delivered
            .lock()
            .await
            .iter()
            .rev()
            .find(|s| s.guardian == *guardian)
            .cloned()
    }
}

#[async_trait]
impl ShareSink for MemoryShareSink {
    async fn deliver(&self, share: &SealedShare) -> std::result::Result<(), String> {
        if self.unreachable.contains(&share.guardian) {
            return Err("guardian unreachable".into());
        }
        self.delivered.lock().await.push(share.clone());
        Ok(())
    }
}
