//! Release collection.
//!
//! Once a switch has triggered, guardians open their sealed shares and hand
//! them in. The collector checks every share against the guardian list and
//! only reconstructs the data-encryption key when the switch is TRIGGERED
//! and the threshold is reached.

use std::collections::BTreeMap;

use deadhand_crypto::aead::{self, DataKey, EncryptedBlob};
use deadhand_crypto::shamir::{reconstruct_secret, Share};
use deadhand_types::config::Threshold;
use deadhand_types::guardian::Guardian;
use deadhand_types::GuardianId;
use zeroize::Zeroizing;

use crate::lifecycle::{Switch, SwitchStatus};
use crate::{Result, SwitchError};

/// Gathers guardian shares for a triggered switch.
#[derive(Debug)]
pub struct ReleaseCollector {
    switch_id: String,
    threshold: Threshold,
    guardians: BTreeMap<GuardianId, u8>,
    shares: BTreeMap<GuardianId, Share>,
}

impl ReleaseCollector {
    /// Start collecting for `switch`.
    ///
    /// # Errors
    ///
    /// [`SwitchError::NotTriggered`] unless the switch is TRIGGERED.
    pub fn new(switch: &Switch) -> Result<Self> {
        if switch.status != SwitchStatus::Triggered {
            return Err(SwitchError::NotTriggered {
                status: switch.status,
            });
        }
        Ok(Self {
            switch_id: switch.id.clone(),
            threshold: switch.threshold,
            guardians: switch
                .guardians
                .iter()
                .map(|g: &Guardian| (g.identity, g.assigned_share_index))
                .collect(),
            shares: BTreeMap::new(),
        })
    }

    /// Accept a guardian's opened share. Returns how many are held.
    pub fn add_share(&mut self, guardian: &GuardianId, share: Share) -> Result<usize> {
        let expected = *self
            .guardians
            .get(guardian)
            .ok_or_else(|| SwitchError::UnknownGuardian(guardian.to_string()))?;
        if share.index != expected {
            return Err(SwitchError::ShareIndexMismatch {
                guardian: guardian.short(),
                expected,
                actual: share.index,
            });
        }
        self.shares.insert(*guardian, share);
        tracing::debug!(
            switch = %self.switch_id,
            guardian = %guardian.short(),
            held = self.shares.len(),
            needed = self.threshold.needed,
            "release share accepted"
        );
        Ok(self.shares.len())
    }

    pub fn is_ready(&self) -> bool {
        self.shares.len() >= usize::from(self.threshold.needed)
    }

    /// Reconstruct the data-encryption key.
    pub fn reconstruct(&self) -> Result<DataKey> {
        let shares: Vec<Share> = self.shares.values().cloned().collect();
        let secret = reconstruct_secret(&shares, self.threshold.needed)?;
        let key = DataKey::from_slice(&secret)?;
        tracing::info!(switch = %self.switch_id, shares = shares.len(), "data key reconstructed");
        Ok(key)
    }

    /// Reconstruct the key and decrypt `blob` with it.
    pub fn release(&self, blob: &EncryptedBlob) -> Result<Zeroizing<Vec<u8>>> {
        let key = self.reconstruct()?;
        Ok(aead::decrypt(blob, &key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SwitchBuilder;
    use deadhand_crypto::aead::encrypt;
    use deadhand_crypto::shamir::ShareSet;
    use deadhand_crypto::CryptoError;
    use deadhand_types::guardian::GuardianKind;

    fn setup() -> (Switch, ShareSet, DataKey) {
        let dek = DataKey::generate();
        let guardians = (1..=5u8)
            .map(|b| Guardian::new(GuardianId([b; 32]), format!("g{b}"), GuardianKind::Personal, [b; 32]));
        let (switch, shares) = SwitchBuilder::new("sw", 24.0, 3)
            .guardians(guardians)
            .build(&dek, 0)
            .expect("build");
        (switch, shares, dek)
    }

    #[test]
    fn test_refuses_untriggered_switch() {
        let (switch, _, _) = setup();
        assert!(matches!(
            ReleaseCollector::new(&switch),
            Err(SwitchError::NotTriggered {
                status: SwitchStatus::Armed
            })
        ));
        let err = ReleaseCollector::new(&switch).expect_err("armed");
        assert_eq!(
            err.to_string(),
            "cannot release a switch that is ARMED; it must be TRIGGERED"
        );
    }

    #[test]
    fn test_collect_and_release() {
        let (mut switch, shares, dek) = setup();
        let blob = encrypt(b"the letter", &dek).expect("encrypt");
        assert_eq!(switch.evaluate(switch.expires_at), Some(SwitchStatus::Triggered));

        let mut collector = ReleaseCollector::new(&switch).expect("triggered");
        for guardian in switch.guardians.iter().skip(2) {
            let share = shares.share(guardian.assigned_share_index).expect("share").clone();
            collector.add_share(&guardian.identity, share).expect("accept");
        }
        assert!(collector.is_ready());
        assert_eq!(collector.release(&blob).expect("release").as_slice(), b"the letter");
    }

    #[test]
    fn test_below_threshold_fails() {
        let (mut switch, shares, _) = setup();
        switch.evaluate(switch.expires_at);
        let mut collector = ReleaseCollector::new(&switch).expect("triggered");
        for guardian in switch.guardians.iter().take(2) {
            let share = shares.share(guardian.assigned_share_index).expect("share").clone();
            collector.add_share(&guardian.identity, share).expect("accept");
        }
        assert!(!collector.is_ready());
        assert!(matches!(
            collector.reconstruct(),
            Err(SwitchError::Crypto(CryptoError::InsufficientShares {
                available: 2,
                required: 3
            }))
        ));
    }

    #[test]
    fn test_rejects_foreign_and_relabeled_shares() {
        let (mut switch, shares, _) = setup();
        switch.evaluate(switch.expires_at);
        let mut collector = ReleaseCollector::new(&switch).expect("triggered");

        let stranger = GuardianId([0xEE; 32]);
        let share = shares.share(1).expect("share").clone();
        assert!(matches!(
            collector.add_share(&stranger, share.clone()),
            Err(SwitchError::UnknownGuardian(_))
        ));

        let second = switch.guardians[1].identity;
        assert!(matches!(
            collector.add_share(&second, share),
            Err(SwitchError::ShareIndexMismatch { expected: 2, actual: 1, .. })
        ));
    }
}
