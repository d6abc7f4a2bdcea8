//! Switch setup.
//!
//! Everything that can be wrong with a switch is rejected here, before it
//! is armed: the interval, the threshold, the guardian list. On success the
//! data-encryption key is split and the guardians are given share indices
//! `1..=n` in the order they were added.

use std::collections::BTreeSet;

use deadhand_crypto::aead::DataKey;
use deadhand_crypto::shamir::{split_secret, ShareSet};
use deadhand_types::config::{hours_to_secs, validate_interval, Threshold};
use deadhand_types::guardian::Guardian;
use deadhand_types::ConfigError;

use crate::commitment::Commitment;
use crate::lifecycle::{Recipient, Switch, SwitchStatus};
use crate::Result;

/// Builder for an armed [`Switch`].
#[derive(Clone, Debug)]
pub struct SwitchBuilder {
    id: String,
    check_in_interval_hours: f64,
    needed: u8,
    guardians: Vec<Guardian>,
    recipients: Vec<Recipient>,
    ciphertext_location: Option<String>,
    commitment: Option<Commitment>,
    end_of_life: Option<u64>,
}

impl SwitchBuilder {
    pub fn new(id: impl Into<String>, check_in_interval_hours: f64, needed: u8) -> Self {
        Self {
            id: id.into(),
            check_in_interval_hours,
            needed,
            guardians: Vec::new(),
            recipients: Vec::new(),
            ciphertext_location: None,
            commitment: None,
            end_of_life: None,
        }
    }

    pub fn guardian(mut self, guardian: Guardian) -> Self {
        self.guardians.push(guardian);
        self
    }

    pub fn guardians(mut self, guardians: impl IntoIterator<Item = Guardian>) -> Self {
        self.guardians.extend(guardians);
        self
    }

    pub fn recipient(mut self, recipient: Recipient) -> Self {
        self.recipients.push(recipient);
        self
    }

    pub fn ciphertext_location(mut self, location: impl Into<String>) -> Self {
        self.ciphertext_location = Some(location.into());
        self
    }

    pub fn commitment(mut self, commitment: Commitment) -> Self {
        self.commitment = Some(commitment);
        self
    }

    pub fn end_of_life(mut self, at: u64) -> Self {
        self.end_of_life = Some(at);
        self
    }

    /// Check the configuration without splitting anything.
    pub fn validate(&self) -> std::result::Result<Threshold, ConfigError> {
        validate_interval(self.check_in_interval_hours)?;

        let total = u8::try_from(self.guardians.len()).map_err(|_| ConfigError::GuardianCountMismatch {
            guardians: self.guardians.len(),
            total: u8::MAX,
        })?;
        let threshold = Threshold::new(self.needed, total)?;

        let mut seen = BTreeSet::new();
        for guardian in &self.guardians {
            if !seen.insert(guardian.identity) {
                return Err(ConfigError::DuplicateGuardian(guardian.identity.to_string()));
            }
        }
        Ok(threshold)
    }

    /// Validate, split `dek` and arm the switch at `now`.
    ///
    /// The returned share set is the only copy of the shares; the caller
    /// must distribute it and then drop it.
    pub fn build(self, dek: &DataKey, now: u64) -> Result<(Switch, ShareSet)> {
        let threshold = self.validate()?;
        let shares = split_secret(dek.as_bytes(), threshold.needed, threshold.total)?;

        let guardians: Vec<Guardian> = self
            .guardians
            .into_iter()
            .zip(1..=threshold.total)
            .map(|(mut guardian, index)| {
                guardian.assigned_share_index = index;
                guardian.share_distributed = false;
                guardian
            })
            .collect();

        let switch = Switch {
            expires_at: now.saturating_add(hours_to_secs(self.check_in_interval_hours)),
            id: self.id,
            check_in_interval_hours: self.check_in_interval_hours,
            status: SwitchStatus::Armed,
            threshold,
            guardians,
            recipients: self.recipients,
            ciphertext_location: self.ciphertext_location,
            commitment: self.commitment,
            created_at: now,
            last_check_in_at: None,
            paused_remaining_secs: None,
            vacation_until: None,
            end_of_life: self.end_of_life,
        };

        tracing::info!(
            switch = %switch.id,
            needed = threshold.needed,
            total = threshold.total,
            expires_at = switch.expires_at,
            "switch armed"
        );
        Ok((switch, shares))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SwitchError;
    use deadhand_crypto::shamir::reconstruct_secret;
    use deadhand_types::guardian::GuardianKind;
    use deadhand_types::GuardianId;

    fn guardian(byte: u8) -> Guardian {
        Guardian::new(GuardianId([byte; 32]), format!("g{byte}"), GuardianKind::Professional, [byte; 32])
    }

    #[test]
    fn test_build_assigns_indices_and_splits_key() {
        let dek = DataKey::generate();
        let (switch, shares) = SwitchBuilder::new("sw", 48.0, 3)
            .guardians((1..=5).map(guardian))
            .recipient(Recipient::new("Alice", "alice@example.com"))
            .build(&dek, 1000)
            .expect("build");

        assert_eq!(switch.status, SwitchStatus::Armed);
        assert_eq!(switch.expires_at, 1000 + 48 * 3600);
        assert_eq!(switch.threshold, Threshold { needed: 3, total: 5 });
        let indices: Vec<u8> = switch.guardians.iter().map(|g| g.assigned_share_index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);

        let subset: Vec<_> = shares.shares[1..4].to_vec();
        let recovered = reconstruct_secret(&subset, 3).expect("reconstruct");
        assert_eq!(recovered.as_slice(), dek.as_bytes());
    }

    #[test]
    fn test_rejects_bad_interval() {
        let err = SwitchBuilder::new("sw", 0.0, 2)
            .guardians((1..=3).map(guardian))
            .build(&DataKey::generate(), 0)
            .expect_err("zero interval");
        assert!(matches!(err, SwitchError::Config(ConfigError::InvalidInterval(_))));
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let builder = SwitchBuilder::new("sw", 24.0, 4).guardians((1..=3).map(guardian));
        assert!(matches!(
            builder.validate(),
            Err(ConfigError::InvalidThreshold { needed: 4, total: 3 })
        ));

        let single = SwitchBuilder::new("sw", 24.0, 1).guardians((1..=3).map(guardian));
        assert!(single.validate().is_err());
    }

    #[test]
    fn test_rejects_duplicate_guardian() {
        let builder = SwitchBuilder::new("sw", 24.0, 2)
            .guardian(guardian(1))
            .guardian(guardian(1))
            .guardian(guardian(2));
        assert!(matches!(builder.validate(), Err(ConfigError::DuplicateGuardian(_))));
    }
}
