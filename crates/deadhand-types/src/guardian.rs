//! Guardian records.

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::GuardianId;

/// What sort of party a guardian is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardianKind {
    Personal,
    Professional,
    Institutional,
    SelfHosted,
}

/// An independent party holding one threshold share of a switch's key.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    /// Ed25519 public key. Fixed once a share has been distributed.
    pub identity: GuardianId,
    /// Display name.
    pub name: String,
    /// Guardian category.
    pub kind: GuardianKind,
    /// Shamir x-coordinate of the share this guardian holds (`1..=n`).
    /// Zero until the switch is built.
    #[serde(default)]
    pub assigned_share_index: u8,
    /// X25519 public key the guardian's share is sealed to.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub encryption_key: [u8; 32],
    /// Whether this guardian has been handed its sealed share.
    #[serde(default)]
    pub share_distributed: bool,
}

impl Guardian {
    /// Create a guardian that has not received a share yet.
    pub fn new(
        identity: GuardianId,
        name: impl Into<String>,
        kind: GuardianKind,
        encryption_key: [u8; 32],
    ) -> Self {
        Self {
            identity,
            name: name.into(),
            kind,
            assigned_share_index: 0,
            encryption_key,
            share_distributed: false,
        }
    }
}
