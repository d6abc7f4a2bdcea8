//! External timelock commitment.
//!
//! A switch may be backed by an on-chain timelock (for example a Bitcoin
//! transaction with a locktime). Deadhand never builds or broadcasts such a
//! transaction; it only asks a verifier what the chain says and interprets
//! the answer.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A timelock commitment identified by its locktime and transaction id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment {
    pub locktime: u64,
    pub txid: String,
}

/// What a verifier reports about a commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentStatus {
    pub confirmed: bool,
    pub block_height: Option<u64>,
    pub spent: bool,
}

/// How the switch should read a [`CommitmentStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentAssessment {
    /// Confirmed and unspent.
    Valid,
    /// Not yet confirmed.
    Pending,
    /// Already spent; the commitment no longer backs the switch.
    Spent,
}

/// Interpret a verifier's answer. Spent wins over confirmation.
pub fn assess(status: &CommitmentStatus) -> CommitmentAssessment {
    if status.spent {
        CommitmentAssessment::Spent
    } else if status.confirmed {
        CommitmentAssessment::Valid
    } else {
        CommitmentAssessment::Pending
    }
}

/// The verifier could not answer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("commitment verifier unavailable: {0}")]
pub struct VerifierUnavailable(pub String);

/// Black-box commitment check.
#[async_trait]
pub trait CommitmentVerifier: Send + Sync {
    async fn verify(&self, commitment: &Commitment) -> Result<CommitmentStatus, VerifierUnavailable>;
}

/// Verifier backed by a fixed table of answers.
#[derive(Debug, Default)]
pub struct StaticCommitmentVerifier {
    answers: RwLock<HashMap<String, CommitmentStatus>>,
}

impl StaticCommitmentVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, txid: impl Into<String>, status: CommitmentStatus) {
        self.answers.write().await.insert(txid.into(), status);
    }
}

#[async_trait]
impl CommitmentVerifier for StaticCommitmentVerifier {
    async fn verify(&self, commitment: &Commitment) -> Result<CommitmentStatus, VerifierUnavailable> {
        Ok(self
            .answers
            .read()
            .await
            .get(&commitment.txid)
            .copied()
            .unwrap_or(CommitmentStatus {
                confirmed: false,
                block_height: None,
                spent: false,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assess() {
        let confirmed = CommitmentStatus {
            confirmed: true,
            block_height: Some(840_000),
            spent: false,
        };
        assert_eq!(assess(&confirmed), CommitmentAssessment::Valid);

        let pending = CommitmentStatus {
            confirmed: false,
            block_height: None,
            spent: false,
        };
        assert_eq!(assess(&pending), CommitmentAssessment::Pending);

        let spent = CommitmentStatus {
            spent: true,
            ..confirmed
        };
        assert_eq!(assess(&spent), CommitmentAssessment::Spent);
    }

    #[tokio::test]
    async fn test_static_verifier_defaults_to_pending() {
        let verifier = StaticCommitmentVerifier::new();
        let commitment = Commitment {
            locktime: 900_000,
            txid: "ab".repeat(32),
        };
        let status = verifier.verify(&commitment).await.expect("verify");
        assert_eq!(assess(&status), CommitmentAssessment::Pending);

        verifier
            .set(
                commitment.txid.clone(),
                CommitmentStatus {
                    confirmed: true,
                    block_height: Some(1),
                    spent: false,
                },
            )
            .await;
        let status = verifier.verify(&commitment).await.expect("verify");
        assert_eq!(assess(&status), CommitmentAssessment::Valid);
    }
}
