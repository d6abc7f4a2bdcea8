//! Guardian replacement.
//!
//! A replacement guardian takes over the departing guardian's share index.
//! If any share has already gone out, the old guardian still holds a valid
//! share of the current key, so the key must be re-split (and the payload
//! re-encrypted under a fresh key) before the new set is trustworthy.

use deadhand_types::guardian::Guardian;
use deadhand_types::GuardianId;
use serde::{Deserialize, Serialize};

use crate::{GuardianError, Result};

/// Result of a successful guardian replacement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementResult {
    pub old_guardian: GuardianId,
    pub new_guardian: GuardianId,
    /// The share index the new guardian inherited.
    pub share_index: u8,
    /// Shares were already out; every guardian needs a fresh one.
    pub resplit_required: bool,
}

/// Replace a guardian in place.
///
/// When a re-split is required all `share_distributed` flags are cleared,
/// since the shares already handed out belong to a key that is being
/// retired.
///
/// # Errors
///
/// - [`GuardianError::NotFound`] if `old_id` is not in the list
/// - [`GuardianError::AlreadyEnrolled`] if the new guardian is already in the list
pub fn replace_guardian(
    old_id: &GuardianId,
    mut new_guardian: Guardian,
    guardians: &mut [Guardian],
) -> Result<ReplacementResult> {
    let old_idx = guardians
        .iter()
        .position(|g| g.identity == *old_id)
        .ok_or_else(|| GuardianError::NotFound(old_id.to_string()))?;

    if guardians.iter().any(|g| g.identity == new_guardian.identity) {
        return Err(GuardianError::AlreadyEnrolled(new_guardian.identity.to_string()));
    }

    let resplit_required = guardians.iter().any(|g| g.share_distributed);
    let share_index = guardians[old_idx].assigned_share_index;
    let new_id = new_guardian.identity;

    new_guardian.assigned_share_index = share_index;
    new_guardian.share_distributed = false;
    guardians[old_idx] = new_guardian;

    if resplit_required {
        for guardian in guardians.iter_mut() {
            guardian.share_distributed = false;
        }
    }

    tracing::info!(
        old = %old_id.short(),
        new = %new_id.short(),
        share_index,
        resplit_required,
        "guardian replaced"
    );

    Ok(ReplacementResult {
        old_guardian: *old_id,
        new_guardian: new_id,
        share_index,
        resplit_required,
    })
}
