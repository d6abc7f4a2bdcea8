//! The simulation pipeline.
//!
//! Steps run strictly one after another in [`STEP_ORDER`]. Each step moves
//! `pending → running → (success | warning | error)` and every transition is
//! emitted to the caller's [`ProgressSink`]. Cancellation is checked before
//! every emission and raced against every await, so a cancelled run emits
//! nothing further and leaves no relay query behind.
//!
//! The key-reconstruction step works on a throwaway secret. The engine is
//! never handed the data-encryption key, a share, or a share sink.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use deadhand_crypto::aead::{self, DataKey};
use deadhand_crypto::seal;
use deadhand_crypto::shamir::{reconstruct_secret, split_secret, Share};
use deadhand_crypto::x25519::X25519PublicKey;
use deadhand_crypto::CryptoError;
use deadhand_guardian::monitor::{HealthMonitor, HealthSnapshot};
use deadhand_guardian::network::aggregate;
use deadhand_guardian::task::CancellationToken;
use deadhand_switch::blob::BlobLocator;
use deadhand_switch::commitment::{assess, CommitmentAssessment, CommitmentVerifier};
use deadhand_switch::lifecycle::{Switch, SwitchStatus};
use deadhand_types::config::{validate_interval, Threshold};
use deadhand_types::health::{GuardianHealth, HealthStatus, NetworkHealth};
use deadhand_types::{ConfigError, GuardianId};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::estimate::{confidence_score, estimate_recovery_hours, overall_status, ResponseAssumptions};
use crate::step::{
    ProgressSink, SimulationResult, SimulationStep, StepId, StepOutcome, StepStatus, STEP_ORDER,
};
use crate::{Result, SimulationError};

const TRIAL_PLAINTEXT: &[u8] = b"deadhand simulation trial";
const TRIAL_AAD: &[u8] = b"deadhand/simulation";

/// Simulation settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Query relays during the run instead of using the monitor's cache.
    /// The cache is not updated either way.
    pub query_live_guardians: bool,
    pub response: ResponseAssumptions,
}

/// Runs dry-run simulations against a switch.
pub struct SimulationEngine {
    monitor: Arc<HealthMonitor>,
    commitments: Option<Arc<dyn CommitmentVerifier>>,
    blobs: Option<Arc<dyn BlobLocator>>,
    config: SimulationConfig,
}

impl SimulationEngine {
    pub fn new(monitor: Arc<HealthMonitor>, config: SimulationConfig) -> Self {
        Self {
            monitor,
            commitments: None,
            blobs: None,
            config,
        }
    }

    pub fn with_commitment_verifier(mut self, verifier: Arc<dyn CommitmentVerifier>) -> Self {
        self.commitments = Some(verifier);
        self
    }

    pub fn with_blob_locator(mut self, locator: Arc<dyn BlobLocator>) -> Self {
        self.blobs = Some(locator);
        self
    }

    /// Run every step against `switch` as of `now`.
    ///
    /// # Errors
    ///
    /// [`SimulationError::Cancelled`] if `cancel` fires; no progress is
    /// emitted after that point.
    pub async fn run(
        &self,
        switch: &Switch,
        now: u64,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<SimulationResult> {
        tracing::info!(
            switch = %switch.id,
            live = self.config.query_live_guardians,
            "simulation started"
        );

        let mut run = Progress::new(progress, cancel);
        for id in STEP_ORDER {
            run.emit(id)?;
        }

        run.start(StepId::ConfigValidation)?;
        let outcome = until_cancelled(cancel, self.validate_config(switch)).await?;
        run.finish(StepId::ConfigValidation, outcome)?;

        run.start(StepId::GuardianHealth)?;
        let snapshot = self.guardian_snapshot(switch, now, cancel).await?;
        let network = aggregate(&snapshot.guardians, switch.threshold.needed);
        run.finish(StepId::GuardianHealth, health_outcome(switch, &snapshot, &network))?;

        run.start(StepId::ShareGeneration)?;
        run.finish(StepId::ShareGeneration, share_generation(switch))?;

        let responding = responding_indices(switch, &snapshot);
        run.start(StepId::KeyReconstruction)?;
        run.finish(
            StepId::KeyReconstruction,
            key_reconstruction(switch.threshold, &responding),
        )?;

        run.start(StepId::RecipientPreview)?;
        run.finish(StepId::RecipientPreview, recipient_preview(switch))?;

        let steps = run.into_steps();
        let overall = overall_status(steps.iter().map(|s| s.status));
        let warnings = steps.iter().filter(|s| s.status == StepStatus::Warning).count();
        let confidence = confidence_score(overall, warnings);
        let threshold_met = responding.len() >= usize::from(switch.threshold.needed);
        let estimated_recovery_hours = if network.can_recover {
            estimate_recovery_hours(
                snapshot.guardians.values(),
                switch.threshold.needed,
                &self.config.response,
            )
        } else {
            None
        };

        tracing::info!(
            switch = %switch.id,
            overall = ?overall,
            confidence,
            threshold_met,
            "simulation finished"
        );

        Ok(SimulationResult {
            switch_id: switch.id.clone(),
            overall,
            steps,
            confidence,
            threshold_met,
            guardians_responded: responding.len(),
            threshold_needed: switch.threshold.needed,
            network: Some(network),
            estimated_recovery_hours,
            evaluated_at: now,
        })
    }

    async fn guardian_snapshot(
        &self,
        switch: &Switch,
        now: u64,
        cancel: &CancellationToken,
    ) -> Result<HealthSnapshot> {
        let ids: Vec<GuardianId> = switch.guardians.iter().map(|g| g.identity).collect();
        if self.config.query_live_guardians {
            until_cancelled(cancel, self.monitor.sample(&ids, now)).await
        } else {
            let cached = self.monitor.cached().await;
            Ok(cached.reclassify(&ids, now, self.monitor.thresholds()))
        }
    }

    async fn validate_config(&self, switch: &Switch) -> StepOutcome {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut notes = Vec::new();

        if let Err(e) = validate_interval(switch.check_in_interval_hours) {
            errors.push(e.to_string());
        }
        if let Err(e) = switch.threshold.validate() {
            errors.push(e.to_string());
        }
        if switch.guardians.len() != usize::from(switch.threshold.total) {
            errors.push(
                ConfigError::GuardianCountMismatch {
                    guardians: switch.guardians.len(),
                    total: switch.threshold.total,
                }
                .to_string(),
            );
        }
        let indices: BTreeSet<u8> = switch.guardians.iter().map(|g| g.assigned_share_index).collect();
        let indices_valid = indices.len() == switch.guardians.len()
            && indices
                .iter()
                .all(|i| (1..=switch.threshold.total).contains(i));
        if !indices_valid {
            errors.push(
                ConfigError::InvalidShareIndex("guardian share indices must be distinct and within 1..=n".into())
                    .to_string(),
            );
        }

        match switch.status {
            SwitchStatus::Armed => {}
            SwitchStatus::Paused | SwitchStatus::Vacation => {
                warnings.push(format!("switch is {}; expiry is suspended", switch.status));
            }
            SwitchStatus::Triggered | SwitchStatus::Cancelled | SwitchStatus::Expired => {
                errors.push(format!("switch is {}; it can no longer be released by expiry", switch.status));
            }
        }

        if let (Some(commitment), Some(verifier)) = (&switch.commitment, &self.commitments) {
            match verifier.verify(commitment).await {
                Ok(status) => match assess(&status) {
                    CommitmentAssessment::Valid => notes.push(format!(
                        "commitment {} confirmed at height {}",
                        commitment.txid,
                        status.block_height.map_or_else(|| "?".to_string(), |h| h.to_string())
                    )),
                    CommitmentAssessment::Pending => {
                        warnings.push(format!("commitment {} not yet confirmed", commitment.txid));
                    }
                    CommitmentAssessment::Spent => {
                        errors.push(format!("commitment {} has been spent", commitment.txid));
                    }
                },
                Err(e) => warnings.push(e.to_string()),
            }
        }

        match (&switch.ciphertext_location, &self.blobs) {
            (Some(location), Some(locator)) => match locator.blob_exists(location).await {
                Ok(true) => notes.push(format!("ciphertext present at {location}")),
                Ok(false) => errors.push(format!("ciphertext missing at {location}")),
                Err(e) => warnings.push(e.to_string()),
            },
            (None, _) => notes.push("no ciphertext location recorded".into()),
            (Some(_), None) => {}
        }

        let details: Vec<String> = errors
            .iter()
            .chain(warnings.iter())
            .chain(notes.iter())
            .cloned()
            .collect();
        if !errors.is_empty() {
            StepOutcome::error(errors.join("; ")).details(details)
        } else if !warnings.is_empty() {
            StepOutcome::warning(warnings.join("; ")).details(details)
        } else {
            StepOutcome::success(format!(
                "{}-of-{} threshold, {}h check-in interval",
                switch.threshold.needed, switch.threshold.total, switch.check_in_interval_hours
            ))
            .details(details)
        }
    }
}

async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SimulationError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Step table plus the observer it reports to.
struct Progress<'a> {
    steps: Vec<SimulationStep>,
    sink: &'a dyn ProgressSink,
    cancel: &'a CancellationToken,
}

impl<'a> Progress<'a> {
    fn new(sink: &'a dyn ProgressSink, cancel: &'a CancellationToken) -> Self {
        Self {
            steps: STEP_ORDER.iter().map(|id| SimulationStep::pending(*id)).collect(),
            sink,
            cancel,
        }
    }

    fn emit(&self, id: StepId) -> Result<()> {
        if self.cancel.is_cancelled() {
            tracing::debug!(step = %id, "simulation cancelled");
            return Err(SimulationError::Cancelled);
        }
        if let Some(step) = self.steps.iter().find(|s| s.id == id) {
            self.sink.on_step(step);
        }
        Ok(())
    }

    fn update(&mut self, id: StepId, outcome: StepOutcome) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SimulationError::Cancelled);
        }
        if let Some(step) = self.steps.iter_mut().find(|s| s.id == id) {
            step.status = outcome.status;
            step.message = outcome.message;
            step.details = outcome.details;
        }
        self.emit(id)
    }

    fn start(&mut self, id: StepId) -> Result<()> {
        self.update(
            id,
            StepOutcome {
                status: StepStatus::Running,
                message: String::new(),
                details: Vec::new(),
            },
        )
    }

    fn finish(&mut self, id: StepId, outcome: StepOutcome) -> Result<()> {
        tracing::debug!(step = %id, status = ?outcome.status, message = %outcome.message, "simulation step finished");
        self.update(id, outcome)
    }

    fn into_steps(self) -> Vec<SimulationStep> {
        self.steps
    }
}

fn status_label(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "healthy",
        HealthStatus::Warning => "warning",
        HealthStatus::Critical => "critical",
        HealthStatus::Unknown => "unknown",
    }
}

fn describe(name: &str, health: Option<&GuardianHealth>) -> String {
    match health {
        Some(h) => match h.hours_since_heartbeat {
            Some(hours) if h.long_silent => {
                format!("{name}: {} ({hours:.1}h since heartbeat, long silent)", status_label(h.status))
            }
            Some(hours) => format!("{name}: {} ({hours:.1}h since heartbeat)", status_label(h.status)),
            None => format!("{name}: {}", status_label(h.status)),
        },
        None => format!("{name}: unknown"),
    }
}

fn health_outcome(switch: &Switch, snapshot: &HealthSnapshot, network: &NetworkHealth) -> StepOutcome {
    let details = switch
        .guardians
        .iter()
        .map(|g| describe(&g.name, snapshot.guardians.get(&g.identity)))
        .collect();
    let c = &network.counts;

    let outcome = if !network.can_recover {
        StepOutcome::error(format!(
            "{} of {} guardians responsive, {} needed",
            c.responsive(),
            c.total(),
            network.threshold
        ))
    } else if c.healthy == c.total() {
        StepOutcome::success(format!("all {} guardians healthy", c.total()))
    } else {
        StepOutcome::warning(format!(
            "{} healthy, {} warning, {} critical, {} unknown; {} needed",
            c.healthy, c.warning, c.critical, c.unknown, network.threshold
        ))
    };
    outcome.details(details)
}

fn share_generation(switch: &Switch) -> StepOutcome {
    let mut unusable = Vec::new();
    for guardian in &switch.guardians {
        let recipient = X25519PublicKey::from_bytes(guardian.encryption_key);
        if seal::seal(&recipient, TRIAL_PLAINTEXT, TRIAL_AAD).is_err() {
            unusable.push(guardian.name.clone());
        }
    }
    if !unusable.is_empty() {
        return StepOutcome::error(format!(
            "{} guardian encryption key(s) unusable",
            unusable.len()
        ))
        .details(unusable);
    }

    let pending: Vec<String> = switch
        .guardians
        .iter()
        .filter(|g| !g.share_distributed)
        .map(|g| g.name.clone())
        .collect();
    if !pending.is_empty() {
        return StepOutcome::warning(format!(
            "{} of {} guardians have not received their share",
            pending.len(),
            switch.guardians.len()
        ))
        .details(pending);
    }

    StepOutcome::success(format!("{} shares sealed and distributed", switch.guardians.len()))
}

/// Share indices of guardians presumed able to hand in their share, in
/// guardian order.
fn responding_indices(switch: &Switch, snapshot: &HealthSnapshot) -> Vec<u8> {
    switch
        .guardians
        .iter()
        .filter(|g| {
            snapshot
                .guardians
                .get(&g.identity)
                .is_some_and(|h| h.status.can_supply_share())
        })
        .map(|g| g.assigned_share_index)
        .collect()
}

/// Prove the threshold scheme works for this switch's parameters and the
/// guardians currently responding, using a secret that exists only here.
fn key_reconstruction(threshold: Threshold, responding: &[u8]) -> StepOutcome {
    let Threshold { needed, total } = threshold;
    let k = usize::from(needed);
    if responding.len() < k {
        return StepOutcome::error(format!(
            "{} guardians responding, {} needed",
            responding.len(),
            needed
        ));
    }

    let mut test_secret = Zeroizing::new([0u8; 32]);
    rand::rngs::OsRng.fill_bytes(&mut test_secret[..]);

    let set = match split_secret(&test_secret[..], needed, total) {
        Ok(set) => set,
        Err(e) => return StepOutcome::error(format!("test split failed: {e}")),
    };
    let chosen: Vec<Share> = responding
        .iter()
        .filter_map(|index| set.share(*index).cloned())
        .take(k)
        .collect();
    if chosen.len() < k {
        return StepOutcome::error("responding guardians hold share indices outside 1..=n");
    }

    match reconstruct_secret(&chosen, needed) {
        Ok(rebuilt) if rebuilt.as_slice() == &test_secret[..] => {}
        Ok(_) => return StepOutcome::error("reconstructed test secret does not match"),
        Err(e) => return StepOutcome::error(format!("test reconstruction failed: {e}")),
    }
    match reconstruct_secret(&chosen[..k - 1], needed) {
        Err(CryptoError::InsufficientShares { .. }) => {}
        _ => return StepOutcome::error("reconstruction below threshold did not fail"),
    }

    let trial_key = DataKey::from_bytes(*test_secret);
    let trial_ok = aead::encrypt(TRIAL_PLAINTEXT, &trial_key)
        .and_then(|blob| aead::decrypt(&blob, &trial_key))
        .is_ok_and(|plain| plain.as_slice() == TRIAL_PLAINTEXT);
    if !trial_ok {
        return StepOutcome::error("test decryption failed");
    }

    let used: Vec<String> = chosen.iter().map(|s| s.index.to_string()).collect();
    StepOutcome::success(format!(
        "test secret split {needed}-of-{total} and rebuilt from shares {}",
        used.join(", ")
    ))
}

fn recipient_preview(switch: &Switch) -> StepOutcome {
    if switch.recipients.is_empty() {
        return StepOutcome::warning("no recipients configured");
    }
    let details: Vec<String> = switch
        .recipients
        .iter()
        .map(|r| {
            let mark = if r.is_valid() { "" } else { " (invalid)" };
            format!("{} <{}>{mark}", r.name, r.address)
        })
        .collect();
    let invalid = switch.recipients.iter().filter(|r| !r.is_valid()).count();
    if invalid > 0 {
        StepOutcome::warning(format!(
            "{invalid} of {} recipients have invalid addresses",
            switch.recipients.len()
        ))
        .details(details)
    } else {
        StepOutcome::success(format!(
            "{} recipient(s) would receive the message",
            switch.recipients.len()
        ))
        .details(details)
    }
}
