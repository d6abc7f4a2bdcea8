//! Switch lifecycle state machine.
//!
//! ```text
//!            check_in                    check_in
//!           ┌───────┐                   ┌───────┐
//!           ▼       │   enable_vacation  ▼       │
//!   ──► ARMED ──────┴──────────────────► VACATION
//!        │ ▲ ◄─────────────────────────── │
//!  pause │ │ resume      disable / until  │
//!        ▼ │                              │
//!       PAUSED                            │
//!
//!   ARMED    ──expiry──────►  TRIGGERED
//!   any live ──cancel──────►  CANCELLED
//!   any live ──end of life─►  EXPIRED
//! ```
//!
//! TRIGGERED, CANCELLED and EXPIRED are terminal. Every transition is
//! checked against [`transition`] before the switch is touched.

use std::fmt;

use deadhand_types::config::{hours_to_secs, Threshold};
use deadhand_types::guardian::Guardian;
use serde::{Deserialize, Serialize};

use crate::commitment::Commitment;
use crate::{Result, SwitchError};

/// Lifecycle state of a switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchStatus {
    Armed,
    Paused,
    Vacation,
    Triggered,
    Cancelled,
    Expired,
}

impl SwitchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Triggered | Self::Cancelled | Self::Expired)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Armed => "ARMED",
            Self::Paused => "PAUSED",
            Self::Vacation => "VACATION",
            Self::Triggered => "TRIGGERED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for SwitchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that moves a switch between states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CheckIn,
    Expire,
    Pause,
    Resume,
    EnableVacation,
    DisableVacation,
    Cancel,
    EndOfLife,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CheckIn => "check in",
            Self::Expire => "expire",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::EnableVacation => "enable vacation on",
            Self::DisableVacation => "disable vacation on",
            Self::Cancel => "cancel",
            Self::EndOfLife => "retire",
        })
    }
}

/// The transition table. `None` means the action is not permitted.
pub fn transition(from: SwitchStatus, action: Action) -> Option<SwitchStatus> {
    use Action::*;
    use SwitchStatus::*;

    match (from, action) {
        (Armed, CheckIn) => Some(Armed),
        (Vacation, CheckIn) => Some(Vacation),
        (Armed, Expire) => Some(Triggered),
        (Armed, Pause) => Some(Paused),
        (Paused, Resume) => Some(Armed),
        (Armed, EnableVacation) => Some(Vacation),
        (Vacation, DisableVacation) => Some(Armed),
        (Armed | Paused | Vacation, Cancel) => Some(Cancelled),
        (Armed | Paused | Vacation, EndOfLife) => Some(Expired),
        _ => None,
    }
}

/// Someone who receives the message when the switch fires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    /// Delivery address, e.g. an email address.
    pub address: String,
}

impl Recipient {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Minimal shape check: a name and a `local@domain` address.
    pub fn is_valid(&self) -> bool {
        if self.name.trim().is_empty() || self.address.chars().any(char::is_whitespace) {
            return false;
        }
        match self.address.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
            None => false,
        }
    }
}

/// A dead man's switch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    pub id: String,
    pub check_in_interval_hours: f64,
    pub expires_at: u64,
    pub status: SwitchStatus,
    pub threshold: Threshold,
    pub guardians: Vec<Guardian>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    /// Where the encrypted message lives.
    #[serde(default)]
    pub ciphertext_location: Option<String>,
    #[serde(default)]
    pub commitment: Option<Commitment>,
    pub created_at: u64,
    #[serde(default)]
    pub last_check_in_at: Option<u64>,
    /// Time left on the clock when the switch was paused.
    #[serde(default)]
    pub paused_remaining_secs: Option<u64>,
    #[serde(default)]
    pub vacation_until: Option<u64>,
    /// Past this instant a live switch retires to EXPIRED.
    #[serde(default)]
    pub end_of_life: Option<u64>,
}

impl Switch {
    pub fn interval_secs(&self) -> u64 {
        hours_to_secs(self.check_in_interval_hours)
    }

    /// Seconds until the deadline; zero once it has passed.
    pub fn time_remaining(&self, now: u64) -> u64 {
        match self.status {
            SwitchStatus::Paused => self.paused_remaining_secs.unwrap_or(0),
            _ => self.expires_at.saturating_sub(now),
        }
    }

    fn next(&self, action: Action) -> Result<SwitchStatus> {
        transition(self.status, action).ok_or(SwitchError::InvalidState {
            action,
            status: self.status,
        })
    }

    fn enter(&mut self, next: SwitchStatus, action: Action) {
        let from = self.status;
        self.status = next;
        if from != next {
            tracing::info!(switch = %self.id, %from, to = %next, ?action, "switch transition");
        }
    }

    /// Record a check-in and push the deadline out by one interval.
    ///
    /// A check-in at or past the deadline is refused; the caller must run
    /// [`Switch::evaluate`], which triggers the switch.
    pub fn check_in(&mut self, now: u64) -> Result<()> {
        let next = self.next(Action::CheckIn)?;
        if self.status == SwitchStatus::Armed && now >= self.expires_at {
            return Err(SwitchError::Overdue {
                expired_at: self.expires_at,
            });
        }
        self.expires_at = now.saturating_add(self.interval_secs());
        self.last_check_in_at = Some(now);
        self.enter(next, Action::CheckIn);
        tracing::debug!(switch = %self.id, expires_at = self.expires_at, "check-in recorded");
        Ok(())
    }

    /// Stop the clock, keeping the time that was left.
    pub fn pause(&mut self, now: u64) -> Result<()> {
        let next = self.next(Action::Pause)?;
        self.paused_remaining_secs = Some(self.expires_at.saturating_sub(now));
        self.enter(next, Action::Pause);
        Ok(())
    }

    /// Restart the clock with the time that was left when paused.
    pub fn resume(&mut self, now: u64) -> Result<()> {
        let next = self.next(Action::Resume)?;
        let remaining = self
            .paused_remaining_secs
            .take()
            .unwrap_or_else(|| self.interval_secs());
        self.expires_at = now.saturating_add(remaining);
        self.enter(next, Action::Resume);
        Ok(())
    }

    /// Suspend expiry until `until`.
    pub fn enable_vacation(&mut self, until: u64, now: u64) -> Result<()> {
        let next = self.next(Action::EnableVacation)?;
        if until <= now {
            return Err(SwitchError::InvalidVacation { until, now });
        }
        self.vacation_until = Some(until);
        self.enter(next, Action::EnableVacation);
        Ok(())
    }

    /// End vacation and start a fresh interval.
    pub fn disable_vacation(&mut self, now: u64) -> Result<()> {
        let next = self.next(Action::DisableVacation)?;
        self.vacation_until = None;
        self.expires_at = now.saturating_add(self.interval_secs());
        self.enter(next, Action::DisableVacation);
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        let next = self.next(Action::Cancel)?;
        self.paused_remaining_secs = None;
        self.vacation_until = None;
        self.enter(next, Action::Cancel);
        Ok(())
    }

    /// Apply every time-driven transition due at `now`.
    ///
    /// Returns the new status if it changed.
    pub fn evaluate(&mut self, now: u64) -> Option<SwitchStatus> {
        let before = self.status;
        if before.is_terminal() {
            return None;
        }

        if self.end_of_life.is_some_and(|eol| now >= eol) {
            self.paused_remaining_secs = None;
            self.vacation_until = None;
            self.enter(SwitchStatus::Expired, Action::EndOfLife);
            return Some(SwitchStatus::Expired);
        }

        match self.status {
            SwitchStatus::Vacation if self.vacation_until.is_some_and(|until| now >= until) => {
                self.vacation_until = None;
                self.expires_at = now.saturating_add(self.interval_secs());
                self.enter(SwitchStatus::Armed, Action::DisableVacation);
            }
            SwitchStatus::Armed if now >= self.expires_at => {
                self.enter(SwitchStatus::Triggered, Action::Expire);
                tracing::warn!(switch = %self.id, expires_at = self.expires_at, "switch triggered");
            }
            _ => {}
        }

        (self.status != before).then_some(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deadhand_types::guardian::GuardianKind;
    use deadhand_types::GuardianId;

    const T0: u64 = 1_800_000_000;
    const DAY: u64 = 86_400;

    fn make_switch() -> Switch {
        let guardians = (1..=3u8)
            .map(|i| {
                let mut g = Guardian::new(GuardianId([i; 32]), format!("g{i}"), GuardianKind::Personal, [i; 32]);
                g.assigned_share_index = i;
                g
            })
            .collect();
        Switch {
            id: "sw-1".into(),
            check_in_interval_hours: 24.0,
            expires_at: T0 + DAY,
            status: SwitchStatus::Armed,
            threshold: Threshold::new(2, 3).expect("valid threshold"),
            guardians,
            recipients: vec![Recipient::new("Alice", "alice@example.com")],
            ciphertext_location: None,
            commitment: None,
            created_at: T0,
            last_check_in_at: None,
            paused_remaining_secs: None,
            vacation_until: None,
            end_of_life: None,
        }
    }

    const ALL_STATUSES: [SwitchStatus; 6] = [
        SwitchStatus::Armed,
        SwitchStatus::Paused,
        SwitchStatus::Vacation,
        SwitchStatus::Triggered,
        SwitchStatus::Cancelled,
        SwitchStatus::Expired,
    ];

    const ALL_ACTIONS: [Action; 8] = [
        Action::CheckIn,
        Action::Expire,
        Action::Pause,
        Action::Resume,
        Action::EnableVacation,
        Action::DisableVacation,
        Action::Cancel,
        Action::EndOfLife,
    ];

    #[test]
    fn test_terminal_states_have_no_outgoing_transitions() {
        for status in ALL_STATUSES.into_iter().filter(|s| s.is_terminal()) {
            for action in ALL_ACTIONS {
                assert_eq!(transition(status, action), None, "{status} / {action:?}");
            }
        }
    }

    #[test]
    fn test_cancel_from_every_live_state() {
        for status in ALL_STATUSES.into_iter().filter(|s| !s.is_terminal()) {
            assert_eq!(transition(status, Action::Cancel), Some(SwitchStatus::Cancelled));
        }
    }

    #[test]
    fn test_check_in_resets_expiry() {
        let mut sw = make_switch();
        sw.check_in(T0 + 3600).expect("check in");
        assert_eq!(sw.expires_at, T0 + 3600 + DAY);
        assert_eq!(sw.last_check_in_at, Some(T0 + 3600));
        assert_eq!(sw.status, SwitchStatus::Armed);
    }

    #[test]
    fn test_check_in_rejected_when_paused_without_mutation() {
        let mut sw = make_switch();
        sw.pause(T0).expect("pause");
        let before = sw.clone();
        let err = sw.check_in(T0 + 10).expect_err("paused");
        assert!(matches!(
            err,
            SwitchError::InvalidState {
                action: Action::CheckIn,
                status: SwitchStatus::Paused
            }
        ));
        assert_eq!(sw, before);
    }

    #[test]
    fn test_check_in_rejected_in_terminal_states() {
        for terminal in [SwitchStatus::Triggered, SwitchStatus::Cancelled, SwitchStatus::Expired] {
            let mut sw = make_switch();
            sw.status = terminal;
            let before = sw.clone();
            assert!(sw.check_in(T0).is_err());
            assert_eq!(sw, before);
        }
    }

    #[test]
    fn test_late_check_in_is_overdue() {
        let mut sw = make_switch();
        let err = sw.check_in(T0 + DAY).expect_err("deadline passed");
        assert!(matches!(err, SwitchError::Overdue { .. }));
        assert_eq!(sw.evaluate(T0 + DAY), Some(SwitchStatus::Triggered));
    }

    #[test]
    fn test_expiry_triggers() {
        let mut sw = make_switch();
        assert_eq!(sw.evaluate(T0 + DAY - 1), None);
        assert_eq!(sw.evaluate(T0 + DAY), Some(SwitchStatus::Triggered));
        assert_eq!(sw.evaluate(T0 + 2 * DAY), None);
        assert!(sw.cancel().is_err());
    }

    #[test]
    fn test_pause_resume_keeps_remaining_time() {
        let mut sw = make_switch();
        sw.pause(T0 + 6 * 3600).expect("pause");
        assert_eq!(sw.paused_remaining_secs, Some(18 * 3600));
        assert_eq!(sw.time_remaining(T0 + 10 * DAY), 18 * 3600);

        // Paused switches never expire.
        assert_eq!(sw.evaluate(T0 + 10 * DAY), None);

        sw.resume(T0 + 10 * DAY).expect("resume");
        assert_eq!(sw.status, SwitchStatus::Armed);
        assert_eq!(sw.expires_at, T0 + 10 * DAY + 18 * 3600);
        assert_eq!(sw.paused_remaining_secs, None);
    }

    #[test]
    fn test_vacation_suspends_expiry() {
        let mut sw = make_switch();
        sw.enable_vacation(T0 + 7 * DAY, T0).expect("vacation");
        assert_eq!(sw.evaluate(T0 + 3 * DAY), None);
        assert_eq!(sw.status, SwitchStatus::Vacation);

        sw.check_in(T0 + 4 * DAY).expect("check in on vacation");
        assert_eq!(sw.status, SwitchStatus::Vacation);

        sw.disable_vacation(T0 + 5 * DAY).expect("disable");
        assert_eq!(sw.status, SwitchStatus::Armed);
        assert_eq!(sw.expires_at, T0 + 6 * DAY);
    }

    #[test]
    fn test_vacation_ends_on_its_own() {
        let mut sw = make_switch();
        sw.enable_vacation(T0 + 7 * DAY, T0).expect("vacation");
        assert_eq!(sw.evaluate(T0 + 7 * DAY), Some(SwitchStatus::Armed));
        assert_eq!(sw.expires_at, T0 + 8 * DAY);
        assert_eq!(sw.vacation_until, None);
    }

    #[test]
    fn test_vacation_must_end_in_future() {
        let mut sw = make_switch();
        assert!(matches!(
            sw.enable_vacation(T0, T0),
            Err(SwitchError::InvalidVacation { .. })
        ));
        assert_eq!(sw.status, SwitchStatus::Armed);
    }

    #[test]
    fn test_end_of_life_expires_paused_switch() {
        let mut sw = make_switch();
        sw.end_of_life = Some(T0 + 30 * DAY);
        sw.pause(T0).expect("pause");
        assert_eq!(sw.evaluate(T0 + 30 * DAY), Some(SwitchStatus::Expired));
        assert!(sw.status.is_terminal());
    }

    #[test]
    fn test_recipient_validation() {
        assert!(Recipient::new("Alice", "alice@example.com").is_valid());
        assert!(!Recipient::new("", "alice@example.com").is_valid());
        assert!(!Recipient::new("Bob", "bob.example.com").is_valid());
        assert!(!Recipient::new("Bob", "bob@localhost").is_valid());
        assert!(!Recipient::new("Bob", "bob @example.com").is_valid());
    }

    #[test]
    fn test_status_wire_form() {
        let json = serde_json::to_string(&SwitchStatus::Vacation).expect("serialize");
        assert_eq!(json, "\"VACATION\"");
        let sw = make_switch();
        let back: Switch =
            serde_json::from_str(&serde_json::to_string(&sw).expect("serialize")).expect("deserialize");
        assert_eq!(back, sw);
    }
}
