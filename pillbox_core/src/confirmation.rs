//! Confirmation protocol for one dispense cycle.
//!
//! ```text
//! Idle ─▶ Triggered ─▶ AwaitingConfirmation ─┬─▶ Confirmed ─┐
//!                                            └─▶ Escalated ─┴─▶ Resolved
//! ```
//!
//! [`ConfirmationSession`] is the pure state machine: it is fed `(now,
//! present)` samples and never blocks. [`run_confirmation`] drives it over
//! the device ports at the configured poll cadence.
//!
//! The early warning is tracked on the session, not per poll, so it goes
//! out at most once per dispense event.

use crate::config::{AlertConfig, TimingConfig};
use crate::ports::Devices;
use crate::{DispenseEvent, DoseOutcome, MedicineSlot};
use chrono::NaiveDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmationState {
    Idle,
    Triggered,
    AwaitingConfirmation,
    Confirmed,
    Escalated,
    Resolved,
}

/// What a single poll observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollStep {
    /// Still waiting, nothing to do.
    Waiting,
    /// The escalation delay just elapsed; send the missed-dose warning.
    Warn,
    /// Presence detected before the deadline.
    Confirmed(NaiveDateTime),
    /// Deadline reached without presence.
    Missed,
}

#[derive(Debug, Clone)]
pub struct ConfirmationSession {
    state: ConfirmationState,
    started: Option<NaiveDateTime>,
    confirmed_at: Option<NaiveDateTime>,
    timeout: chrono::Duration,
    escalation_delay: chrono::Duration,
    escalated: bool,
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(duration.as_millis() as i64)
}

impl ConfirmationSession {
    pub fn new(timing: &TimingConfig) -> Self {
        Self {
            state: ConfirmationState::Idle,
            started: None,
            confirmed_at: None,
            timeout: to_chrono(timing.confirmation_timeout()),
            escalation_delay: to_chrono(timing.escalation_delay()),
            escalated: false,
        }
    }

    pub fn state(&self) -> ConfirmationState {
        self.state
    }

    pub fn escalated(&self) -> bool {
        self.escalated
    }

    pub fn confirmed_at(&self) -> Option<NaiveDateTime> {
        self.confirmed_at
    }

    /// Wall-clock deadline, once the wait has started.
    pub fn deadline(&self) -> Option<NaiveDateTime> {
        self.started.map(|start| start + self.timeout)
    }

    pub fn trigger(&mut self) {
        if self.state == ConfirmationState::Idle {
            self.state = ConfirmationState::Triggered;
        }
    }

    /// Start the bounded wait at `now`.
    pub fn begin_wait(&mut self, now: NaiveDateTime) {
        if self.state == ConfirmationState::Triggered {
            self.started = Some(now);
            self.state = ConfirmationState::AwaitingConfirmation;
        }
    }

    pub fn poll(&mut self, now: NaiveDateTime, present: bool) -> PollStep {
        match self.state {
            ConfirmationState::AwaitingConfirmation => {}
            ConfirmationState::Confirmed => {
                return self
                    .confirmed_at
                    .map(PollStep::Confirmed)
                    .unwrap_or(PollStep::Missed)
            }
            ConfirmationState::Escalated => return PollStep::Missed,
            _ => return PollStep::Waiting,
        }

        let started = self.started.unwrap_or(now);
        // A clock stepping backwards counts as no time elapsed
        let elapsed = (now - started).max(chrono::Duration::zero());

        if present && elapsed < self.timeout {
            self.state = ConfirmationState::Confirmed;
            self.confirmed_at = Some(now);
            return PollStep::Confirmed(now);
        }

        if elapsed >= self.timeout {
            self.state = ConfirmationState::Escalated;
            return PollStep::Missed;
        }

        if elapsed > self.escalation_delay && !self.escalated {
            self.escalated = true;
            return PollStep::Warn;
        }

        PollStep::Waiting
    }

    /// Close the session. Returns the outcome only from a terminal state.
    pub fn resolve(&mut self) -> Option<DoseOutcome> {
        let outcome = match self.state {
            ConfirmationState::Confirmed => DoseOutcome::Taken,
            ConfirmationState::Escalated => DoseOutcome::Missed,
            _ => return None,
        };
        self.state = ConfirmationState::Resolved;
        Some(outcome)
    }
}

/// Run a full dispense cycle for `slot`, due at `scheduled` and actuated at
/// `fired_at`.
///
/// `fired_at` can fall after midnight when an earlier slot's wait ran over,
/// so the scheduled date is supplied by the caller rather than derived here.
/// Blocks until the dose is confirmed or the deadline passes; every call
/// ends with a definite outcome.
pub fn run_confirmation(
    slot: &MedicineSlot,
    scheduled: NaiveDateTime,
    fired_at: NaiveDateTime,
    contact: &str,
    devices: &mut Devices<'_>,
    timing: &TimingConfig,
    alerts: &AlertConfig,
) -> DispenseEvent {
    let mut session = ConfirmationSession::new(timing);

    session.trigger();
    tracing::info!(
        "Dispensing {} from compartment {} (scheduled {})",
        slot.name(),
        slot.id(),
        scheduled.format("%H:%M")
    );
    devices.feedback.show(&format!("Dispensing {}", slot.name()));
    if let Err(e) = devices.dispenser.dispense(slot.id()) {
        tracing::warn!("Dispenser reported an error for compartment {}: {}", slot.id(), e);
    }

    devices.feedback.alert_on();
    session.begin_wait(devices.clock.now());

    loop {
        let now = devices.clock.now();
        let present = devices.sensor.is_present();

        match session.poll(now, present) {
            PollStep::Waiting => {}
            PollStep::Warn => {
                tracing::warn!("{} not taken after escalation delay", slot.name());
                devices.notify(contact, &alerts.warning_for(slot.name()));
            }
            PollStep::Confirmed(at) => {
                devices.feedback.alert_off();
                tracing::info!("{} taken at {}", slot.name(), at.format("%H:%M:%S"));
                devices.notify(contact, &alerts.taken_for(slot.name()));
                break;
            }
            PollStep::Missed => {
                devices.feedback.alert_off();
                tracing::warn!("{} missed: no pickup before deadline", slot.name());
                devices.notify(contact, &alerts.missed_for(slot.name()));
                break;
            }
        }

        devices.show_clock();
        devices.clock.sleep(timing.poll_interval());
    }

    let outcome = session.resolve().unwrap_or(DoseOutcome::Missed);
    DispenseEvent {
        slot_id: slot.id(),
        name: slot.name().to_string(),
        scheduled,
        dispensed_at: fired_at,
        confirmed_at: session.confirmed_at(),
        outcome,
        escalated: session.escalated(),
    }
}
