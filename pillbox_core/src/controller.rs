//! Top-level controller: provisioning versus dispensing.
//!
//! ```text
//!              valid record at startup
//!   ┌──────────────┐ ───────────────▶ ┌─────────────┐
//!   │ Provisioning │   setup commits   │ Dispensing  │
//!   │              │ ───────────────▶ │             │
//!   └──────────────┘ ◀─────────────── └─────────────┘
//!                          clear
//! ```
//!
//! The controller owns the schedule; there is no other copy of slot state.
//! Provisioning and dispensing never run at the same time.

use crate::config::Config;
use crate::dose_log::DoseLogSink;
use crate::ports::{Devices, Feedback, ProvisioningChannel};
use crate::provisioning::run_setup;
use crate::store::ScheduleStore;
use crate::trigger::TriggerEvaluator;
use crate::{DispenseEvent, Error, MedicineSlot, Result, ScheduleRecord};

/// Channel reply for success.
pub const ACK: &str = "1";

/// Channel reply for a rejected setup.
pub const NACK: &str = "0";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Provisioning,
    Dispensing,
}

/// Answer to a diagnostic request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticReply {
    /// Field tuple of the requested slot.
    Slot(String),
    /// No such slot, or the request was not recognised.
    Unknown,
    /// The schedule was archived and erased.
    Cleared,
}

pub struct Controller {
    config: Config,
    store: Box<dyn ScheduleStore>,
    log: Box<dyn DoseLogSink>,
    record: Option<ScheduleRecord>,
    mode: Mode,
}

impl Controller {
    /// Load the saved schedule and pick the initial mode.
    ///
    /// A missing or corrupt record starts provisioning. A store that cannot
    /// be read at all is fatal.
    pub fn start(
        config: Config,
        store: Box<dyn ScheduleStore>,
        log: Box<dyn DoseLogSink>,
        feedback: &mut dyn Feedback,
    ) -> Result<Self> {
        let record = match store.load() {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("Schedule storage failed: {}", e);
                feedback.show("Storage failure");
                return Err(Error::StorageUnavailable(e.to_string()));
            }
        };

        let mode = if record.is_some() {
            feedback.show("Schedule loaded");
            Mode::Dispensing
        } else {
            feedback.show("Connect to set up");
            Mode::Provisioning
        };
        tracing::info!("Starting in {:?} mode", mode);

        Ok(Self {
            config,
            store,
            log,
            record,
            mode,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn record(&self) -> Option<&ScheduleRecord> {
        self.record.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serve one command word from the channel while provisioning.
    ///
    /// `check` is a liveness echo; `begin-setup` runs a full setup session
    /// and, if it commits, persists the schedule and switches to dispensing.
    /// Returns the command that was handled, if any.
    pub fn serve_provisioning(
        &mut self,
        channel: &mut dyn ProvisioningChannel,
        feedback: &mut dyn Feedback,
    ) -> Option<String> {
        if self.mode != Mode::Provisioning {
            return None;
        }

        let command = channel.receive_field(self.config.timing.command_timeout())?;
        tracing::debug!("Provisioning command: {:?}", command);

        match command.as_str() {
            "check" => channel.reply(ACK),
            "begin-setup" => {
                channel.reply(ACK);
                feedback.show("Receiving setup");
                match self.commit_setup(channel) {
                    Ok(()) => {
                        channel.reply(ACK);
                        feedback.show("Setup successful");
                    }
                    Err(e) => {
                        tracing::warn!("Setup rejected: {}", e);
                        channel.reply(NACK);
                        feedback.show("Setup failed");
                    }
                }
            }
            other => tracing::debug!("Ignoring unknown command {:?}", other),
        }

        Some(command)
    }

    fn commit_setup(&mut self, channel: &mut dyn ProvisioningChannel) -> Result<()> {
        let record = run_setup(channel, &self.config.timing)?;
        self.store.save(&record)?;
        self.record = Some(record);
        self.mode = Mode::Dispensing;
        tracing::info!("Schedule provisioned; dispensing");
        Ok(())
    }

    /// Run one scheduling tick. Does nothing unless dispensing.
    pub fn tick(&mut self, devices: &mut Devices<'_>) -> Vec<DispenseEvent> {
        if self.mode != Mode::Dispensing {
            return Vec::new();
        }
        let Some(record) = self.record.as_mut() else {
            return Vec::new();
        };

        devices.show_clock();
        let now = devices.clock.now();
        let evaluator = TriggerEvaluator::new(&self.config.timing, &self.config.alerts);
        evaluator.run_tick(record, now, devices, self.store.as_mut(), self.log.as_mut())
    }

    /// Answer `med<N>` or perform `clear`.
    pub fn handle_diagnostic(&mut self, request: &str) -> Result<DiagnosticReply> {
        let request = request.trim();

        if request == "clear" {
            self.store.archive_and_clear()?;
            self.record = None;
            self.mode = Mode::Provisioning;
            tracing::info!("Schedule cleared; back to provisioning");
            return Ok(DiagnosticReply::Cleared);
        }

        let slot = request
            .strip_prefix("med")
            .and_then(|n| n.parse::<u8>().ok())
            .and_then(|id| self.record.as_ref()?.slot(id));

        Ok(match slot {
            Some(slot) => DiagnosticReply::Slot(slot_tuple(slot)),
            None => DiagnosticReply::Unknown,
        })
    }
}

/// `name,interval,dosesPerDay,baseHour,baseMinute,nextHour,nextMinute,active,
/// lastHour,lastMinute,dosesTakenToday`
pub fn slot_tuple(slot: &MedicineSlot) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{}",
        slot.name(),
        slot.dose_interval_minutes,
        slot.doses_per_day(),
        slot.base_time.hour(),
        slot.base_time.minute(),
        slot.next_time().hour(),
        slot.next_time().minute(),
        u8::from(slot.active),
        slot.last_dispensed().hour(),
        slot.last_dispensed().minute(),
        slot.doses_taken_today()
    )
}
