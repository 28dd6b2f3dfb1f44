//! Per-tick dispense trigger evaluation.
//!
//! Each tick walks the slots in ascending id order. A due slot runs its whole
//! dispense cycle (confirmation, log entry, advancement, persistence) before
//! the next slot is looked at, so at most one slot is ever awaiting
//! confirmation and every outcome is durable before the scan moves on.

use crate::config::{AlertConfig, TimingConfig};
use crate::confirmation::run_confirmation;
use crate::dose_log::DoseLogSink;
use crate::ports::Devices;
use crate::schedule::advance;
use crate::store::ScheduleStore;
use crate::{DispenseEvent, ScheduleRecord, TimeOfDay};
use chrono::NaiveDateTime;

pub struct TriggerEvaluator<'a> {
    pub timing: &'a TimingConfig,
    pub alerts: &'a AlertConfig,
}

impl<'a> TriggerEvaluator<'a> {
    pub fn new(timing: &'a TimingConfig, alerts: &'a AlertConfig) -> Self {
        Self { timing, alerts }
    }

    /// Release stale latches, then list the slots due at `now`.
    pub fn due_slots(record: &mut ScheduleRecord, now: &NaiveDateTime) -> Vec<u8> {
        record
            .slots_mut()
            .filter_map(|slot| {
                slot.refresh_latch(now);
                slot.is_due(now).then(|| slot.id())
            })
            .collect()
    }

    /// Run one scheduling tick at `now`.
    ///
    /// Log and store failures are reported and do not stop the scan.
    pub fn run_tick(
        &self,
        record: &mut ScheduleRecord,
        now: NaiveDateTime,
        devices: &mut Devices<'_>,
        store: &mut dyn ScheduleStore,
        log: &mut dyn DoseLogSink,
    ) -> Vec<DispenseEvent> {
        let mut events = Vec::new();

        for id in Self::due_slots(record, &now) {
            let Some(slot) = record.slot_mut(id) else {
                continue;
            };
            slot.mark_triggered();
            let snapshot = slot.clone();

            // The due minute belongs to the tick's date, even when an earlier
            // slot's wait has carried the clock past midnight.
            let scheduled = snapshot.next_time().on(now.date());
            let fired_at = devices.clock.now();
            let event = run_confirmation(
                &snapshot,
                scheduled,
                fired_at,
                record.contact(),
                devices,
                self.timing,
                self.alerts,
            );

            if let Err(e) = log.append(&event.log_entry()) {
                tracing::error!("Failed to log dispense of {}: {}", event.name, e);
            }

            if let Some(slot) = record.slot_mut(id) {
                advance(slot, TimeOfDay::from(&event.dispensed_at));
            }

            if let Err(e) = store.save(record) {
                tracing::error!("Failed to persist schedule after slot {}: {}", id, e);
            }

            events.push(event);
        }

        events
    }
}
