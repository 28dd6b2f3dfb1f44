//! Schedule advancement after a dispense event.
//!
//! Rules, applied once per event regardless of outcome:
//! 1. Count the dose against today's total.
//! 2. While doses remain today, the next dose is `interval` minutes after the
//!    actual dispense time, so lateness carries forward.
//! 3. Once the day's total is reached, the counter resets and the next dose
//!    re-anchors to the slot's base time, so drift never crosses days.
//!
//! Persisting the updated record is the caller's job; see
//! [`crate::trigger::TriggerEvaluator`].

use crate::{MedicineSlot, TimeOfDay};

/// Advance `slot` after a dispense actuated at `actual`.
pub fn advance(slot: &mut MedicineSlot, actual: TimeOfDay) {
    slot.doses_taken_today = (slot.doses_taken_today + 1).min(slot.doses_per_day());

    if slot.doses_taken_today < slot.doses_per_day() {
        slot.next_time = actual.add_minutes(slot.dose_interval_minutes);
    } else {
        slot.doses_taken_today = 0;
        slot.next_time = slot.base_time;
        tracing::debug!("Slot {} completed its day cycle", slot.id());
    }

    slot.last_dispensed = actual;

    // A zero-length step lands back on the minute that just fired; keep the
    // latch so the same minute cannot produce a second outcome.
    if slot.next_time != actual {
        slot.clear_trigger_latch();
    }

    tracing::info!(
        "Next dose for {} (slot {}) at {} ({}/{} today)",
        slot.name(),
        slot.id(),
        slot.next_time,
        slot.doses_taken_today,
        slot.doses_per_day()
    );
}
