//! Core domain types for the Pillbox dispenser.
//!
//! This module defines the fundamental types used throughout the system:
//! - Time-of-day arithmetic with midnight wraparound
//! - Medicine slots (one per compartment) and their trigger latch
//! - Dispense outcomes, events and log entries
//! - The persisted schedule aggregate

use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Minutes in one day cycle.
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Number of compartments the record format can describe.
pub const MAX_SLOTS: u8 = 2;

/// Compartment index, 1-based.
pub type SlotId = u8;

// ============================================================================
// Time of Day
// ============================================================================

/// An (hour, minute) pair that is always in range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay { hour: 0, minute: 0 };

    /// Returns `None` when `hour > 23` or `minute > 59`.
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self {
                hour: hour as u8,
                minute: minute as u8,
            })
        } else {
            None
        }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    pub fn minutes_since_midnight(&self) -> u32 {
        u32::from(self.hour) * 60 + u32::from(self.minute)
    }

    /// Add minutes, wrapping past midnight.
    pub fn add_minutes(self, minutes: u32) -> Self {
        wrap_time_of_day(u64::from(self.minutes_since_midnight()) + u64::from(minutes))
    }

    /// Combine with a calendar date.
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or_else(|| date.and_time(NaiveTime::default()))
    }

    /// True when `now` falls inside this minute.
    pub fn matches(&self, now: &NaiveDateTime) -> bool {
        now.hour() == u32::from(self.hour) && now.minute() == u32::from(self.minute)
    }
}

impl From<&NaiveDateTime> for TimeOfDay {
    fn from(dt: &NaiveDateTime) -> Self {
        Self {
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Convert a minute count into a time of day, modulo one day.
pub fn wrap_time_of_day(total_minutes: u64) -> TimeOfDay {
    let wrapped = (total_minutes % u64::from(MINUTES_PER_DAY)) as u32;
    TimeOfDay {
        hour: (wrapped / 60) as u8,
        minute: (wrapped % 60) as u8,
    }
}

// ============================================================================
// Medicine Slot
// ============================================================================

/// Everything needed to build a slot. Produced by provisioning and by the
/// record decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotSpec {
    pub name: String,
    pub dose_interval_minutes: u32,
    pub doses_per_day: u32,
    pub base_time: TimeOfDay,
    pub next_time: TimeOfDay,
    pub active: bool,
    pub last_dispensed: TimeOfDay,
}

/// Characters that would split a persisted record.
pub(crate) const RECORD_SEPARATORS: [char; 3] = [',', '\n', '\r'];

/// One medicine's schedule and counters, bound to a compartment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MedicineSlot {
    id: SlotId,
    name: String,
    pub dose_interval_minutes: u32,
    doses_per_day: u32,
    pub base_time: TimeOfDay,
    pub(crate) next_time: TimeOfDay,
    pub(crate) doses_taken_today: u32,
    pub active: bool,
    pub(crate) last_dispensed: TimeOfDay,
    #[serde(skip)]
    triggered_this_minute: bool,
}

impl MedicineSlot {
    /// Build a slot from fully provisioned fields.
    ///
    /// Surrounding whitespace is dropped from the name; the record format
    /// cannot carry it.
    pub fn new(id: SlotId, spec: SlotSpec) -> Result<Self> {
        if id == 0 || id > MAX_SLOTS {
            return Err(Error::Record(format!(
                "slot id {} outside 1..={}",
                id, MAX_SLOTS
            )));
        }
        if spec.doses_per_day == 0 {
            return Err(Error::Record(format!(
                "slot {}: doses_per_day must be at least 1",
                id
            )));
        }
        if spec.name.contains(RECORD_SEPARATORS) {
            return Err(Error::Record(format!(
                "slot {}: name {:?} contains a record separator",
                id, spec.name
            )));
        }

        Ok(Self {
            id,
            name: spec.name.trim().to_string(),
            dose_interval_minutes: spec.dose_interval_minutes,
            doses_per_day: spec.doses_per_day,
            base_time: spec.base_time,
            next_time: spec.next_time,
            doses_taken_today: 0,
            active: spec.active,
            last_dispensed: spec.last_dispensed,
            triggered_this_minute: false,
        })
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doses_per_day(&self) -> u32 {
        self.doses_per_day
    }

    pub fn doses_taken_today(&self) -> u32 {
        self.doses_taken_today
    }

    pub fn next_time(&self) -> TimeOfDay {
        self.next_time
    }

    pub fn last_dispensed(&self) -> TimeOfDay {
        self.last_dispensed
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered_this_minute
    }

    /// Active, inside the `next_time` minute, and not yet fired for it.
    pub fn is_due(&self, now: &NaiveDateTime) -> bool {
        self.active && self.next_time.matches(now) && !self.triggered_this_minute
    }

    pub fn mark_triggered(&mut self) {
        self.triggered_this_minute = true;
    }

    pub fn clear_trigger_latch(&mut self) {
        self.triggered_this_minute = false;
    }

    /// Drop the latch once `now` has left the `next_time` minute.
    pub fn refresh_latch(&mut self, now: &NaiveDateTime) {
        if self.triggered_this_minute && !self.next_time.matches(now) {
            self.triggered_this_minute = false;
        }
    }

    /// The [`SlotSpec`] describing this slot's current fields.
    pub fn spec(&self) -> SlotSpec {
        SlotSpec {
            name: self.name.clone(),
            dose_interval_minutes: self.dose_interval_minutes,
            doses_per_day: self.doses_per_day,
            base_time: self.base_time,
            next_time: self.next_time,
            active: self.active,
            last_dispensed: self.last_dispensed,
        }
    }
}

// ============================================================================
// Dispense Outcomes
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoseOutcome {
    Taken,
    Missed,
}

impl fmt::Display for DoseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoseOutcome::Taken => write!(f, "taken"),
            DoseOutcome::Missed => write!(f, "missed"),
        }
    }
}

/// Result of one complete dispense cycle for one slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispenseEvent {
    pub slot_id: SlotId,
    pub name: String,
    /// Date of the trigger combined with the slot's `next_time`.
    pub scheduled: NaiveDateTime,
    /// When the compartment was actuated; schedule advancement anchors here.
    pub dispensed_at: NaiveDateTime,
    /// Presence detection time, only for `Taken`.
    pub confirmed_at: Option<NaiveDateTime>,
    pub outcome: DoseOutcome,
    pub escalated: bool,
}

impl DispenseEvent {
    pub fn log_entry(&self) -> DispenseLogEntry {
        DispenseLogEntry {
            scheduled: self.scheduled,
            actual: self.confirmed_at,
            outcome: self.outcome,
        }
    }
}

/// Append-only record of scheduled versus actual intake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DispenseLogEntry {
    pub scheduled: NaiveDateTime,
    pub actual: Option<NaiveDateTime>,
    pub outcome: DoseOutcome,
}

// ============================================================================
// Schedule Record
// ============================================================================

/// The persisted aggregate: alert contact plus every slot, keyed by id.
///
/// Iteration order is ascending slot id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleRecord {
    contact: String,
    slots: BTreeMap<SlotId, MedicineSlot>,
}

impl ScheduleRecord {
    /// Surrounding whitespace is dropped from the contact.
    pub fn new(contact: impl Into<String>) -> Self {
        Self {
            contact: contact.into().trim().to_string(),
            slots: BTreeMap::new(),
        }
    }

    /// Recipient of dose notifications.
    pub fn contact(&self) -> &str {
        &self.contact
    }

    /// Insert or replace the slot with the same id.
    pub fn insert(&mut self, slot: MedicineSlot) {
        self.slots.insert(slot.id(), slot);
    }

    pub fn slot(&self, id: SlotId) -> Option<&MedicineSlot> {
        self.slots.get(&id)
    }

    pub fn slot_mut(&mut self, id: SlotId) -> Option<&mut MedicineSlot> {
        self.slots.get_mut(&id)
    }

    pub fn slots(&self) -> impl Iterator<Item = &MedicineSlot> {
        self.slots.values()
    }

    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut MedicineSlot> {
        self.slots.values_mut()
    }

    pub fn slot_ids(&self) -> Vec<SlotId> {
        self.slots.keys().copied().collect()
    }

    pub fn is_active(&self, id: SlotId) -> bool {
        self.slot(id).map(|s| s.active).unwrap_or(false)
    }
}
