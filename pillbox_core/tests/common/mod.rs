//! Recording test doubles for the device ports.
//!
//! Every call is captured so tests can assert on the full command history.
//! The clock only moves when the engine sleeps, which makes waits
//! deterministic and instant.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use pillbox_core::dose_log::DoseLogSink;
use pillbox_core::record;
use pillbox_core::{
    Clock, Devices, DispenseLogEntry, Dispenser, Feedback, MedicineSlot, Notifier,
    PresenceSensor, ProvisioningChannel, Result, ScheduleRecord, ScheduleStore, SlotSpec,
    TimeOfDay,
};
use std::collections::VecDeque;
use std::time::Duration;

pub fn at(day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(hour, minute, second)
        .unwrap()
}

pub fn tod(hour: u32, minute: u32) -> TimeOfDay {
    TimeOfDay::new(hour, minute).unwrap()
}

pub fn slot(id: u8, name: &str, base: TimeOfDay, interval: u32, doses: u32) -> MedicineSlot {
    MedicineSlot::new(
        id,
        SlotSpec {
            name: name.into(),
            dose_interval_minutes: interval,
            doses_per_day: doses,
            base_time: base,
            next_time: base,
            active: true,
            last_dispensed: TimeOfDay::MIDNIGHT,
        },
    )
    .unwrap()
}

// ── Clock ─────────────────────────────────────────────────────

pub struct FakeClock {
    pub now: NaiveDateTime,
    pub sleeps: usize,
}

impl FakeClock {
    pub fn at(now: NaiveDateTime) -> Self {
        Self { now, sleeps: 0 }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> NaiveDateTime {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps += 1;
        self.now += chrono::Duration::milliseconds(duration.as_millis() as i64);
    }
}

// ── Sensor ────────────────────────────────────────────────────

/// Plays back a fixed sequence of readings, then a default.
pub struct ScriptedSensor {
    pub readings: VecDeque<bool>,
    pub default: bool,
    pub polls: usize,
}

impl ScriptedSensor {
    pub fn always(present: bool) -> Self {
        Self {
            readings: VecDeque::new(),
            default: present,
            polls: 0,
        }
    }

    /// Absent for `polls` readings, present afterwards.
    pub fn present_after(polls: usize) -> Self {
        Self {
            readings: std::iter::repeat(false).take(polls).collect(),
            default: true,
            polls: 0,
        }
    }
}

impl PresenceSensor for ScriptedSensor {
    fn is_present(&mut self) -> bool {
        self.polls += 1;
        self.readings.pop_front().unwrap_or(self.default)
    }
}

// ── Actuators ─────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingDispenser {
    pub compartments: Vec<u8>,
}

impl Dispenser for RecordingDispenser {
    fn dispense(&mut self, compartment: u8) -> Result<()> {
        self.compartments.push(compartment);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackCall {
    Show(String),
    AlertOn,
    AlertOff,
}

#[derive(Default)]
pub struct RecordingFeedback {
    pub calls: Vec<FeedbackCall>,
}

impl RecordingFeedback {
    pub fn alert_active(&self) -> bool {
        self.calls
            .iter()
            .rev()
            .find_map(|c| match c {
                FeedbackCall::AlertOn => Some(true),
                FeedbackCall::AlertOff => Some(false),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub fn shown(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                FeedbackCall::Show(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Feedback for RecordingFeedback {
    fn show(&mut self, text: &str) {
        self.calls.push(FeedbackCall::Show(text.to_string()));
    }

    fn alert_on(&mut self) {
        self.calls.push(FeedbackCall::AlertOn);
    }

    fn alert_off(&mut self) {
        self.calls.push(FeedbackCall::AlertOff);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Vec<(String, String)>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<&str> {
        self.sent.iter().map(|(_, m)| m.as_str()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&mut self, recipient: &str, message: &str) -> Result<()> {
        self.sent.push((recipient.to_string(), message.to_string()));
        Ok(())
    }
}

// ── Bundle ────────────────────────────────────────────────────

pub struct Rig {
    pub clock: FakeClock,
    pub dispenser: RecordingDispenser,
    pub sensor: ScriptedSensor,
    pub feedback: RecordingFeedback,
    pub notifier: RecordingNotifier,
}

impl Rig {
    pub fn new(now: NaiveDateTime, sensor: ScriptedSensor) -> Self {
        Self {
            clock: FakeClock::at(now),
            dispenser: RecordingDispenser::default(),
            sensor,
            feedback: RecordingFeedback::default(),
            notifier: RecordingNotifier::default(),
        }
    }

    pub fn devices(&mut self) -> Devices<'_> {
        Devices {
            clock: &mut self.clock,
            dispenser: &mut self.dispenser,
            sensor: &mut self.sensor,
            feedback: &mut self.feedback,
            notifier: &mut self.notifier,
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

/// Keeps every saved line so tests can check persistence order.
#[derive(Default)]
pub struct MemoryStore {
    pub saved: Vec<String>,
    pub archived: Vec<String>,
}

impl ScheduleStore for MemoryStore {
    fn load(&self) -> Result<Option<ScheduleRecord>> {
        Ok(self.saved.last().and_then(|line| record::decode(line)))
    }

    fn save(&mut self, schedule: &ScheduleRecord) -> Result<()> {
        self.saved.push(record::encode(schedule)?);
        Ok(())
    }

    fn archive_and_clear(&mut self) -> Result<()> {
        if let Some(line) = self.saved.pop() {
            self.archived.push(line);
        }
        self.saved.clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLog {
    pub entries: Vec<DispenseLogEntry>,
}

impl DoseLogSink for MemoryLog {
    fn append(&mut self, entry: &DispenseLogEntry) -> Result<()> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

// ── Channel ───────────────────────────────────────────────────

pub struct ScriptedChannel {
    pub lines: VecDeque<String>,
    pub replies: Vec<String>,
}

impl ScriptedChannel {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            replies: Vec::new(),
        }
    }
}

impl ProvisioningChannel for ScriptedChannel {
    fn receive_field(&mut self, _timeout: Duration) -> Option<String> {
        self.lines.pop_front()
    }

    fn reply(&mut self, line: &str) {
        self.replies.push(line.to_string());
    }
}
