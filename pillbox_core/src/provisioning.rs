//! Setup session: receiving a new schedule over the provisioning channel.
//!
//! Fields arrive one per line in a fixed order: the alert contact, the
//! slot-1 group, the slot-2 active flag and, if set, the slot-2 group. They
//! accumulate in a [`ProvisioningRequest`]; nothing becomes a
//! [`MedicineSlot`] until the whole request commits, so a half-received
//! slot never reaches the scheduler.
//!
//! A field that times out is taken as empty (text) or zero (numbers) and
//! the sequence carries on. Commit-time validation still rejects values a
//! slot cannot hold, such as zero doses per day.

use crate::config::TimingConfig;
use crate::ports::ProvisioningChannel;
use crate::{Error, MedicineSlot, Result, ScheduleRecord, SlotId, SlotSpec, TimeOfDay};

/// One slot field on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotField {
    Name,
    IntervalMinutes,
    DosesPerDay,
    BaseHour,
    BaseMinute,
    NextHour,
    NextMinute,
    Active,
    LastHour,
    LastMinute,
}

impl SlotField {
    pub fn label(&self) -> &'static str {
        match self {
            SlotField::Name => "name",
            SlotField::IntervalMinutes => "interval",
            SlotField::DosesPerDay => "doses per day",
            SlotField::BaseHour => "base hour",
            SlotField::BaseMinute => "base minute",
            SlotField::NextHour => "next hour",
            SlotField::NextMinute => "next minute",
            SlotField::Active => "active flag",
            SlotField::LastHour => "last dispensed hour",
            SlotField::LastMinute => "last dispensed minute",
        }
    }
}

/// Slot-1 wire order.
pub const PRIMARY_SEQUENCE: [SlotField; 10] = [
    SlotField::Name,
    SlotField::IntervalMinutes,
    SlotField::DosesPerDay,
    SlotField::BaseHour,
    SlotField::BaseMinute,
    SlotField::NextHour,
    SlotField::NextMinute,
    SlotField::Active,
    SlotField::LastHour,
    SlotField::LastMinute,
];

/// Slot-2 wire order; its active flag is received before the group.
pub const SECONDARY_SEQUENCE: [SlotField; 9] = [
    SlotField::Name,
    SlotField::IntervalMinutes,
    SlotField::DosesPerDay,
    SlotField::BaseHour,
    SlotField::BaseMinute,
    SlotField::NextHour,
    SlotField::NextMinute,
    SlotField::LastHour,
    SlotField::LastMinute,
];

/// Text fields end up in a comma-separated record.
fn sanitize_text(raw: &str) -> String {
    raw.replace([',', '\r', '\n'], " ").trim().to_string()
}

fn parse_number(raw: &str, field: &str) -> u32 {
    let trimmed = raw.trim();
    match trimmed.parse::<u32>() {
        Ok(value) => value,
        Err(_) => {
            if !trimmed.is_empty() {
                tracing::warn!("Field {} value {:?} is not a number; using 0", field, trimmed);
            }
            0
        }
    }
}

/// Fields of one slot received so far.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlotDraft {
    name: Option<String>,
    interval: Option<u32>,
    doses_per_day: Option<u32>,
    base_hour: Option<u32>,
    base_minute: Option<u32>,
    next_hour: Option<u32>,
    next_minute: Option<u32>,
    active: Option<bool>,
    last_hour: Option<u32>,
    last_minute: Option<u32>,
}

impl SlotDraft {
    /// Draft for a slot whose active flag is already known.
    pub fn with_active(active: bool) -> Self {
        Self {
            active: Some(active),
            ..Self::default()
        }
    }

    pub fn set(&mut self, field: SlotField, raw: &str) {
        let label = field.label();
        match field {
            SlotField::Name => self.name = Some(sanitize_text(raw)),
            SlotField::IntervalMinutes => self.interval = Some(parse_number(raw, label)),
            SlotField::DosesPerDay => self.doses_per_day = Some(parse_number(raw, label)),
            SlotField::BaseHour => self.base_hour = Some(parse_number(raw, label)),
            SlotField::BaseMinute => self.base_minute = Some(parse_number(raw, label)),
            SlotField::NextHour => self.next_hour = Some(parse_number(raw, label)),
            SlotField::NextMinute => self.next_minute = Some(parse_number(raw, label)),
            SlotField::Active => self.active = Some(raw.trim() == "1"),
            SlotField::LastHour => self.last_hour = Some(parse_number(raw, label)),
            SlotField::LastMinute => self.last_minute = Some(parse_number(raw, label)),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.name.is_some()
            && self.interval.is_some()
            && self.doses_per_day.is_some()
            && self.base_hour.is_some()
            && self.base_minute.is_some()
            && self.next_hour.is_some()
            && self.next_minute.is_some()
            && self.active.is_some()
            && self.last_hour.is_some()
            && self.last_minute.is_some()
    }

    /// Validate and build the slot.
    pub fn commit(self, id: SlotId) -> Result<MedicineSlot> {
        if !self.is_complete() {
            return Err(Error::Provisioning(format!("slot {} is missing fields", id)));
        }

        let time = |hour: Option<u32>, minute: Option<u32>, what: &str| {
            let (hour, minute) = (hour.unwrap_or(0), minute.unwrap_or(0));
            TimeOfDay::new(hour, minute).ok_or_else(|| {
                Error::Provisioning(format!(
                    "slot {} {} {}:{} is not a time of day",
                    id, what, hour, minute
                ))
            })
        };

        let spec = SlotSpec {
            base_time: time(self.base_hour, self.base_minute, "base time")?,
            next_time: time(self.next_hour, self.next_minute, "next time")?,
            last_dispensed: time(self.last_hour, self.last_minute, "last dispensed")?,
            name: self.name.unwrap_or_default(),
            dose_interval_minutes: self.interval.unwrap_or(0),
            doses_per_day: self.doses_per_day.unwrap_or(0),
            active: self.active.unwrap_or(false),
        };

        MedicineSlot::new(id, spec).map_err(|e| Error::Provisioning(e.to_string()))
    }
}

/// A whole schedule being received.
#[derive(Clone, Debug, Default)]
pub struct ProvisioningRequest {
    contact: Option<String>,
    primary: SlotDraft,
    secondary: Option<SlotDraft>,
}

impl ProvisioningRequest {
    pub fn set_contact(&mut self, raw: &str) {
        self.contact = Some(sanitize_text(raw));
    }

    pub fn set_primary(&mut self, field: SlotField, raw: &str) {
        self.primary.set(field, raw);
    }

    /// Record the slot-2 flag; returns whether its group follows.
    pub fn set_secondary_active(&mut self, raw: &str) -> bool {
        let active = raw.trim() == "1";
        self.secondary = active.then(|| SlotDraft::with_active(true));
        active
    }

    pub fn set_secondary(&mut self, field: SlotField, raw: &str) {
        if let Some(draft) = self.secondary.as_mut() {
            draft.set(field, raw);
        }
    }

    /// Validate every draft and produce the record, all or nothing.
    pub fn commit(self) -> Result<ScheduleRecord> {
        let contact = self
            .contact
            .ok_or_else(|| Error::Provisioning("contact was never received".into()))?;

        let mut record = ScheduleRecord::new(contact);
        record.insert(self.primary.commit(1)?);
        if let Some(draft) = self.secondary {
            record.insert(draft.commit(2)?);
        }
        Ok(record)
    }
}

fn read_field(channel: &mut dyn ProvisioningChannel, label: &str, timing: &TimingConfig) -> String {
    match channel.receive_field(timing.field_timeout()) {
        Some(value) => {
            tracing::debug!("Received {}: {:?}", label, value);
            value
        }
        None => {
            tracing::warn!("Timed out waiting for {}; using empty value", label);
            String::new()
        }
    }
}

/// Consume the field sequence of one setup session.
///
/// Blocks for up to one field timeout per field.
pub fn run_setup(
    channel: &mut dyn ProvisioningChannel,
    timing: &TimingConfig,
) -> Result<ScheduleRecord> {
    let mut request = ProvisioningRequest::default();

    let contact = read_field(channel, "contact", timing);
    request.set_contact(&contact);

    for field in PRIMARY_SEQUENCE {
        let raw = read_field(channel, &format!("slot 1 {}", field.label()), timing);
        request.set_primary(field, &raw);
    }

    let raw = read_field(channel, "slot 2 active flag", timing);
    if request.set_secondary_active(&raw) {
        for field in SECONDARY_SEQUENCE {
            let raw = read_field(channel, &format!("slot 2 {}", field.label()), timing);
            request.set_secondary(field, &raw);
        }
    }

    let record = request.commit()?;
    tracing::info!(
        "Setup received: {} slot(s), contact {}",
        record.slots().count(),
        record.contact()
    );
    Ok(record)
}
