//! Single-line encoding of the schedule record.
//!
//! Field order is fixed:
//!
//! ```text
//! contact, name1, interval1, dosesPerDay1, baseHour1, baseMinute1,
//! nextHour1, nextMinute1, active1, lastHour1, lastMinute1, active2
//! [, name2, interval2, dosesPerDay2, baseHour2, baseMinute2,
//!    nextHour2, nextMinute2, lastHour2, lastMinute2]
//! ```
//!
//! The slot-2 group is written only when slot 2 is active. A line with fewer
//! than [`MIN_TOKENS`] tokens decodes as "no schedule".

use crate::types::RECORD_SEPARATORS;
use crate::{Error, MedicineSlot, Result, ScheduleRecord, SlotSpec, TimeOfDay};

/// Contact plus the ten slot-1 fields.
pub const MIN_TOKENS: usize = 11;

/// Every field present, slot 2 included.
pub const FULL_TOKENS: usize = 21;

const SEPARATOR: char = ',';

/// Encode a record into its persisted line (without trailing newline).
pub fn encode(record: &ScheduleRecord) -> Result<String> {
    let primary = record
        .slot(1)
        .ok_or_else(|| Error::Record("schedule has no slot 1".into()))?;
    check_text("contact", record.contact())?;
    for slot in record.slots() {
        check_text(&format!("slot {} name", slot.id()), slot.name())?;
    }

    let mut tokens = vec![record.contact().to_string()];
    tokens.extend(slot_tokens(primary, true));

    let secondary = record.slot(2).filter(|s| s.active);
    tokens.push(flag(secondary.is_some()));
    if let Some(slot) = secondary {
        tokens.extend(slot_tokens(slot, false));
    }

    Ok(tokens.join(","))
}

/// Decode a persisted line.
///
/// Returns `None` for anything short, unparseable or out of range; the
/// caller then treats the system as unprovisioned.
pub fn decode(line: &str) -> Option<ScheduleRecord> {
    let line = line.trim();
    if line.is_empty() {
        tracing::warn!("Schedule record is empty");
        return None;
    }

    let tokens: Vec<&str> = line.split(SEPARATOR).map(str::trim).collect();
    if tokens.len() < MIN_TOKENS {
        tracing::warn!(
            "Corrupt or incomplete schedule record: {} tokens, need at least {}",
            tokens.len(),
            MIN_TOKENS
        );
        return None;
    }

    let mut record = ScheduleRecord::new(tokens[0]);

    let primary = match parse_slot(1, &tokens[1..MIN_TOKENS], None) {
        Ok(slot) => slot,
        Err(e) => {
            tracing::warn!("Discarding schedule record: {}", e);
            return None;
        }
    };
    record.insert(primary);

    let active2 = tokens.get(MIN_TOKENS).map(|t| *t == "1").unwrap_or(false);
    if active2 {
        if tokens.len() < FULL_TOKENS {
            tracing::warn!(
                "Slot 2 marked active but record has only {} tokens; ignoring slot 2",
                tokens.len()
            );
        } else {
            match parse_slot(2, &tokens[MIN_TOKENS + 1..FULL_TOKENS], Some(true)) {
                Ok(slot) => record.insert(slot),
                Err(e) => {
                    tracing::warn!("Discarding schedule record: {}", e);
                    return None;
                }
            }
        }
    }

    Some(record)
}

/// Text must survive tokenising and per-token trimming unchanged.
fn check_text(field: &str, text: &str) -> Result<()> {
    if text.contains(RECORD_SEPARATORS) {
        return Err(Error::Record(format!(
            "{} {:?} contains a record separator",
            field, text
        )));
    }
    if text.trim() != text {
        return Err(Error::Record(format!(
            "{} {:?} has surrounding whitespace",
            field, text
        )));
    }
    Ok(())
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

/// Slot fields in record order. The slot-2 group carries no active flag of
/// its own; `active2` precedes it.
fn slot_tokens(slot: &MedicineSlot, with_active: bool) -> Vec<String> {
    let mut tokens = vec![
        slot.name().to_string(),
        slot.dose_interval_minutes.to_string(),
        slot.doses_per_day().to_string(),
        slot.base_time.hour().to_string(),
        slot.base_time.minute().to_string(),
        slot.next_time().hour().to_string(),
        slot.next_time().minute().to_string(),
    ];
    if with_active {
        tokens.push(flag(slot.active));
    }
    tokens.push(slot.last_dispensed().hour().to_string());
    tokens.push(slot.last_dispensed().minute().to_string());
    tokens
}

/// Parse a slot group. `active` is `None` when the group carries its own
/// flag (slot 1), or the externally known flag otherwise (slot 2).
fn parse_slot(id: u8, tokens: &[&str], active: Option<bool>) -> Result<MedicineSlot> {
    let (active, rest) = match active {
        Some(flag) => (flag, tokens.to_vec()),
        None => {
            let mut rest = tokens.to_vec();
            let flag = rest.remove(7) == "1";
            (flag, rest)
        }
    };

    let number = |index: usize, field: &str| -> Result<u32> {
        rest[index].parse::<u32>().map_err(|_| {
            Error::Record(format!(
                "slot {} {}: {:?} is not a number",
                id, field, rest[index]
            ))
        })
    };
    let time = |hour_index: usize, field: &str| -> Result<TimeOfDay> {
        let hour = number(hour_index, field)?;
        let minute = number(hour_index + 1, field)?;
        TimeOfDay::new(hour, minute).ok_or_else(|| {
            Error::Record(format!(
                "slot {} {}: {}:{} is not a time of day",
                id, field, hour, minute
            ))
        })
    };

    let spec = SlotSpec {
        name: rest[0].to_string(),
        dose_interval_minutes: number(1, "interval")?,
        doses_per_day: number(2, "doses per day")?,
        base_time: time(3, "base time")?,
        next_time: time(5, "next time")?,
        active,
        last_dispensed: time(7, "last dispensed")?,
    };
    MedicineSlot::new(id, spec)
}
