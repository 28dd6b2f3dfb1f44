//! End-to-end dispense cycles against recording devices.

mod common;

use common::*;
use pillbox_core::config::{AlertConfig, TimingConfig};
use pillbox_core::record;
use pillbox_core::trigger::TriggerEvaluator;
use pillbox_core::{
    Config, Controller, CsvDoseLog, DoseOutcome, Error, FileScheduleStore, MedicineSlot, Mode,
    Result, ScheduleRecord, ScheduleStore, SlotSpec,
};

fn single_slot(name: &str, interval: u32, doses: u32) -> ScheduleRecord {
    let mut schedule = ScheduleRecord::new("+15550100");
    schedule.insert(slot(1, name, tod(8, 0), interval, doses));
    schedule
}

fn tick(
    schedule: &mut ScheduleRecord,
    rig: &mut Rig,
    store: &mut MemoryStore,
    log: &mut MemoryLog,
) -> Vec<pillbox_core::DispenseEvent> {
    let timing = TimingConfig::default();
    let alerts = AlertConfig::default();
    let now = rig.clock.now;
    TriggerEvaluator::new(&timing, &alerts).run_tick(schedule, now, &mut rig.devices(), store, log)
}

#[test]
fn test_taken_dose_is_confirmed_logged_and_persisted() {
    let mut schedule = single_slot("Warfarin", 720, 2);
    let mut rig = Rig::new(at(1, 8, 0, 0), ScriptedSensor::present_after(2));
    let mut store = MemoryStore::default();
    let mut log = MemoryLog::default();

    let events = tick(&mut schedule, &mut rig, &mut store, &mut log);

    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.outcome, DoseOutcome::Taken);
    assert_eq!(event.dispensed_at, at(1, 8, 0, 0));
    assert_eq!(event.confirmed_at, Some(at(1, 8, 0, 2)));
    assert!(!event.escalated);

    assert_eq!(rig.dispenser.compartments, vec![1]);
    assert_eq!(rig.notifier.messages(), vec!["Warfarin was taken"]);
    assert_eq!(rig.notifier.sent[0].0, "+15550100");

    let calls = &rig.feedback.calls;
    let shown = calls
        .iter()
        .position(|c| *c == FeedbackCall::Show("Dispensing Warfarin".into()))
        .unwrap();
    let on = calls.iter().position(|c| *c == FeedbackCall::AlertOn).unwrap();
    let off = calls.iter().position(|c| *c == FeedbackCall::AlertOff).unwrap();
    assert!(shown < on && on < off);
    assert!(!rig.feedback.alert_active());

    assert_eq!(log.entries.len(), 1);
    assert_eq!(log.entries[0].scheduled, at(1, 8, 0, 0));
    assert_eq!(log.entries[0].actual, Some(at(1, 8, 0, 2)));

    assert_eq!(store.saved.len(), 1);
    let saved = record::decode(&store.saved[0]).unwrap();
    assert_eq!(saved.slot(1).unwrap().next_time(), tod(20, 0));
    assert_eq!(saved.slot(1).unwrap().last_dispensed(), tod(8, 0));
    assert_eq!(schedule.slot(1).unwrap().doses_taken_today(), 1);
}

#[test]
fn test_missed_dose_warns_once_then_escalates() {
    let mut schedule = single_slot("Warfarin", 720, 2);
    let mut rig = Rig::new(at(1, 8, 0, 0), ScriptedSensor::always(false));
    let mut store = MemoryStore::default();
    let mut log = MemoryLog::default();

    let events = tick(&mut schedule, &mut rig, &mut store, &mut log);

    let event = &events[0];
    assert_eq!(event.outcome, DoseOutcome::Missed);
    assert!(event.escalated);
    assert_eq!(event.confirmed_at, None);
    assert_eq!(
        rig.notifier.messages(),
        vec!["Warfarin has not been taken yet", "Warfarin was missed"]
    );
    assert!(!rig.feedback.alert_active());
    assert_eq!(rig.clock.now, at(1, 8, 2, 0));

    assert_eq!(log.entries[0].actual, None);
    assert_eq!(log.entries[0].outcome, DoseOutcome::Missed);

    // A missed dose still advances, anchored to when it was dispensed
    assert_eq!(schedule.slot(1).unwrap().next_time(), tod(20, 0));
}

#[test]
fn test_day_cycle_resets_to_base_time() {
    let mut schedule = single_slot("Metformin", 360, 3);
    let mut rig = Rig::new(at(1, 8, 0, 0), ScriptedSensor::always(true));
    let mut store = MemoryStore::default();
    let mut log = MemoryLog::default();

    let mut fired = Vec::new();
    for (day, hour) in [(1, 8), (1, 14), (1, 20), (2, 8)] {
        rig.clock.now = at(day, hour, 0, 0);
        let events = tick(&mut schedule, &mut rig, &mut store, &mut log);
        assert_eq!(events.len(), 1, "expected a dose at day {} {:02}:00", day, hour);
        fired.push(schedule.slot(1).unwrap().next_time());
    }

    assert_eq!(fired, vec![tod(14, 0), tod(20, 0), tod(8, 0), tod(14, 0)]);
    assert_eq!(log.entries.len(), 4);
}

#[test]
fn test_same_minute_slots_run_in_order_and_lateness_carries() {
    let mut schedule = ScheduleRecord::new("+15550100");
    schedule.insert(slot(2, "Digoxin", tod(8, 0), 60, 2));
    schedule.insert(slot(1, "Warfarin", tod(8, 0), 720, 2));

    // Slot 1 sees nobody for its whole window; slot 2 is picked up at once
    let mut rig = Rig::new(at(1, 8, 0, 0), ScriptedSensor::present_after(121));
    let mut store = MemoryStore::default();
    let mut log = MemoryLog::default();

    let events = tick(&mut schedule, &mut rig, &mut store, &mut log);

    assert_eq!(events.iter().map(|e| e.slot_id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(events[0].outcome, DoseOutcome::Missed);
    assert_eq!(events[1].outcome, DoseOutcome::Taken);
    assert_eq!(events[1].dispensed_at, at(1, 8, 2, 0));
    assert_eq!(rig.dispenser.compartments, vec![1, 2]);

    // Slot 1's outcome was durable before slot 2 was dispensed
    assert_eq!(store.saved.len(), 2);
    let first = record::decode(&store.saved[0]).unwrap();
    assert_eq!(first.slot(1).unwrap().next_time(), tod(20, 0));
    assert_eq!(first.slot(2).unwrap().next_time(), tod(8, 0));

    assert_eq!(schedule.slot(2).unwrap().next_time(), tod(9, 2));
    assert_eq!(log.entries[1].scheduled, at(1, 8, 0, 0));
    assert_eq!(log.entries[1].actual, Some(at(1, 8, 2, 0)));
}

#[test]
fn test_wait_across_midnight_keeps_scheduled_date() {
    let mut schedule = ScheduleRecord::new("+15550100");
    schedule.insert(slot(1, "Warfarin", tod(23, 59), 720, 2));
    schedule.insert(slot(2, "Digoxin", tod(23, 59), 60, 2));

    // Slot 1's full window runs past midnight before slot 2 is dispensed
    let mut rig = Rig::new(at(1, 23, 59, 0), ScriptedSensor::always(false));
    let mut store = MemoryStore::default();
    let mut log = MemoryLog::default();

    let events = tick(&mut schedule, &mut rig, &mut store, &mut log);

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].outcome, DoseOutcome::Missed);
    assert_eq!(events[1].dispensed_at, at(2, 0, 1, 0));
    assert_eq!(events[1].scheduled, at(1, 23, 59, 0));

    assert_eq!(log.entries.len(), 2);
    assert_eq!(log.entries[0].scheduled, at(1, 23, 59, 0));
    assert_eq!(log.entries[1].scheduled, at(1, 23, 59, 0));
}

#[test]
fn test_latch_blocks_refire_within_the_minute() {
    // One dose a day lands right back on the minute that just fired
    let mut schedule = single_slot("Atorvastatin", 1440, 1);
    let mut rig = Rig::new(at(1, 8, 0, 0), ScriptedSensor::always(true));
    let mut store = MemoryStore::default();
    let mut log = MemoryLog::default();

    assert_eq!(tick(&mut schedule, &mut rig, &mut store, &mut log).len(), 1);
    assert_eq!(schedule.slot(1).unwrap().next_time(), tod(8, 0));
    assert!(schedule.slot(1).unwrap().is_triggered());

    rig.clock.now = at(1, 8, 0, 30);
    assert!(tick(&mut schedule, &mut rig, &mut store, &mut log).is_empty());

    rig.clock.now = at(1, 8, 1, 0);
    assert!(tick(&mut schedule, &mut rig, &mut store, &mut log).is_empty());
    assert!(!schedule.slot(1).unwrap().is_triggered());

    rig.clock.now = at(2, 8, 0, 0);
    assert_eq!(tick(&mut schedule, &mut rig, &mut store, &mut log).len(), 1);
    assert_eq!(rig.dispenser.compartments, vec![1, 1]);
}

#[test]
fn test_inactive_slot_never_fires() {
    let mut schedule = single_slot("Warfarin", 720, 2);
    schedule.insert(
        MedicineSlot::new(
            2,
            SlotSpec {
                name: "Digoxin".into(),
                dose_interval_minutes: 60,
                doses_per_day: 2,
                base_time: tod(9, 0),
                next_time: tod(9, 0),
                active: false,
                last_dispensed: tod(0, 0),
            },
        )
        .unwrap(),
    );
    let mut rig = Rig::new(at(1, 9, 0, 0), ScriptedSensor::always(true));
    let mut store = MemoryStore::default();
    let mut log = MemoryLog::default();

    assert!(tick(&mut schedule, &mut rig, &mut store, &mut log).is_empty());
    assert!(rig.dispenser.compartments.is_empty());
    assert!(store.saved.is_empty());
}

struct BrokenStore;

impl ScheduleStore for BrokenStore {
    fn load(&self) -> Result<Option<ScheduleRecord>> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "flash unreadable",
        )))
    }

    fn save(&mut self, _schedule: &ScheduleRecord) -> Result<()> {
        Err(Error::StorageUnavailable("flash unwritable".into()))
    }

    fn archive_and_clear(&mut self) -> Result<()> {
        Err(Error::StorageUnavailable("flash unwritable".into()))
    }
}

#[test]
fn test_save_failure_does_not_stop_the_tick() {
    let mut schedule = ScheduleRecord::new("+15550100");
    schedule.insert(slot(1, "Warfarin", tod(8, 0), 720, 2));
    schedule.insert(slot(2, "Digoxin", tod(8, 0), 60, 2));
    let mut rig = Rig::new(at(1, 8, 0, 0), ScriptedSensor::always(true));
    let mut log = MemoryLog::default();

    let timing = TimingConfig::default();
    let alerts = AlertConfig::default();
    let events = TriggerEvaluator::new(&timing, &alerts).run_tick(
        &mut schedule,
        at(1, 8, 0, 0),
        &mut rig.devices(),
        &mut BrokenStore,
        &mut log,
    );

    assert_eq!(events.len(), 2);
    assert_eq!(log.entries.len(), 2);
}

#[test]
fn test_unreadable_storage_is_fatal_at_start() {
    let mut feedback = RecordingFeedback::default();
    let result = Controller::start(
        Config::default(),
        Box::new(BrokenStore),
        Box::new(MemoryLog::default()),
        &mut feedback,
    );

    assert!(matches!(result, Err(Error::StorageUnavailable(_))));
    assert_eq!(feedback.shown(), vec!["Storage failure"]);
}

#[test]
fn test_provision_dispense_and_restart() {
    let temp_dir = tempfile::tempdir().unwrap();
    let open = |feedback: &mut RecordingFeedback| {
        let store = FileScheduleStore::open(temp_dir.path()).unwrap();
        let log = CsvDoseLog::new(temp_dir.path().join(CsvDoseLog::LOG_FILE));
        Controller::start(Config::default(), Box::new(store), Box::new(log), feedback).unwrap()
    };

    let mut rig = Rig::new(at(1, 7, 59, 50), ScriptedSensor::present_after(5));
    let mut ctl = open(&mut rig.feedback);
    assert_eq!(ctl.mode(), Mode::Provisioning);

    let mut channel = ScriptedChannel::new(&[
        "begin-setup",
        "+15550100",
        "Warfarin",
        "720",
        "2",
        "8",
        "0",
        "8",
        "0",
        "1",
        "0",
        "0",
        "0",
    ]);
    ctl.serve_provisioning(&mut channel, &mut rig.feedback);
    assert_eq!(channel.replies, vec!["1", "1"]);
    assert_eq!(ctl.mode(), Mode::Dispensing);

    // Not yet due
    assert!(ctl.tick(&mut rig.devices()).is_empty());

    rig.clock.now = at(1, 8, 0, 5);
    let events = ctl.tick(&mut rig.devices());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].confirmed_at, Some(at(1, 8, 0, 10)));

    let log = std::fs::read_to_string(temp_dir.path().join(CsvDoseLog::LOG_FILE)).unwrap();
    assert_eq!(log, "2024-03-01 08:00,2024-03-01 08:00\n");

    let restarted = open(&mut rig.feedback);
    assert_eq!(restarted.mode(), Mode::Dispensing);
    let slot = restarted.record().unwrap().slot(1).unwrap();
    assert_eq!(slot.next_time(), tod(20, 0));
    assert_eq!(slot.last_dispensed(), tod(8, 0));
}
