#![forbid(unsafe_code)]

//! Core scheduling engine for the Pillbox medicine dispenser.
//!
//! This crate provides:
//! - Domain types (time of day, medicine slots, dispense events)
//! - Schedule advancement and per-tick trigger evaluation
//! - The confirmation protocol for a dispensed dose
//! - Persistence (single-line schedule record, dispense log, archive)
//! - Provisioning of new schedules over a line channel
//! - Device port traits and the top-level controller

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod ports;
pub mod schedule;
pub mod record;
pub mod store;
pub mod dose_log;
pub mod confirmation;
pub mod trigger;
pub mod provisioning;
pub mod controller;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use ports::{Clock, Devices, Dispenser, Feedback, Notifier, PresenceSensor, ProvisioningChannel};
pub use store::{FileScheduleStore, ScheduleStore};
pub use dose_log::{CsvDoseLog, DoseLogSink};
pub use controller::{Controller, DiagnosticReply, Mode};
