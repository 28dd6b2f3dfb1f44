//! Device capabilities the engine drives.
//!
//! ```text
//!   Clock ─────────┐
//!   PresenceSensor ┼──▶ Controller ──▶ Dispenser / Feedback / Notifier
//!   Channel ───────┘         │
//!                            ▼
//!                   ScheduleStore · DoseLogSink
//! ```
//!
//! Real drivers and test doubles implement these traits; the engine never
//! touches hardware directly. Sensors and actuators are assumed reliable:
//! a failed actuation still counts as "dispensed, awaiting confirmation".

use crate::Result;
use chrono::NaiveDateTime;
use std::time::Duration;

/// Wall-clock time source.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;

    /// Wait before the next poll. Simulated clocks advance here.
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Compartment actuator.
pub trait Dispenser {
    fn dispense(&mut self, compartment: u8) -> Result<()>;
}

/// Detects that the dose has been picked up.
pub trait PresenceSensor {
    fn is_present(&mut self) -> bool;
}

/// Local display and annunciation.
pub trait Feedback {
    fn show(&mut self, text: &str);

    /// Start the continuous alert (buzzer/LED).
    fn alert_on(&mut self);

    fn alert_off(&mut self);
}

/// Remote notification (SMS, push).
pub trait Notifier {
    fn send(&mut self, recipient: &str, message: &str) -> Result<()>;
}

/// Line-oriented channel from the pairing app.
pub trait ProvisioningChannel {
    /// Next trimmed line, or `None` if nothing arrives within `timeout`.
    fn receive_field(&mut self, timeout: Duration) -> Option<String>;

    fn reply(&mut self, line: &str);
}

/// The devices a dispense cycle touches, borrowed for one call.
pub struct Devices<'a> {
    pub clock: &'a mut dyn Clock,
    pub dispenser: &'a mut dyn Dispenser,
    pub sensor: &'a mut dyn PresenceSensor,
    pub feedback: &'a mut dyn Feedback,
    pub notifier: &'a mut dyn Notifier,
}

impl Devices<'_> {
    /// Send a notification; failures are logged and otherwise ignored.
    pub fn notify(&mut self, recipient: &str, message: &str) {
        match self.notifier.send(recipient, message) {
            Ok(()) => tracing::info!("Notified {}: {}", recipient, message),
            Err(e) => tracing::warn!("Failed to notify {}: {}", recipient, e),
        }
    }

    /// Show the current time on the display.
    pub fn show_clock(&mut self) {
        let now = self.clock.now();
        self.feedback.show(&now.format("%H:%M:%S").to_string());
    }
}
