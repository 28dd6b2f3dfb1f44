//! Host drivers for running the controller from a terminal.
//!
//! The pairing channel is stdin/stdout; the dispenser and notifier report
//! through tracing; pickup is signalled by touching a flag file in the data
//! directory.

use pillbox_core::{Clock, Dispenser, Feedback, Notifier, PresenceSensor, ProvisioningChannel, Result};
use chrono::NaiveDateTime;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

/// Local wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

pub struct LoggingDispenser;

impl Dispenser for LoggingDispenser {
    fn dispense(&mut self, compartment: u8) -> Result<()> {
        tracing::info!("Actuating compartment {}", compartment);
        Ok(())
    }
}

pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn send(&mut self, recipient: &str, message: &str) -> Result<()> {
        tracing::info!(target: "pillbox::sms", "To {}: {}", recipient, message);
        Ok(())
    }
}

/// Display text goes to the debug log; alerts are logged once per change.
#[derive(Default)]
pub struct ConsoleFeedback {
    alerting: bool,
}

impl Feedback for ConsoleFeedback {
    fn show(&mut self, text: &str) {
        tracing::debug!(target: "pillbox::display", "{}", text);
    }

    fn alert_on(&mut self) {
        if !self.alerting {
            self.alerting = true;
            tracing::info!("Alert on");
        }
    }

    fn alert_off(&mut self) {
        if self.alerting {
            self.alerting = false;
            tracing::info!("Alert off");
        }
    }
}

/// Presence is reported once per appearance of the flag file.
pub struct FlagFileSensor {
    path: PathBuf,
}

impl FlagFileSensor {
    pub const FLAG_FILE: &'static str = "pickup";

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl PresenceSensor for FlagFileSensor {
    fn is_present(&mut self) -> bool {
        if !self.path.exists() {
            return false;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to consume pickup flag {:?}: {}", self.path, e);
        }
        true
    }
}

/// Line channel over stdin, replies on stdout.
///
/// Stdin is read on a background thread so field reads can time out.
pub struct StdinChannel {
    lines: Receiver<String>,
    closed: bool,
}

impl StdinChannel {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Stopped reading stdin: {}", e);
                        break;
                    }
                }
            }
        });
        Self {
            lines: rx,
            closed: false,
        }
    }

    /// True once stdin has reached end of input.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ProvisioningChannel for StdinChannel {
    fn receive_field(&mut self, timeout: Duration) -> Option<String> {
        if self.closed {
            return None;
        }
        match self.lines.recv_timeout(timeout) {
            Ok(line) => Some(line.trim().to_string()),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("Input closed");
                self.closed = true;
                None
            }
        }
    }

    fn reply(&mut self, line: &str) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", line).and_then(|()| stdout.flush()) {
            tracing::warn!("Failed to write reply: {}", e);
        }
    }
}
