//! Tracing setup shared by the binaries.
//!
//! Everything goes to stderr: stdout carries channel replies and command
//! output, which scripts and the pairing app read line by line.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level used when neither `RUST_LOG` nor a verbosity flag says otherwise.
pub const DEFAULT_LEVEL: &str = "info";

/// Per-poll display text (the running clock) stays hidden below trace.
const QUIET_DISPLAY: &str = "pillbox::display=info";

pub fn init() {
    init_with_level(DEFAULT_LEVEL)
}

/// Map a `-v` count to a default level.
pub fn level_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => DEFAULT_LEVEL,
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize with `default_level`; `RUST_LOG` still wins when set.
pub fn init_with_level(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if default_level == "trace" {
            EnvFilter::new(default_level)
        } else {
            EnvFilter::new(format!("{},{}", default_level, QUIET_DISPLAY))
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
