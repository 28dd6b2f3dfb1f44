//! Error types for the pillbox_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pillbox_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The durable schedule store cannot be used at all
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A schedule record or slot failed validation
    #[error("Record error: {0}")]
    Record(String),

    /// A provisioning session could not produce a valid schedule
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
