//! Error types for recoverable boundary failures.
//!
//! Invariant violations (pool exhaustion, double free, transport overrun,
//! malformed request types reaching the engine) are not represented here:
//! they panic, and the release profile aborts on panic.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A wire record carried a tag outside its enumeration
    #[error("unknown {field} tag {value} in wire record")]
    UnknownTag {
        /// Which field held the bad tag
        field: &'static str,
        value: u8,
    },

    /// Not enough bytes for one fixed-size record
    #[error("wire record needs {needed} bytes, got {got}")]
    ShortBuffer { needed: usize, got: usize },

    /// Configuration is unusable
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A replay input row could not be turned into a request
    #[error("replay row {row}: {message}")]
    Replay { row: usize, message: String },

    #[error("replay source error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
