use hid_proto::{KeyboardOutput, MouseOutput};
use thiserror::Error;

/// Failures of the non-volatile storage backends. Never fatal to the firmware.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("out of bounds access: offset {offset} len {len} size {size}")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("no non-volatile storage in this build")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("default keyboard output {0:?} is not compiled in")]
    KeyboardUnavailable(KeyboardOutput),

    #[error("default mouse output {0:?} is not compiled in")]
    MouseUnavailable(MouseOutput),

    #[error("ps/2 half period must be between 1 and {max} us, got {value}")]
    HalfPeriod { value: u64, max: u64 },

    #[error("serial receive timeout must be non-zero")]
    ZeroTimeout,

    #[error("invalid configuration: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}
