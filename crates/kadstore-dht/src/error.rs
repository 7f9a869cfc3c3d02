//! DHT error types

use thiserror::Error;

/// DHT-specific errors
#[derive(Error, Debug)]
pub enum DhtError {
    #[error("Value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: usize, max: usize },

    #[error("Oversized value length {length} must exceed {max}")]
    NotOversized { length: u16, max: usize },

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Codec error in {what}: {reason}")]
    Codec { what: &'static str, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for DHT operations
pub type Result<T> = std::result::Result<T, DhtError>;
