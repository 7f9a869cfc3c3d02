//! Error types for protocol operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid KUID: {0}")]
    InvalidKuid(String),

    #[error("Invalid store status code: {0}")]
    InvalidStatusCode(u16),
}
