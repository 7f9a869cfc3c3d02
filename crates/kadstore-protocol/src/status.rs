//! STORE request status codes
//!
//! Every STORE request processed locally ends with one of these outcomes,
//! which the protocol layer relays back to the requesting node as a 16-bit
//! status code.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProtocolError;

/// Wire code for a generic failure that is not a store outcome (local I/O error)
pub const STORE_SC_ERROR: u16 = 2;

/// Wire code reserved for unacceptable values, never produced locally
pub const STORE_SC_BAD_VALUE: u16 = 9;

/// Outcome of a STORE request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum StoreStatus {
    /// Value stored
    Ok = 1,
    /// Key already holds the maximum amount of values
    Full = 3,
    /// Key is already loaded
    Loaded = 4,
    /// Key is both full and loaded
    FullLoaded = 5,
    /// Value is too large
    TooLarge = 6,
    /// Node-wide value storage is exhausted
    Exhausted = 7,
    /// Creator is not acceptable
    BadCreator = 8,
    /// Improper value type
    BadType = 10,
    /// Per-address or per-network quota reached
    Quota = 11,
    /// Replicated data differs from what is held
    DataMismatch = 12,
    /// Missing or invalid security token
    BadToken = 13,
}

impl StoreStatus {
    /// Numeric code sent on the wire
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Whether the value was accepted
    pub fn is_ok(self) -> bool {
        self == StoreStatus::Ok
    }

    /// Human-readable description
    pub fn description(self) -> &'static str {
        match self {
            StoreStatus::Ok => "OK",
            StoreStatus::Full => "Key full",
            StoreStatus::Loaded => "Key loaded",
            StoreStatus::FullLoaded => "Key full and loaded",
            StoreStatus::TooLarge => "Value too large",
            StoreStatus::Exhausted => "Storage space exhausted",
            StoreStatus::BadCreator => "Creator not acceptable",
            StoreStatus::BadType => "Improper value type",
            StoreStatus::Quota => "Storage quota for creator reached",
            StoreStatus::DataMismatch => "Replicated data is different",
            StoreStatus::BadToken => "Invalid security token",
        }
    }
}

impl TryFrom<u16> for StoreStatus {
    type Error = ProtocolError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(StoreStatus::Ok),
            3 => Ok(StoreStatus::Full),
            4 => Ok(StoreStatus::Loaded),
            5 => Ok(StoreStatus::FullLoaded),
            6 => Ok(StoreStatus::TooLarge),
            7 => Ok(StoreStatus::Exhausted),
            8 => Ok(StoreStatus::BadCreator),
            10 => Ok(StoreStatus::BadType),
            11 => Ok(StoreStatus::Quota),
            12 => Ok(StoreStatus::DataMismatch),
            13 => Ok(StoreStatus::BadToken),
            _ => Err(ProtocolError::InvalidStatusCode(code)),
        }
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [StoreStatus; 11] = [
        StoreStatus::Ok,
        StoreStatus::Full,
        StoreStatus::Loaded,
        StoreStatus::FullLoaded,
        StoreStatus::TooLarge,
        StoreStatus::Exhausted,
        StoreStatus::BadCreator,
        StoreStatus::BadType,
        StoreStatus::Quota,
        StoreStatus::DataMismatch,
        StoreStatus::BadToken,
    ];

    #[test]
    fn test_status_codes() {
        assert_eq!(StoreStatus::Ok.code(), 1);
        assert_eq!(StoreStatus::FullLoaded.code(), 5);
        assert_eq!(StoreStatus::BadToken.code(), 13);

        for status in ALL {
            assert_eq!(StoreStatus::try_from(status.code()).unwrap(), status);
        }
    }

    #[test]
    fn test_non_outcome_codes_rejected() {
        assert!(StoreStatus::try_from(STORE_SC_ERROR).is_err());
        assert!(StoreStatus::try_from(STORE_SC_BAD_VALUE).is_err());
        assert!(matches!(
            StoreStatus::try_from(0),
            Err(ProtocolError::InvalidStatusCode(0))
        ));
    }

    #[test]
    fn test_display() {
        assert!(StoreStatus::Ok.is_ok());
        assert!(!StoreStatus::Quota.is_ok());
        assert_eq!(
            StoreStatus::DataMismatch.to_string(),
            "12 (Replicated data is different)"
        );
    }
}
