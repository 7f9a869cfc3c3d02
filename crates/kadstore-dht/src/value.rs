//! DHT values as exchanged with the protocol layer

use kadstore_protocol::{KNode, Kuid, ValueType};
use std::fmt;
use std::sync::Arc;

use crate::error::{DhtError, Result};
use crate::VALUE_MAX_LEN;

/// One value instance, as carried by a STORE request or rebuilt from storage
///
/// The creator descriptor is shared: the value holds its own reference and
/// drops it with the value.
#[derive(Debug, Clone)]
pub struct DhtValue {
    creator: Arc<KNode>,
    id: Kuid,
    value_type: ValueType,
    major: u8,
    minor: u8,
    data: Option<Vec<u8>>,
    length: u16,
}

impl DhtValue {
    /// Create a value holding its payload
    ///
    /// An empty payload is held as no data with a zero length.
    pub fn new(
        creator: &Arc<KNode>,
        id: Kuid,
        value_type: ValueType,
        major: u8,
        minor: u8,
        data: Vec<u8>,
    ) -> Result<Self> {
        if data.len() > VALUE_MAX_LEN {
            return Err(DhtError::ValueTooLarge {
                size: data.len(),
                max: VALUE_MAX_LEN,
            });
        }

        let length = data.len() as u16;
        let data = if data.is_empty() { None } else { Some(data) };

        Ok(DhtValue {
            creator: Arc::clone(creator),
            id,
            value_type,
            major,
            minor,
            data,
            length,
        })
    }

    /// Create a value whose advertised length exceeds what we buffer
    ///
    /// Such a value carries no data and only exists to be rejected.
    pub fn oversized(
        creator: &Arc<KNode>,
        id: Kuid,
        value_type: ValueType,
        major: u8,
        minor: u8,
        length: u16,
    ) -> Result<Self> {
        if (length as usize) <= VALUE_MAX_LEN {
            return Err(DhtError::NotOversized {
                length,
                max: VALUE_MAX_LEN,
            });
        }

        Ok(DhtValue {
            creator: Arc::clone(creator),
            id,
            value_type,
            major,
            minor,
            data: None,
            length,
        })
    }

    /// Creator of the value
    pub fn creator(&self) -> &KNode {
        &self.creator
    }

    /// Primary key
    pub fn id(&self) -> &Kuid {
        &self.id
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Format major version of the payload
    pub fn major(&self) -> u8 {
        self.major
    }

    /// Format minor version of the payload
    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Advertised payload length
    pub fn length(&self) -> u16 {
        self.length
    }

    /// Payload bytes, empty when the value has no data
    pub fn data(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Whether the payload is buffered
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Destroy the value, handing its payload buffer over to the caller
    pub fn into_data(self) -> Option<Vec<u8>> {
        self.data
    }
}

impl fmt::Display for DhtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "value pk={} as {} v{}.{} ({} byte{}) created by {}",
            self.id,
            self.value_type,
            self.major,
            self.minor,
            self.length,
            if self.length == 1 { "" } else { "s" },
            self.creator
        )
    }
}
