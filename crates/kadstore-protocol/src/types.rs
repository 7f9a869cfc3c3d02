//! Core protocol types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProtocolError, Result};

/// Size of a KUID in bytes (20 bytes / 160 bits)
pub const KUID_RAW_SIZE: usize = 20;

/// Kademlia Unique ID: identifies nodes and serves as primary/secondary key of values
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Kuid([u8; KUID_RAW_SIZE]);

impl Kuid {
    /// Create a KUID from a byte array
    pub fn from_bytes(bytes: [u8; KUID_RAW_SIZE]) -> Self {
        Kuid(bytes)
    }

    /// Create a KUID from a slice, which must be exactly `KUID_RAW_SIZE` long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KUID_RAW_SIZE {
            return Err(ProtocolError::InvalidKuid(format!(
                "expected {} bytes, got {}",
                KUID_RAW_SIZE,
                bytes.len()
            )));
        }

        let mut arr = [0u8; KUID_RAW_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Kuid(arr))
    }

    /// Get the bytes of this KUID
    pub fn as_bytes(&self) -> &[u8; KUID_RAW_SIZE] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| ProtocolError::InvalidKuid(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Kuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kuid({})", self.to_hex())
    }
}

impl fmt::Display for Kuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Render a big-endian four-character code, replacing non-printables with '.'
fn fourcc_to_string(code: u32) -> String {
    code.to_be_bytes()
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

/// Build a big-endian four-character code
const fn fourcc(tag: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*tag)
}

/// Application-defined type of a DHT value (4-byte tag)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueType(u32);

impl ValueType {
    /// Opaque binary data
    pub const BINARY: ValueType = ValueType(0);

    /// gtk-gnutella native values
    pub const GTKG: ValueType = ValueType(fourcc(b"GTKG"));

    /// LimeWire values
    pub const LIME: ValueType = ValueType(fourcc(b"LIME"));

    /// Test values
    pub const TEST: ValueType = ValueType(fourcc(b"TEST"));

    /// Wildcard used in lookups, never stored
    pub const ANY: ValueType = ValueType(fourcc(b"****"));

    /// Create value type from its raw code
    pub fn from_u32(code: u32) -> Self {
        ValueType(code)
    }

    /// Create value type from a four-character tag
    pub fn from_fourcc(tag: &[u8; 4]) -> Self {
        ValueType(fourcc(tag))
    }

    /// Convert to raw code
    pub fn to_u32(self) -> u32 {
        self.0
    }

    /// Whether this is the lookup wildcard
    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueType({})", self)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::BINARY {
            f.write_str("BIN.")
        } else {
            f.write_str(&fourcc_to_string(self.0))
        }
    }
}

/// Vendor code of a servent (4-byte tag)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VendorCode(u32);

impl VendorCode {
    /// Create vendor code from its raw code
    pub fn from_u32(code: u32) -> Self {
        VendorCode(code)
    }

    /// Create vendor code from a four-character tag
    pub fn from_fourcc(tag: &[u8; 4]) -> Self {
        VendorCode(fourcc(tag))
    }

    /// Convert to raw code
    pub fn to_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for VendorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VendorCode({})", self)
    }
}

impl fmt::Display for VendorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fourcc_to_string(self.0))
    }
}
