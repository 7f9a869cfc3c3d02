//! Metadata kept on disk for each stored value
//!
//! Record layout (all integers big-endian, timestamps in Unix seconds):
//! - Primary key (20 bytes)
//! - Publish time (8 bytes)
//! - Replication time (8 bytes)
//! - Expiration time (8 bytes)
//! - Secondary key, the creator KUID (20 bytes)
//! - Creator vendor code (4 bytes)
//! - Creator address (1-byte family tag, then 4 or 16 bytes)
//! - Creator port (2 bytes)
//! - Creator protocol major, minor (1 byte each)
//! - Value type (4 bytes)
//! - Value format major, minor (1 byte each)
//! - Value length (2 bytes)
//! - Original flag (1 byte, 0 or 1)
//!
//! The payload itself lives in a separate table under the same key: the
//! metadata is read and rewritten far more often than the payload.

use kadstore_protocol::{KNode, Kuid, ValueType, VendorCode, KUID_RAW_SIZE};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{DhtError, Result};
use crate::storage::RecordCodec;

/// Address family tag for IPv4
const ADDR_IPV4: u8 = 4;

/// Address family tag for IPv6
const ADDR_IPV6: u8 = 6;

/// Encoded size of a record holding an IPv4 creator address
pub const VALUEDATA_IPV4_SIZE: usize = 86;

/// Information about a stored value, without its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueData {
    /// Primary key of the value
    pub id: Kuid,

    /// Initial publish time at our node
    pub publish: u64,

    /// Last verified replication time
    pub replicated: u64,

    /// Expiration time, not computed yet (always 0)
    pub expire: u64,

    /// Secondary key: KUID of the creator
    pub cid: Kuid,

    /// Vendor code of the creator
    pub vcode: VendorCode,

    /// Address of the creator
    pub addr: IpAddr,

    /// Port of the creator
    pub port: u16,

    /// Protocol major version of the creator
    pub major: u8,

    /// Protocol minor version of the creator
    pub minor: u8,

    /// Type of value stored
    pub value_type: ValueType,

    /// Format major version of the value
    pub value_major: u8,

    /// Format minor version of the value
    pub value_minor: u8,

    /// Value length
    pub length: u16,

    /// Whether we got the data from the creator itself
    pub original: bool,
}

impl ValueData {
    /// Rebuild a creator descriptor from the snapshot held in the record
    pub fn creator(&self) -> KNode {
        KNode::new(
            self.cid,
            self.addr,
            self.port,
            self.vcode,
            self.major,
            self.minor,
        )
    }
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(pk={}, sk={}) {} v{}.{} {} byte{} ({})",
            self.id,
            self.cid,
            self.value_type,
            self.value_major,
            self.value_minor,
            self.length,
            if self.length == 1 { "" } else { "s" },
            if self.original { "original" } else { "copy" }
        )
    }
}

/// Sequential reader over an encoded record
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset + len;
        if end > self.bytes.len() {
            return Err(codec_error(format!(
                "truncated at offset {} (need {} bytes, have {})",
                self.offset,
                len,
                self.bytes.len() - self.offset
            )));
        }

        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N)?);
        Ok(arr)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn be16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn be32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn be64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn kuid(&mut self) -> Result<Kuid> {
        Ok(Kuid::from_bytes(self.array::<KUID_RAW_SIZE>()?))
    }

    fn addr(&mut self) -> Result<IpAddr> {
        match self.u8()? {
            ADDR_IPV4 => Ok(IpAddr::V4(Ipv4Addr::from(self.array::<4>()?))),
            ADDR_IPV6 => Ok(IpAddr::V6(Ipv6Addr::from(self.array::<16>()?))),
            tag => Err(codec_error(format!("unknown address family tag {}", tag))),
        }
    }

    fn boolean(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(codec_error(format!("invalid boolean byte {}", b))),
        }
    }

    fn unread(&self) -> usize {
        self.bytes.len() - self.offset
    }
}

fn codec_error(reason: String) -> DhtError {
    DhtError::Codec {
        what: "valuedata",
        reason,
    }
}

impl RecordCodec for ValueData {
    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(VALUEDATA_IPV4_SIZE + 12);

        bytes.extend_from_slice(self.id.as_bytes());
        bytes.extend_from_slice(&self.publish.to_be_bytes());
        bytes.extend_from_slice(&self.replicated.to_be_bytes());
        bytes.extend_from_slice(&self.expire.to_be_bytes());

        // Creator information
        bytes.extend_from_slice(self.cid.as_bytes());
        bytes.extend_from_slice(&self.vcode.to_u32().to_be_bytes());
        match self.addr {
            IpAddr::V4(v4) => {
                bytes.push(ADDR_IPV4);
                bytes.extend_from_slice(&v4.octets());
            }
            IpAddr::V6(v6) => {
                bytes.push(ADDR_IPV6);
                bytes.extend_from_slice(&v6.octets());
            }
        }
        bytes.extend_from_slice(&self.port.to_be_bytes());
        bytes.push(self.major);
        bytes.push(self.minor);

        // Value information
        bytes.extend_from_slice(&self.value_type.to_u32().to_be_bytes());
        bytes.push(self.value_major);
        bytes.push(self.value_minor);
        bytes.extend_from_slice(&self.length.to_be_bytes());
        bytes.push(u8::from(self.original));

        bytes
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);

        let vd = ValueData {
            id: r.kuid()?,
            publish: r.be64()?,
            replicated: r.be64()?,
            expire: r.be64()?,
            cid: r.kuid()?,
            vcode: VendorCode::from_u32(r.be32()?),
            addr: r.addr()?,
            port: r.be16()?,
            major: r.u8()?,
            minor: r.u8()?,
            value_type: ValueType::from_u32(r.be32()?),
            value_major: r.u8()?,
            value_minor: r.u8()?,
            length: r.be16()?,
            original: r.boolean()?,
        };

        // Trailing bytes mean we are not decoding the right data
        if r.unread() != 0 {
            return Err(codec_error(format!("{} unread bytes", r.unread())));
        }

        Ok(vd)
    }
}
