//! Kademlia node descriptor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::types::{Kuid, VendorCode};

/// Identity, contact address and version of a Kademlia node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KNode {
    /// Node KUID
    pub id: Kuid,

    /// Contact address
    pub addr: IpAddr,

    /// Contact port
    pub port: u16,

    /// Vendor code of the servent
    pub vcode: VendorCode,

    /// Kademlia protocol major version
    pub major: u8,

    /// Kademlia protocol minor version
    pub minor: u8,
}

impl KNode {
    /// Create a new node descriptor
    pub fn new(
        id: Kuid,
        addr: IpAddr,
        port: u16,
        vcode: VendorCode,
        major: u8,
        minor: u8,
    ) -> Self {
        KNode {
            id,
            addr,
            port,
            vcode,
            major,
            minor,
        }
    }

    /// Whether the node advertises an IPv4 address
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// Whether the node's contact information can be used at all
    ///
    /// Rejects a zero port and addresses nobody can be reached at:
    /// unspecified, loopback, multicast and the IPv4 broadcast address.
    pub fn is_usable(&self) -> bool {
        if self.port == 0 {
            return false;
        }

        if self.addr.is_unspecified() || self.addr.is_loopback() || self.addr.is_multicast() {
            return false;
        }

        match self.addr {
            IpAddr::V4(v4) => !v4.is_broadcast(),
            IpAddr::V6(_) => true,
        }
    }
}

impl fmt::Display for KNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addr = match self.addr {
            IpAddr::V4(v4) => format!("{}:{}", v4, self.port),
            IpAddr::V6(v6) => format!("[{}]:{}", v6, self.port),
        };
        write!(
            f,
            "{} ({} v{}.{}) @ {}",
            self.id, self.vcode, self.major, self.minor, addr
        )
    }
}
