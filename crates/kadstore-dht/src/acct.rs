//! Per-address and per-network accounting of stored values
//!
//! Counts are kept per masked IPv4 address: the exact address with
//! `NET_IPV4_MASK`, its class C network with `NET_CLASS_C_MASK`.
//! Other address families are not accounted.

use std::collections::HashMap;
use std::net::IpAddr;

/// Mask selecting a single IPv4 address
pub const NET_IPV4_MASK: u32 = 0xffff_ffff;

/// Mask selecting the class C (/24) network of an IPv4 address
pub const NET_CLASS_C_MASK: u32 = 0xffff_ff00;

/// Live counts per masked address
#[derive(Debug, Default, Clone)]
pub struct NetAccounting {
    counts: HashMap<u32, usize>,
}

impl NetAccounting {
    /// Create empty accounting
    pub fn new() -> Self {
        NetAccounting {
            counts: HashMap::new(),
        }
    }

    fn slot(addr: IpAddr, mask: u32) -> Option<u32> {
        match addr {
            IpAddr::V4(v4) => Some(u32::from(v4) & mask),
            IpAddr::V6(_) => None,
        }
    }

    /// Count attributed to the network of `addr` under `mask`
    pub fn count(&self, addr: IpAddr, mask: u32) -> usize {
        Self::slot(addr, mask)
            .and_then(|net| self.counts.get(&net).copied())
            .unwrap_or(0)
    }

    /// Adjust the count of the network of `addr` under `mask`
    ///
    /// # Panics
    ///
    /// When the count would drop below zero: increments and decrements no
    /// longer pair up, our bookkeeping is broken.
    pub fn update(&mut self, addr: IpAddr, mask: u32, delta: i32) {
        let Some(net) = Self::slot(addr, mask) else {
            return;
        };

        let current = self.counts.get(&net).copied().unwrap_or(0);
        let updated = if delta >= 0 {
            current + delta as usize
        } else {
            current
                .checked_sub(delta.unsigned_abs() as usize)
                .unwrap_or_else(|| {
                    panic!(
                        "net accounting underflow for {:#010x}: {} {}",
                        net, current, delta
                    )
                })
        };

        if updated == 0 {
            self.counts.remove(&net);
        } else {
            self.counts.insert(net, updated);
        }
    }

    /// Number of networks with a non-zero count
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
