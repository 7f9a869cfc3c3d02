//! Kadstore Protocol Module
//!
//! Types shared between the Kademlia protocol layer and the local value
//! store: KUIDs, node descriptors, value types and STORE status codes.

pub mod error;
pub mod knode;
pub mod status;
pub mod types;

pub use error::{ProtocolError, Result};
pub use knode::KNode;
pub use status::StoreStatus;
pub use types::{Kuid, ValueType, VendorCode, KUID_RAW_SIZE};
