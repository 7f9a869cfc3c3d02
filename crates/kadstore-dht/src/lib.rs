//! Kadstore DHT local value storage
//!
//! This crate manages the values a Kademlia node holds on behalf of others:
//! - Validation of STORE requests (token, size, type, creator)
//! - Abuse quotas per creator IP address and class C network
//! - Publishing of new values, republishing and replication of known ones
//! - Retrieval of stored values by local key
//!
//! Value metadata and payloads live in two tables of a storage environment,
//! either in memory or in a sled database.

pub mod acct;
pub mod config;
pub mod error;
pub mod keys;
pub mod storage;
pub mod value;
pub mod valuedata;
pub mod values;

pub use acct::{NetAccounting, NET_CLASS_C_MASK, NET_IPV4_MASK};
pub use config::{init_tracing, StorageBackend, StoreConfig, ValueLimits};
pub use error::{DhtError, Result};
pub use keys::{KeyDirectory, KeyStatus, KeyTable, MAX_VALUES_PER_KEY};
pub use storage::{DbKey, RecordCodec, StorageEnv, Table};
pub use value::DhtValue;
pub use valuedata::ValueData;
pub use values::{validate_creator, Clock, CreatorMismatch, ValuesStore, DB_RAW, DB_VALUES};

/// Maximum value length we accept to store (exclusive)
pub const VALUE_MAX_LEN: usize = 512;

/// Max # of values we accept to manage
pub const MAX_VALUES: usize = 65536;

/// Max # of values allowed per creator IP address
pub const MAX_VALUES_IP: usize = 16;

/// Max # of values allowed per creator class C network
pub const MAX_VALUES_NET: usize = 256;
