//! Local values management
//!
//! Values stored under keys we manage. A key can hold several values,
//! distinguished by a secondary key: the KUID of their creator. A given node
//! can therefore publish only one value per key.
//!
//! To prevent abuse, the amount of values held (whatever the key) is tracked
//! per creator IP address and per class C network, each with its own cap.
//! Each key also refuses new values once it is full or loaded.
//!
//! Values are offloaded to two tables sharing the same 64-bit local key:
//! `dht_values` for the metadata (`ValueData`) and `dht_raw` for the payload.

use kadstore_protocol::{KNode, StoreStatus, ValueType};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::acct::{NetAccounting, NET_CLASS_C_MASK, NET_IPV4_MASK};
use crate::config::{StoreConfig, ValueLimits};
use crate::error::Result;
use crate::keys::{KeyDirectory, KeyTable};
use crate::storage::{DbKey, RecordTable, StorageEnv, Table};
use crate::value::DhtValue;
use crate::valuedata::ValueData;
use crate::VALUE_MAX_LEN;

/// Name of the metadata table
pub const DB_VALUES: &str = "dht_values";

/// Name of the payload table
pub const DB_RAW: &str = "dht_raw";

/// Source of the current time, in Unix seconds
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Current Unix time in seconds
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Disagreement between the node sending a STORE and the claimed creator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatorMismatch {
    VendorCode,
    Version,
    /// Creator does not use an IPv4 address
    NotIpv4,
    Address,
    Port,
}

impl CreatorMismatch {
    /// What differs
    pub fn what(self) -> &'static str {
        match self {
            CreatorMismatch::VendorCode => "vendor code",
            CreatorMismatch::Version => "version number",
            CreatorMismatch::NotIpv4 => "creator must use an IPv4 address",
            CreatorMismatch::Address => "IP address",
            CreatorMismatch::Port => "port number",
        }
    }

    /// Whether the creator is plainly wrong rather than inconsistent
    pub fn is_wrong(self) -> bool {
        self == CreatorMismatch::NotIpv4
    }
}

/// Validate that sender and creator agree on everything, not just the KUID
pub fn validate_creator(
    sender: &KNode,
    creator: &KNode,
) -> std::result::Result<(), CreatorMismatch> {
    let outcome = if sender.vcode != creator.vcode {
        Err(CreatorMismatch::VendorCode)
    } else if sender.major != creator.major || sender.minor != creator.minor {
        Err(CreatorMismatch::Version)
    } else if !creator.is_ipv4() {
        Err(CreatorMismatch::NotIpv4)
    } else if sender.addr != creator.addr {
        Err(CreatorMismatch::Address)
    } else if sender.port != creator.port {
        Err(CreatorMismatch::Port)
    } else {
        Ok(())
    };

    if let Err(mismatch) = outcome {
        if mismatch.is_wrong() {
            debug!(sender = %sender, creator = %creator, "DHT STORE {}", mismatch.what());
        } else {
            debug!(
                sender = %sender,
                creator = %creator,
                "DHT STORE {} mismatch between sender and creator",
                mismatch.what()
            );
        }
    }

    outcome
}

/// Store of the values published under keys we manage
///
/// Every request runs to completion before the next one: the store is
/// meant to be driven by a single task, behind a lock if shared.
pub struct ValuesStore<K = KeyTable> {
    env: StorageEnv,
    values: RecordTable<ValueData>,
    raw: Box<dyn Table>,
    keys: K,
    values_per_ip: NetAccounting,
    values_per_class_c: NetAccounting,
    limits: ValueLimits,
    /// Next local key to assign, `None` once the key space is exhausted
    next_key: Option<DbKey>,
    /// Amount of values currently managed
    managed: usize,
    clock: Clock,
}

impl ValuesStore<KeyTable> {
    /// Open a store as described by the configuration
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let env = config.open_storage()?;
        Self::open(
            env,
            KeyTable::with_limit(config.keys.max_values_per_key),
            config.limits,
        )
    }
}

impl<K: KeyDirectory> ValuesStore<K> {
    /// Create the value tables in `env` and start managing values
    pub fn open(env: StorageEnv, keys: K, limits: ValueLimits) -> Result<Self> {
        let values = RecordTable::new(env.create_table(DB_VALUES)?);
        let raw = env.create_table(DB_RAW)?;

        info!(
            storage = ?env,
            max_values = limits.max_values,
            max_values_ip = limits.max_values_ip,
            max_values_net = limits.max_values_net,
            "DHT values storage initialized"
        );

        Ok(ValuesStore {
            env,
            values,
            raw,
            keys,
            values_per_ip: NetAccounting::new(),
            values_per_class_c: NetAccounting::new(),
            limits,
            next_key: Some(DbKey::FIRST),
            managed: 0,
            clock: Arc::new(unix_now),
        })
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Stop managing values, deleting both tables
    pub fn close(self) -> Result<()> {
        let ValuesStore {
            env,
            values,
            raw,
            managed,
            ..
        } = self;

        env.delete_table(values.into_inner())?;
        env.delete_table(raw)?;

        info!(values = managed, "DHT values storage closed");
        Ok(())
    }

    /// Amount of values managed
    pub fn count(&self) -> usize {
        self.managed
    }

    /// Key directory
    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Key directory, for maintenance of key status
    pub fn keys_mut(&mut self) -> &mut K {
        &mut self.keys
    }

    /// Amount of values attributed to the IP address `addr`
    pub fn values_for_ip(&self, addr: IpAddr) -> usize {
        self.values_per_ip.count(addr, NET_IPV4_MASK)
    }

    /// Amount of values attributed to the class C network of `addr`
    pub fn values_for_class_c(&self, addr: IpAddr) -> usize {
        self.values_per_class_c.count(addr, NET_CLASS_C_MASK)
    }

    /// Metadata of the value stored under `dbkey`
    pub fn record(&self, dbkey: DbKey) -> Result<Option<ValueData>> {
        self.values.read(dbkey)
    }

    /// Payload tables and counters must agree at all times
    fn check_counts(&self, when: &str) {
        let raw = self.raw.count();
        if raw != self.managed {
            error!(
                table = DB_RAW,
                records = raw,
                managed = self.managed,
                "DHT values bookkeeping is corrupted"
            );
            panic!(
                "{}: {} holds {} records but {} values are managed",
                when, DB_RAW, raw, self.managed
            );
        }
    }

    /// Store DHT value sent by remote node `sender`
    ///
    /// `token` tells whether the request carried a valid security token.
    /// Returns the status to relay back to the remote node. Errors are
    /// reserved to storage failures.
    ///
    /// # Panics
    ///
    /// When the key directory and the tables no longer agree.
    pub fn store(&mut self, sender: &KNode, value: &DhtValue, token: bool) -> Result<StoreStatus> {
        self.check_counts("before store");

        let kind = if value.creator().id == sender.id {
            "original"
        } else {
            "copy"
        };

        debug!(
            key = %value.id(),
            value_type = %value.value_type(),
            major = value.major(),
            minor = value.minor(),
            length = value.length(),
            creator = %value.creator(),
            kind,
            "DHT STORE"
        );

        if value.has_data() {
            trace!(payload = %hex::encode(value.data()), "DHT STORE value payload");
        }

        // Invalid tokens come this far only to get consistent traces
        let status = if !token {
            StoreStatus::BadToken
        } else if value.length() as usize >= VALUE_MAX_LEN {
            StoreStatus::TooLarge
        } else if value.value_type().is_any() {
            StoreStatus::BadType
        } else if !value.creator().is_usable() {
            StoreStatus::BadCreator
        } else {
            let result = self.publish(sender, value);
            self.check_counts("after publish");

            match result {
                Ok(status) => status,
                Err(e) => {
                    warn!(key = %value.id(), error = %e, "DHT STORE failed");
                    return Err(e);
                }
            }
        };

        debug!(
            key = %value.id(),
            status = status.code(),
            "DHT STORE status is {}",
            status.description()
        );

        Ok(status)
    }

    /// Check whether a new value for the key with that creator can be accepted
    fn validate_new_acceptable(&self, value: &DhtValue) -> StoreStatus {
        if self.managed >= self.limits.max_values {
            return StoreStatus::Exhausted;
        }

        let addr = value.creator().addr;

        let count = self.values_per_class_c.count(addr, NET_CLASS_C_MASK);
        trace!(
            creator = %addr,
            count,
            max = self.limits.max_values_net,
            "DHT STORE values for class C network"
        );
        if count >= self.limits.max_values_net {
            return StoreStatus::Quota;
        }

        let count = self.values_per_ip.count(addr, NET_IPV4_MASK);
        trace!(
            creator = %addr,
            count,
            max = self.limits.max_values_ip,
            "DHT STORE values for IP"
        );
        if count >= self.limits.max_values_ip {
            return StoreStatus::Quota;
        }

        let status = self.keys.status(value.id());
        match (status.full, status.loaded) {
            (true, true) => StoreStatus::FullLoaded,
            (true, false) => StoreStatus::Full,
            (false, true) => StoreStatus::Loaded,
            (false, false) => StoreStatus::Ok,
        }
    }

    /// Publish or replicate value in our local data store
    fn publish(&mut self, sender: &KNode, value: &DhtValue) -> Result<StoreStatus> {
        match self.keys.has(value.id(), &value.creator().id) {
            None => self.publish_new(sender, value),
            Some(dbkey) => self.publish_existing(dbkey, sender, value),
        }
    }

    fn allocate_key(&mut self) -> Option<DbKey> {
        let dbkey = self.next_key?;
        self.next_key = dbkey.next();
        Some(dbkey)
    }

    /// First value from this creator under this key
    fn publish_new(&mut self, sender: &KNode, value: &DhtValue) -> Result<StoreStatus> {
        let acceptable = self.validate_new_acceptable(value);
        if !acceptable.is_ok() {
            return Ok(acceptable);
        }

        let Some(dbkey) = self.allocate_key() else {
            warn!("DHT local key space exhausted");
            return Ok(StoreStatus::Exhausted);
        };

        let creator = value.creator();
        let original = if sender.id == creator.id {
            if validate_creator(sender, creator).is_err() {
                return Ok(StoreStatus::BadCreator);
            }
            true
        } else {
            if !creator.is_ipv4() {
                debug!(creator = %creator, "DHT STORE creator must use an IPv4 address");
                return Ok(StoreStatus::BadCreator);
            }
            false
        };

        let vd = ValueData {
            id: *value.id(),
            publish: (self.clock)(),
            replicated: 0,
            // TODO: compute a TTL once an expiration policy for stored values is settled
            expire: 0,
            cid: creator.id,
            vcode: creator.vcode,
            addr: creator.addr,
            port: creator.port,
            major: creator.major,
            minor: creator.minor,
            value_type: value.value_type(),
            value_major: value.major(),
            value_minor: value.minor(),
            length: value.length(),
            original,
        };

        self.raw.write(dbkey, value.data())?;
        if let Err(e) = self.values.write(dbkey, &vd) {
            if let Err(rollback) = self.raw.remove(dbkey) {
                error!(dbkey = %dbkey, error = %rollback, "cannot roll back DHT payload");
            }
            return Err(e);
        }

        self.keys.add_value(value.id(), &creator.id, dbkey);

        self.managed += 1;
        self.values_per_class_c
            .update(creator.addr, NET_CLASS_C_MASK, 1);
        self.values_per_ip.update(creator.addr, NET_IPV4_MASK, 1);

        debug!(dbkey = %dbkey, value = %vd, "DHT STORE new value");
        Ok(StoreStatus::Ok)
    }

    /// Replication or republishing of a value we already hold
    fn publish_existing(
        &mut self,
        dbkey: DbKey,
        sender: &KNode,
        value: &DhtValue,
    ) -> Result<StoreStatus> {
        let creator = value.creator();

        let Some(mut vd) = self.values.read(dbkey)? else {
            error!(dbkey = %dbkey, key = %value.id(), "DHT value listed in keys but not stored");
            panic!("value under local key {} exists but was not found in {}", dbkey, DB_VALUES);
        };

        // If one of these fails, our data management is severely wrong
        assert_eq!(vd.id, *value.id(), "primary key mismatch at local key {}", dbkey);
        assert_eq!(vd.cid, creator.id, "secondary key mismatch at local key {}", dbkey);

        let now = (self.clock)();

        if sender.id != creator.id {
            // Replication from a k-neighbour, or caching by a node which got
            // the value elsewhere: must be consistent with what we have
            if value.value_type() != vd.value_type {
                return Ok(mismatch("DHT value type", sender, value, &vd));
            }
            if value.major() != vd.value_major || value.minor() != vd.value_minor {
                return Ok(mismatch("value format version", sender, value, &vd));
            }
            if value.length() != vd.length {
                return Ok(mismatch("value length", sender, value, &vd));
            }

            let Some(stored) = self.raw.read(dbkey)? else {
                error!(dbkey = %dbkey, "DHT value payload missing");
                panic!("payload under local key {} missing from {}", dbkey, DB_RAW);
            };
            assert_eq!(
                stored.len(),
                vd.length as usize,
                "payload length disagrees with metadata at local key {}",
                dbkey
            );

            if stored != value.data() {
                trace!(payload = %hex::encode(&stored), "DHT STORE old value payload");
                return Ok(mismatch("value data", sender, value, &vd));
            }

            // Identical to what we hold, payload need not be rewritten
            vd.replicated = now;
        } else {
            if validate_creator(sender, creator).is_err() {
                return Ok(StoreStatus::BadCreator);
            }

            // Cannot change vendor codes without at least changing the KUID
            if vd.vcode != creator.vcode {
                return Ok(mismatch("creator's vendor code", sender, value, &vd));
            }

            let Some(previous) = self.raw.read(dbkey)? else {
                error!(dbkey = %dbkey, "DHT value payload missing");
                panic!("payload under local key {} missing from {}", dbkey, DB_RAW);
            };
            let old_addr = vd.addr;

            vd.publish = now;
            vd.replicated = 0;
            vd.expire = 0;
            vd.original = true;
            vd.addr = creator.addr;
            vd.port = creator.port;
            vd.major = creator.major;
            vd.minor = creator.minor;
            vd.value_type = value.value_type();
            vd.value_major = value.major();
            vd.value_minor = value.minor();
            vd.length = value.length();

            // Payload and metadata change together or not at all
            self.raw.write(dbkey, value.data())?;
            if let Err(e) = self.values.write(dbkey, &vd) {
                if let Err(rollback) = self.raw.write(dbkey, &previous) {
                    error!(dbkey = %dbkey, error = %rollback, "cannot restore DHT payload");
                }
                return Err(e);
            }

            if old_addr != creator.addr {
                self.move_accounting(old_addr, creator.addr);
            }

            debug!(dbkey = %dbkey, value = %vd, "DHT STORE republished value");
            return Ok(StoreStatus::Ok);
        }

        self.values.write(dbkey, &vd)?;

        debug!(dbkey = %dbkey, value = %vd, "DHT STORE updated value");
        Ok(StoreStatus::Ok)
    }

    /// Creator moved: its value now counts against its new address
    fn move_accounting(&mut self, from: IpAddr, to: IpAddr) {
        self.values_per_class_c.update(from, NET_CLASS_C_MASK, -1);
        self.values_per_ip.update(from, NET_IPV4_MASK, -1);
        self.values_per_class_c.update(to, NET_CLASS_C_MASK, 1);
        self.values_per_ip.update(to, NET_IPV4_MASK, 1);
    }

    /// Get DHT value stored under `dbkey` if of proper type
    ///
    /// `value_type` is either `ValueType::ANY` or the type wanted. Returns
    /// `None` when the type does not match or the record cannot be found.
    ///
    /// # Panics
    ///
    /// When the payload does not match the recorded length.
    pub fn get(&self, dbkey: DbKey, value_type: ValueType) -> Result<Option<DhtValue>> {
        let Some(vd) = self.values.read(dbkey)? else {
            warn!(dbkey = %dbkey, "DHT value not found in {}", DB_VALUES);
            return Ok(None);
        };

        if !value_type.is_any() && value_type != vd.value_type {
            return Ok(None);
        }

        let data = if vd.length > 0 {
            let Some(data) = self.raw.read(dbkey)? else {
                error!(dbkey = %dbkey, "DHT value payload missing");
                panic!("payload under local key {} missing from {}", dbkey, DB_RAW);
            };
            assert_eq!(
                data.len(),
                vd.length as usize,
                "payload length disagrees with metadata at local key {}",
                dbkey
            );
            data
        } else {
            Vec::new()
        };

        let creator = Arc::new(vd.creator());
        let value = DhtValue::new(
            &creator,
            vd.id,
            vd.value_type,
            vd.value_major,
            vd.value_minor,
            data,
        )?;

        Ok(Some(value))
    }
}

/// Log a replication inconsistency
fn mismatch(what: &str, sender: &KNode, value: &DhtValue, vd: &ValueData) -> StoreStatus {
    debug!(
        sender = %sender,
        got = %value,
        had = %vd,
        "DHT STORE spotted {} mismatch",
        what
    );
    StoreStatus::DataMismatch
}
