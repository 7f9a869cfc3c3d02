//! Tables holding DHT values, keyed by a 64-bit local key
//!
//! Two backends are available: plain in-memory maps, and sled trees for
//! values offloaded to disk. A table is always created empty; whatever an
//! unclean shutdown left behind is discarded since nothing indexes it anymore.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroU64;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::Result;

/// Local key of a stored value, joining metadata, payload and key directory
///
/// Zero is never a valid key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DbKey(NonZeroU64);

impl DbKey {
    /// First key handed out by a fresh store
    pub const FIRST: DbKey = DbKey(NonZeroU64::MIN);

    /// Wrap a raw key, `None` for zero
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(DbKey)
    }

    /// Raw key value
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Key following this one, `None` on exhaustion of the key space
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(DbKey)
    }

    /// On-disk representation
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.get().to_be_bytes()
    }
}

impl fmt::Display for DbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw key/bytes table
pub trait Table: Send {
    /// Name of the table
    fn name(&self) -> &str;

    /// Read the record stored under `key`
    fn read(&self, key: DbKey) -> Result<Option<Vec<u8>>>;

    /// Write (or overwrite) the record stored under `key`
    fn write(&mut self, key: DbKey, data: &[u8]) -> Result<()>;

    /// Remove the record under `key`, returning whether it existed
    fn remove(&mut self, key: DbKey) -> Result<bool>;

    /// Number of records held
    fn count(&self) -> usize;

    /// Remove all records
    fn clear(&mut self) -> Result<()>;
}

/// Table kept in memory
#[derive(Debug, Default)]
pub struct MemoryTable {
    name: String,
    records: HashMap<DbKey, Vec<u8>>,
}

impl MemoryTable {
    /// Create an empty table
    pub fn new(name: &str) -> Self {
        MemoryTable {
            name: name.to_string(),
            records: HashMap::new(),
        }
    }
}

impl Table for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, key: DbKey) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(&key).cloned())
    }

    fn write(&mut self, key: DbKey, data: &[u8]) -> Result<()> {
        self.records.insert(key, data.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: DbKey) -> Result<bool> {
        Ok(self.records.remove(&key).is_some())
    }

    fn count(&self) -> usize {
        self.records.len()
    }

    fn clear(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }
}

/// Table stored in a sled tree
///
/// The record count is tracked alongside the tree, sled's own `len()`
/// being a full scan.
pub struct SledTable {
    name: String,
    tree: sled::Tree,
    count: usize,
}

impl SledTable {
    /// Wrap an opened tree
    pub fn new(name: &str, tree: sled::Tree) -> Self {
        let count = tree.len();
        SledTable {
            name: name.to_string(),
            tree,
            count,
        }
    }
}

impl fmt::Debug for SledTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SledTable")
            .field("name", &self.name)
            .field("count", &self.count)
            .finish()
    }
}

impl Table for SledTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, key: DbKey) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key.to_be_bytes())?.map(|v| v.to_vec()))
    }

    fn write(&mut self, key: DbKey, data: &[u8]) -> Result<()> {
        if self.tree.insert(key.to_be_bytes(), data)?.is_none() {
            self.count += 1;
        }
        Ok(())
    }

    fn remove(&mut self, key: DbKey) -> Result<bool> {
        let existed = self.tree.remove(key.to_be_bytes())?.is_some();
        if existed {
            self.count -= 1;
        }
        Ok(existed)
    }

    fn count(&self) -> usize {
        self.count
    }

    fn clear(&mut self) -> Result<()> {
        self.tree.clear()?;
        self.count = 0;
        Ok(())
    }
}

/// Binary encoding of a record type stored in a table
pub trait RecordCodec: Sized {
    /// Serialize the record
    fn encode(&self) -> Vec<u8>;

    /// Deserialize a record, rejecting malformed input
    fn decode(bytes: &[u8]) -> Result<Self>;
}

/// Table of typed records, going through the record codec
pub struct RecordTable<R> {
    table: Box<dyn Table>,
    _record: PhantomData<fn() -> R>,
}

impl<R: RecordCodec> RecordTable<R> {
    /// Wrap a raw table
    pub fn new(table: Box<dyn Table>) -> Self {
        RecordTable {
            table,
            _record: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    /// Read and decode the record under `key`
    pub fn read(&self, key: DbKey) -> Result<Option<R>> {
        match self.table.read(key)? {
            Some(bytes) => Ok(Some(R::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and write the record under `key`
    pub fn write(&mut self, key: DbKey, record: &R) -> Result<()> {
        self.table.write(key, &record.encode())
    }

    pub fn count(&self) -> usize {
        self.table.count()
    }

    /// Give back the raw table
    pub fn into_inner(self) -> Box<dyn Table> {
        self.table
    }
}

/// Where tables live
#[derive(Clone)]
pub enum StorageEnv {
    /// Tables are in-memory maps
    Memory,
    /// Tables are trees of one sled database
    Sled(sled::Db),
}

impl StorageEnv {
    /// In-memory environment
    pub fn memory() -> Self {
        StorageEnv::Memory
    }

    /// Environment backed by the sled database at `path`
    pub fn sled(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "opening DHT value database");
        Ok(StorageEnv::Sled(sled::open(path)?))
    }

    /// Create the table `name`, empty
    pub fn create_table(&self, name: &str) -> Result<Box<dyn Table>> {
        match self {
            StorageEnv::Memory => Ok(Box::new(MemoryTable::new(name))),
            StorageEnv::Sled(db) => {
                let mut table = SledTable::new(name, db.open_tree(name)?);
                if table.count() != 0 {
                    warn!(
                        table = name,
                        stale = table.count(),
                        "discarding stale records left in DHT table"
                    );
                    table.clear()?;
                }
                Ok(Box::new(table))
            }
        }
    }

    /// Delete the table and everything it holds
    pub fn delete_table(&self, table: Box<dyn Table>) -> Result<()> {
        let name = table.name().to_string();
        drop(table);

        if let StorageEnv::Sled(db) = self {
            db.drop_tree(name.as_bytes())?;
            db.flush()?;
        }

        debug!(table = %name, "deleted DHT table");
        Ok(())
    }
}

impl fmt::Debug for StorageEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageEnv::Memory => f.write_str("StorageEnv::Memory"),
            StorageEnv::Sled(_) => f.write_str("StorageEnv::Sled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DhtError;

    fn key(raw: u64) -> DbKey {
        DbKey::new(raw).unwrap()
    }

    /// Test record: a single big-endian u32
    #[derive(Debug, PartialEq)]
    struct Counter(u32);

    impl RecordCodec for Counter {
        fn encode(&self) -> Vec<u8> {
            self.0.to_be_bytes().to_vec()
        }

        fn decode(bytes: &[u8]) -> Result<Self> {
            let arr: [u8; 4] = bytes.try_into().map_err(|_| DhtError::Codec {
                what: "counter",
                reason: format!("{} bytes", bytes.len()),
            })?;
            Ok(Counter(u32::from_be_bytes(arr)))
        }
    }

    fn exercise_table(table: &mut dyn Table) {
        assert_eq!(table.count(), 0);
        assert!(table.read(key(1)).unwrap().is_none());

        table.write(key(1), b"one").unwrap();
        table.write(key(2), b"").unwrap();
        assert_eq!(table.count(), 2);

        // Overwrite does not add a record
        table.write(key(1), b"uno").unwrap();
        assert_eq!(table.count(), 2);
        assert_eq!(table.read(key(1)).unwrap().unwrap(), b"uno");
        assert_eq!(table.read(key(2)).unwrap().unwrap(), b"");

        assert!(table.remove(key(1)).unwrap());
        assert!(!table.remove(key(1)).unwrap());
        assert_eq!(table.count(), 1);

        table.clear().unwrap();
        assert_eq!(table.count(), 0);
    }

    #[test]
    fn test_db_key() {
        assert!(DbKey::new(0).is_none());
        assert_eq!(DbKey::FIRST.get(), 1);
        assert_eq!(DbKey::FIRST.next().unwrap().get(), 2);
        assert!(key(u64::MAX).next().is_none());
        assert_eq!(key(258).to_be_bytes(), [0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_memory_table() {
        let mut table = MemoryTable::new("test");
        assert_eq!(table.name(), "test");
        exercise_table(&mut table);
    }

    #[test]
    fn test_sled_table() {
        let dir = tempfile::tempdir().unwrap();
        let env = StorageEnv::sled(dir.path()).unwrap();
        let mut table = env.create_table("test").unwrap();
        exercise_table(table.as_mut());
    }

    #[test]
    fn test_sled_stale_records_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let env = StorageEnv::sled(dir.path()).unwrap();

        let mut table = env.create_table("dht_raw").unwrap();
        table.write(key(7), b"stale").unwrap();
        drop(table);

        let table = env.create_table("dht_raw").unwrap();
        assert_eq!(table.count(), 0);
        assert!(table.read(key(7)).unwrap().is_none());
    }

    #[test]
    fn test_delete_table() {
        let dir = tempfile::tempdir().unwrap();
        let env = StorageEnv::sled(dir.path()).unwrap();

        let mut table = env.create_table("dht_values").unwrap();
        table.write(key(1), b"x").unwrap();
        env.delete_table(table).unwrap();

        if let StorageEnv::Sled(db) = &env {
            assert!(!db
                .tree_names()
                .iter()
                .any(|name| &*name == b"dht_values"));
        }
    }

    #[test]
    fn test_record_table() {
        let env = StorageEnv::memory();
        let mut records: RecordTable<Counter> =
            RecordTable::new(env.create_table("counters").unwrap());

        records.write(key(3), &Counter(42)).unwrap();
        assert_eq!(records.read(key(3)).unwrap(), Some(Counter(42)));
        assert_eq!(records.read(key(4)).unwrap(), None);
        assert_eq!(records.count(), 1);
        assert_eq!(records.name(), "counters");

        let mut raw = records.into_inner();
        raw.write(key(4), b"bad").unwrap();
        let records: RecordTable<Counter> = RecordTable::new(raw);
        assert!(matches!(
            records.read(key(4)),
            Err(DhtError::Codec { .. })
        ));
    }
}
