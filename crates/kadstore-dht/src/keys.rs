//! Keys we hold values for
//!
//! A key can hold several values, one per creator. The directory maps each
//! (primary key, creator KUID) pair to the local key under which the value
//! is stored, and reports whether a key is "full" (too many values) or
//! "loaded" (too much load already).

use kadstore_protocol::Kuid;
use std::collections::HashMap;

use crate::storage::DbKey;

/// Maximum number of values accepted under a single key
pub const MAX_VALUES_PER_KEY: usize = 16;

/// Storage status of a primary key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyStatus {
    /// Key holds as many values as we accept
    pub full: bool,

    /// Key is loaded
    pub loaded: bool,
}

/// Directory of the values held under each key
pub trait KeyDirectory {
    /// Local key of the value published under `primary` by `creator`
    fn has(&self, primary: &Kuid, creator: &Kuid) -> Option<DbKey>;

    /// Record that the value of `creator` under `primary` is stored at `dbkey`
    fn add_value(&mut self, primary: &Kuid, creator: &Kuid, dbkey: DbKey);

    /// Whether `primary` is full and/or loaded
    fn status(&self, primary: &Kuid) -> KeyStatus;
}

/// Values held under one primary key
#[derive(Debug, Default)]
struct KeyInfo {
    values: HashMap<Kuid, DbKey>,
    loaded: bool,
}

/// In-memory key directory
#[derive(Debug)]
pub struct KeyTable {
    keys: HashMap<Kuid, KeyInfo>,
    max_values_per_key: usize,
}

impl KeyTable {
    /// Create an empty directory with the default per-key limit
    pub fn new() -> Self {
        Self::with_limit(MAX_VALUES_PER_KEY)
    }

    /// Create an empty directory accepting `max_values_per_key` values per key
    pub fn with_limit(max_values_per_key: usize) -> Self {
        KeyTable {
            keys: HashMap::new(),
            max_values_per_key,
        }
    }

    /// Flag `primary` as loaded or not
    ///
    /// Load is measured by whoever serves lookups for the key; the flag
    /// applies to keys we do not hold values for yet too.
    pub fn set_loaded(&mut self, primary: &Kuid, loaded: bool) {
        if loaded {
            self.keys.entry(*primary).or_default().loaded = true;
        } else if let Some(info) = self.keys.get_mut(primary) {
            info.loaded = false;
            if info.values.is_empty() {
                self.keys.remove(primary);
            }
        }
    }

    /// Number of values held under `primary`
    pub fn value_count(&self, primary: &Kuid) -> usize {
        self.keys.get(primary).map_or(0, |info| info.values.len())
    }

    /// Number of keys we hold values for
    pub fn key_count(&self) -> usize {
        self.keys.values().filter(|info| !info.values.is_empty()).count()
    }
}

impl Default for KeyTable {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyDirectory for KeyTable {
    fn has(&self, primary: &Kuid, creator: &Kuid) -> Option<DbKey> {
        self.keys
            .get(primary)
            .and_then(|info| info.values.get(creator).copied())
    }

    fn add_value(&mut self, primary: &Kuid, creator: &Kuid, dbkey: DbKey) {
        let previous = self
            .keys
            .entry(*primary)
            .or_default()
            .values
            .insert(*creator, dbkey);

        assert!(
            previous.is_none(),
            "value of {} under key {} already stored at {:?}",
            creator,
            primary,
            previous
        );
    }

    fn status(&self, primary: &Kuid) -> KeyStatus {
        match self.keys.get(primary) {
            Some(info) => KeyStatus {
                full: info.values.len() >= self.max_values_per_key,
                loaded: info.loaded,
            },
            None => KeyStatus::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kadstore_protocol::KUID_RAW_SIZE;

    fn kuid(b: u8) -> Kuid {
        Kuid::from_bytes([b; KUID_RAW_SIZE])
    }

    fn key(raw: u64) -> DbKey {
        DbKey::new(raw).unwrap()
    }

    #[test]
    fn test_add_and_lookup() {
        let mut keys = KeyTable::new();
        assert_eq!(keys.has(&kuid(1), &kuid(2)), None);

        keys.add_value(&kuid(1), &kuid(2), key(10));
        keys.add_value(&kuid(1), &kuid(3), key(11));

        assert_eq!(keys.has(&kuid(1), &kuid(2)), Some(key(10)));
        assert_eq!(keys.has(&kuid(1), &kuid(3)), Some(key(11)));
        assert_eq!(keys.has(&kuid(2), &kuid(2)), None);
        assert_eq!(keys.value_count(&kuid(1)), 2);
        assert_eq!(keys.key_count(), 1);
    }

    #[test]
    #[should_panic(expected = "already stored")]
    fn test_duplicate_value_panics() {
        let mut keys = KeyTable::new();
        keys.add_value(&kuid(1), &kuid(2), key(10));
        keys.add_value(&kuid(1), &kuid(2), key(11));
    }

    #[test]
    fn test_full_status() {
        let mut keys = KeyTable::with_limit(2);
        assert_eq!(keys.status(&kuid(1)), KeyStatus::default());

        keys.add_value(&kuid(1), &kuid(2), key(1));
        assert!(!keys.status(&kuid(1)).full);

        keys.add_value(&kuid(1), &kuid(3), key(2));
        assert!(keys.status(&kuid(1)).full);
        assert!(!keys.status(&kuid(1)).loaded);
    }

    #[test]
    fn test_loaded_status() {
        let mut keys = KeyTable::new();

        keys.set_loaded(&kuid(1), true);
        assert_eq!(
            keys.status(&kuid(1)),
            KeyStatus {
                full: false,
                loaded: true
            }
        );
        assert_eq!(keys.key_count(), 0);

        keys.set_loaded(&kuid(1), false);
        assert_eq!(keys.status(&kuid(1)), KeyStatus::default());
    }
}
