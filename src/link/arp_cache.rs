//! ARP translation table
//!
//! A bounded, insertion-ordered table keyed by protocol address. Lookups share
//! a read lock; insert and update take the write lock. There is no eviction:
//! a full table rejects new entries.

use std::sync::{PoisonError, RwLock};
use std::time::Instant;

use crate::error::{Error, Result};

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    pub protocol_address: [u8; 4],
    pub hardware_address: [u8; 6],
    pub updated: Instant,
}

#[derive(Debug)]
pub struct ArpCache {
    entries: RwLock<Vec<ArpEntry>>,
    capacity: usize,
}

impl ArpCache {
    pub fn new(capacity: usize) -> Self {
        ArpCache {
            entries: RwLock::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn lookup(&self, protocol_address: &[u8; 4]) -> Option<ArpEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .find(|entry| &entry.protocol_address == protocol_address)
            .copied()
    }

    /// Refresh the mapping of a known address; false if it is unknown
    pub fn update(&self, protocol_address: [u8; 4], hardware_address: [u8; 6]) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries
            .iter_mut()
            .find(|entry| entry.protocol_address == protocol_address)
        {
            Some(entry) => {
                entry.hardware_address = hardware_address;
                entry.updated = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Add a new mapping
    ///
    /// Returns `Ok(false)` if the address is already present and
    /// `Err(Error::Capacity)` once the table is full.
    pub fn insert(&self, protocol_address: [u8; 4], hardware_address: [u8; 6]) -> Result<bool> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries
            .iter()
            .any(|entry| entry.protocol_address == protocol_address)
        {
            return Ok(false);
        }
        if entries.len() >= self.capacity {
            return Err(Error::Capacity);
        }
        entries.push(ArpEntry {
            protocol_address,
            hardware_address,
            updated: Instant::now(),
        });
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ArpCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn address(i: usize) -> [u8; 4] {
        [10, (i >> 16) as u8, (i >> 8) as u8, i as u8]
    }

    #[test]
    fn test_capacity_limit() {
        let cache = ArpCache::default();
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
        for i in 0..DEFAULT_CAPACITY {
            assert!(cache.insert(address(i), [0, 0, 0, 0, 0, 1]).unwrap());
        }
        assert_eq!(cache.len(), DEFAULT_CAPACITY);
        assert!(matches!(
            cache.insert(address(DEFAULT_CAPACITY), [0; 6]),
            Err(Error::Capacity)
        ));
        assert_eq!(cache.len(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_duplicate_insert() {
        let cache = ArpCache::new(4);
        assert!(cache.insert([10, 0, 0, 2], [1; 6]).unwrap());
        assert!(!cache.insert([10, 0, 0, 2], [2; 6]).unwrap());
        assert_eq!(cache.lookup(&[10, 0, 0, 2]).unwrap().hardware_address, [1; 6]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_duplicate_insert_on_full_table() {
        let cache = ArpCache::new(1);
        assert!(cache.insert([10, 0, 0, 2], [1; 6]).unwrap());
        assert!(!cache.insert([10, 0, 0, 2], [1; 6]).unwrap());
    }

    #[test]
    fn test_update() {
        let cache = ArpCache::new(4);
        assert!(!cache.update([10, 0, 0, 2], [1; 6]));
        assert!(cache.lookup(&[10, 0, 0, 2]).is_none());

        cache.insert([10, 0, 0, 2], [1; 6]).unwrap();
        let before = cache.lookup(&[10, 0, 0, 2]).unwrap();
        thread::sleep(Duration::from_millis(2));
        assert!(cache.update([10, 0, 0, 2], [2; 6]));

        let after = cache.lookup(&[10, 0, 0, 2]).unwrap();
        assert_eq!(after.hardware_address, [2; 6]);
        assert!(after.updated > before.updated);
    }
}
