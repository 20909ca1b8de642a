//! In-memory ledger.

use super::{Ledger, LedgerWrite};
use crate::error::{Result, StoreError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Ledger held entirely in memory.
///
/// Batches are atomic by default. Writes and reads can be made to fail per
/// key, which is how partial-failure behaviour is exercised in tests.
pub struct MemoryLedger {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,

    /// Keys whose writes fail.
    failing_writes: RwLock<HashSet<String>>,

    /// Keys whose reads fail.
    failing_reads: RwLock<HashSet<String>>,

    /// Whether `put_batch` commits all-or-nothing.
    atomic: bool,

    /// Number of acknowledged key writes.
    writes: AtomicU64,
}

impl MemoryLedger {
    /// Create an empty ledger with atomic batches.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            failing_writes: RwLock::new(HashSet::new()),
            failing_reads: RwLock::new(HashSet::new()),
            atomic: true,
            writes: AtomicU64::new(0),
        }
    }

    /// Create an empty ledger whose batches are applied key by key.
    pub fn with_sequential_batches() -> Self {
        Self {
            atomic: false,
            ..Self::new()
        }
    }

    /// Make every subsequent write to `key` fail.
    pub fn fail_writes_to(&self, key: impl Into<String>) {
        self.failing_writes.write().insert(key.into());
    }

    /// Make every subsequent read of `key` fail.
    pub fn fail_reads_of(&self, key: impl Into<String>) {
        self.failing_reads.write().insert(key.into());
    }

    /// Clear all injected failures.
    pub fn heal(&self) {
        self.failing_writes.write().clear();
        self.failing_reads.write().clear();
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of key writes acknowledged so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn check_write(&self, key: &str) -> Result<()> {
        if self.failing_writes.read().contains(key) {
            return Err(StoreError::Ledger(format!("write to {} rejected", key)));
        }
        Ok(())
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if self.failing_reads.read().contains(key) {
            return Err(StoreError::Ledger(format!("read of {} rejected", key)));
        }
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.check_write(key)?;
        self.entries.write().insert(key.to_string(), value.to_vec());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn put_batch(&self, writes: &[LedgerWrite]) -> Result<()> {
        if !self.atomic {
            for write in writes {
                self.put(&write.key, &write.value)?;
            }
            return Ok(());
        }

        for write in writes {
            self.check_write(&write.key)?;
        }

        let mut entries = self.entries.write();
        for write in writes {
            entries.insert(write.key.clone(), write.value.clone());
        }
        self.writes
            .fetch_add(writes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn atomic_batches(&self) -> bool {
        self.atomic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_put() {
        let ledger = MemoryLedger::new();
        assert_eq!(ledger.get("a").unwrap(), None);

        ledger.put("a", b"1").unwrap();
        assert_eq!(ledger.get("a").unwrap(), Some(b"1".to_vec()));

        ledger.put("a", b"2").unwrap();
        assert_eq!(ledger.get("a").unwrap(), Some(b"2".to_vec()));
        assert_eq!(ledger.write_count(), 2);
    }

    #[test]
    fn test_atomic_batch_applies_nothing_on_failure() {
        let ledger = MemoryLedger::new();
        ledger.fail_writes_to("b");

        let result = ledger.put_batch(&[LedgerWrite::new("a", "1"), LedgerWrite::new("b", "2")]);

        assert!(matches!(result, Err(StoreError::Ledger(_))));
        assert!(ledger.is_empty());
        assert_eq!(ledger.write_count(), 0);
    }

    #[test]
    fn test_sequential_batch_keeps_earlier_writes() {
        let ledger = MemoryLedger::with_sequential_batches();
        ledger.fail_writes_to("b");

        let result = ledger.put_batch(&[LedgerWrite::new("a", "1"), LedgerWrite::new("b", "2")]);

        assert!(result.is_err());
        assert!(ledger.contains_key("a"));
        assert!(!ledger.contains_key("b"));
    }

    #[test]
    fn test_heal() {
        let ledger = MemoryLedger::new();
        ledger.fail_reads_of("a");
        assert!(ledger.get("a").is_err());

        ledger.heal();
        assert_eq!(ledger.get("a").unwrap(), None);
    }
}
