//! Key/value ledger abstraction.
//!
//! The store treats the host ledger as its only persistence substrate.
//! Each individual `get`/`put` is durable once acknowledged; nothing is
//! assumed about atomicity across calls unless the ledger overrides
//! [`Ledger::put_batch`].

mod file;
mod memory;

pub use file::{FileLedger, FileLedgerConfig};
pub use memory::MemoryLedger;

use crate::error::Result;
use std::sync::Arc;

/// A single key/value write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerWrite {
    pub key: String,
    pub value: Vec<u8>,
}

impl LedgerWrite {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Key/value interface required from the host ledger.
pub trait Ledger: Send + Sync {
    /// Fetch the bytes stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Write several keys.
    ///
    /// The default applies the writes one by one and stops at the first
    /// failure, so earlier writes stay applied. Ledgers that can commit a
    /// batch all-or-nothing should override this and return `true` from
    /// [`Ledger::atomic_batches`].
    fn put_batch(&self, writes: &[LedgerWrite]) -> Result<()> {
        for write in writes {
            self.put(&write.key, &write.value)?;
        }
        Ok(())
    }

    /// Whether `put_batch` is all-or-nothing.
    fn atomic_batches(&self) -> bool {
        false
    }
}

impl<L: Ledger + ?Sized> Ledger for Arc<L> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn put_batch(&self, writes: &[LedgerWrite]) -> Result<()> {
        (**self).put_batch(writes)
    }

    fn atomic_batches(&self) -> bool {
        (**self).atomic_batches()
    }
}

impl<L: Ledger + ?Sized> Ledger for &L {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn put_batch(&self, writes: &[LedgerWrite]) -> Result<()> {
        (**self).put_batch(writes)
    }

    fn atomic_batches(&self) -> bool {
        (**self).atomic_batches()
    }
}
