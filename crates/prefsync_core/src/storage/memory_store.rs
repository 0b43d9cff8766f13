//! Shared in-memory key-value store.
//!
//! Clones share one map, which models several windows of the same profile
//! reading and writing one durable store. Failure switches let hosts and
//! tests exercise the storage-unavailable paths.

use super::{KeyValueStore, StorageError, StorageResult};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

#[derive(Default)]
struct MemoryState {
    entries: RefCell<BTreeMap<String, String>>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
    write_count: Cell<u64>,
}

#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    state: Rc<MemoryState>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with one entry.
    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .state
            .entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        store
    }

    /// Makes subsequent reads fail with `StorageError::Unavailable`.
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.fail_reads.set(fail);
    }

    /// Makes subsequent writes fail with `StorageError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.set(fail);
    }

    /// Number of successful writes since creation.
    pub fn write_count(&self) -> u64 {
        self.state.write_count.get()
    }

    /// Returns the raw value without going through failure switches.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.state.entries.borrow().get(key).cloned()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        if self.state.fail_reads.get() {
            return Err(StorageError::Unavailable("reads disabled".to_string()));
        }
        Ok(self.peek(key))
    }

    fn write(&self, key: &str, value: &str) -> StorageResult<()> {
        if self.state.fail_writes.get() {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        self.state
            .entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        self.state.write_count.set(self.state.write_count.get() + 1);
        Ok(())
    }
}
