//! Target store interface
//!
//! The replayer never owns the store it drives. It borrows a [`KvStore`] and
//! the [`ColumnFamilyHandle`]s the trace refers to for the whole replay.
//! [`MemoryStore`] is a self-contained implementation used by the CLI, the
//! benches and the tests.

pub mod memory;
pub mod write_batch;

pub use memory::{MemoryStore, StoreStats};
pub use write_batch::{BatchOp, WriteBatch};

use crate::error::Result;
use bytes::Bytes;

/// Id of the column family every store has
pub const DEFAULT_COLUMN_FAMILY_ID: u32 = 0;

/// Name of the column family every store has
pub const DEFAULT_COLUMN_FAMILY_NAME: &str = "default";

/// Names one column family of a store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnFamilyHandle {
    id: u32,
    name: String,
}

impl ColumnFamilyHandle {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Per-read settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    /// Inclusive lower bound for iterators
    pub iterate_lower_bound: Option<Bytes>,
    /// Exclusive upper bound for iterators
    pub iterate_upper_bound: Option<Bytes>,
    pub fill_cache: bool,
    pub verify_checksums: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            iterate_lower_bound: None,
            iterate_upper_bound: None,
            fill_cache: true,
            verify_checksums: true,
        }
    }
}

/// Per-write settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub sync: bool,
    pub disable_wal: bool,
}

/// Cursor over one column family
///
/// A fresh iterator is unpositioned. After a seek, [`valid`](Self::valid)
/// reports whether it landed on an entry and [`status`](Self::status) reports
/// any error hit along the way.
pub trait StoreIterator {
    /// Position at the first key >= `target`
    fn seek(&mut self, target: &[u8]);

    /// Position at the last key <= `target`
    fn seek_for_prev(&mut self, target: &[u8]);

    fn valid(&self) -> bool;

    fn key(&self) -> Option<&[u8]>;

    fn value(&self) -> Option<&[u8]>;

    fn next(&mut self);

    fn prev(&mut self);

    fn status(&self) -> Result<()>;
}

/// Operations the replay engine issues against a store
pub trait KvStore: Send + Sync {
    /// Apply every mutation in `batch` atomically
    fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> Result<()>;

    /// Point lookup; an absent key is [`ReplayError::NotFound`](crate::ReplayError::NotFound)
    fn get(&self, options: &ReadOptions, cf: &ColumnFamilyHandle, key: &[u8]) -> Result<Bytes>;

    /// Batched lookup returning one status per key, in key order
    fn multi_get(
        &self,
        options: &ReadOptions,
        cfs: &[&ColumnFamilyHandle],
        keys: &[Bytes],
    ) -> Vec<Result<Bytes>>;

    fn new_iterator<'s>(
        &'s self,
        options: &ReadOptions,
        cf: &ColumnFamilyHandle,
    ) -> Result<Box<dyn StoreIterator + 's>>;
}
