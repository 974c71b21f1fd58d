//! In-memory ordered key-value store

use super::{
    BatchOp, ColumnFamilyHandle, KvStore, ReadOptions, StoreIterator, WriteBatch, WriteOptions,
    DEFAULT_COLUMN_FAMILY_ID, DEFAULT_COLUMN_FAMILY_NAME,
};
use crate::error::{ReplayError, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

type ColumnFamilyData = BTreeMap<Bytes, Bytes>;

/// Ordered in-memory store with named column families
///
/// Column family ids are assigned in creation order starting at the default
/// family (id 0).
pub struct MemoryStore {
    handles: Vec<ColumnFamilyHandle>,
    data: RwLock<HashMap<u32, ColumnFamilyData>>,
    stats: Stats,
}

#[derive(Debug, Default)]
struct Stats {
    writes: AtomicU64,
    gets: AtomicU64,
    multi_gets: AtomicU64,
    iterators_created: AtomicU64,
    not_found: AtomicU64,
}

/// Snapshot of store operation counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Batches applied
    pub writes: u64,
    /// Point lookups, including each key of a multi-get
    pub gets: u64,
    /// Multi-get calls
    pub multi_gets: u64,
    pub iterators_created: u64,
    /// Lookups that found no value
    pub not_found: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store with only the default column family
    pub fn new() -> Self {
        Self::with_column_families(&[])
    }

    /// Store with the default column family plus `names`, ids 1.. in order
    pub fn with_column_families(names: &[&str]) -> Self {
        let mut handles = vec![ColumnFamilyHandle::new(
            DEFAULT_COLUMN_FAMILY_ID,
            DEFAULT_COLUMN_FAMILY_NAME,
        )];
        handles.extend(
            names
                .iter()
                .enumerate()
                .map(|(i, name)| ColumnFamilyHandle::new(i as u32 + 1, *name)),
        );
        let data = handles
            .iter()
            .map(|h| (h.id(), ColumnFamilyData::new()))
            .collect();
        Self {
            handles,
            data: RwLock::new(data),
            stats: Stats::default(),
        }
    }

    pub fn handles(&self) -> &[ColumnFamilyHandle] {
        &self.handles
    }

    pub fn handle(&self, name: &str) -> Option<&ColumnFamilyHandle> {
        self.handles.iter().find(|h| h.name() == name)
    }

    pub fn default_handle(&self) -> &ColumnFamilyHandle {
        &self.handles[0]
    }

    /// Insert one key directly, bypassing batch encoding
    pub fn put(
        &self,
        cf: &ColumnFamilyHandle,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<()> {
        let mut data = self.data.write();
        let family = data
            .get_mut(&cf.id())
            .ok_or_else(|| unknown_cf(cf.id(), "put"))?;
        family.insert(key.into(), value.into());
        Ok(())
    }

    /// Number of keys in a column family
    pub fn len(&self, cf: &ColumnFamilyHandle) -> usize {
        self.data.read().get(&cf.id()).map_or(0, |f| f.len())
    }

    pub fn is_empty(&self, cf: &ColumnFamilyHandle) -> bool {
        self.len(cf) == 0
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            writes: self.stats.writes.load(Ordering::Relaxed),
            gets: self.stats.gets.load(Ordering::Relaxed),
            multi_gets: self.stats.multi_gets.load(Ordering::Relaxed),
            iterators_created: self.stats.iterators_created.load(Ordering::Relaxed),
            not_found: self.stats.not_found.load(Ordering::Relaxed),
        }
    }

    fn lookup(&self, data: &HashMap<u32, ColumnFamilyData>, cf_id: u32, key: &[u8]) -> Result<Bytes> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        let family = data.get(&cf_id).ok_or_else(|| unknown_cf(cf_id, "get"))?;
        match family.get(key) {
            Some(value) => Ok(value.clone()),
            None => {
                self.stats.not_found.fetch_add(1, Ordering::Relaxed);
                Err(ReplayError::not_found(key))
            }
        }
    }
}

fn unknown_cf(cf_id: u32, operation: &str) -> ReplayError {
    ReplayError::InvalidArgument(format!(
        "{}: column family {} does not exist",
        operation, cf_id
    ))
}

impl KvStore for MemoryStore {
    fn write(&self, _options: &WriteOptions, batch: &WriteBatch) -> Result<()> {
        let mut data = self.data.write();
        // Check every target first so a bad op leaves the store untouched.
        if let Some(op) = batch.ops().iter().find(|op| !data.contains_key(&op.cf_id())) {
            return Err(unknown_cf(op.cf_id(), "write"));
        }

        for op in batch.ops() {
            let Some(family) = data.get_mut(&op.cf_id()) else {
                continue;
            };
            match op {
                BatchOp::Put { key, value, .. } => {
                    family.insert(key.clone(), value.clone());
                }
                BatchOp::Delete { key, .. } => {
                    family.remove(key);
                }
                BatchOp::DeleteRange { begin, end, .. } => {
                    family.retain(|k, _| k < begin || k >= end);
                }
            }
        }
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn get(&self, _options: &ReadOptions, cf: &ColumnFamilyHandle, key: &[u8]) -> Result<Bytes> {
        let data = self.data.read();
        self.lookup(&data, cf.id(), key)
    }

    fn multi_get(
        &self,
        _options: &ReadOptions,
        cfs: &[&ColumnFamilyHandle],
        keys: &[Bytes],
    ) -> Vec<Result<Bytes>> {
        self.stats.multi_gets.fetch_add(1, Ordering::Relaxed);
        if cfs.len() != keys.len() {
            return vec![Err(ReplayError::InvalidArgument(format!(
                "multi_get: {} column families for {} keys",
                cfs.len(),
                keys.len()
            )))];
        }
        let data = self.data.read();
        cfs.iter()
            .zip(keys)
            .map(|(cf, key)| self.lookup(&data, cf.id(), key))
            .collect()
    }

    fn new_iterator<'s>(
        &'s self,
        options: &ReadOptions,
        cf: &ColumnFamilyHandle,
    ) -> Result<Box<dyn StoreIterator + 's>> {
        if !self.data.read().contains_key(&cf.id()) {
            return Err(unknown_cf(cf.id(), "new_iterator"));
        }

        self.stats.iterators_created.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryIterator {
            data: &self.data,
            cf_id: cf.id(),
            lower: options.iterate_lower_bound.clone(),
            upper: options.iterate_upper_bound.clone(),
            current: None,
        }))
    }
}

/// Range over `family`, or `None` when the bounds describe an empty range
fn bounded_range<'m>(
    family: &'m ColumnFamilyData,
    lo: Bound<&[u8]>,
    hi: Bound<&[u8]>,
) -> Option<btree_map::Range<'m, Bytes, Bytes>> {
    // BTreeMap::range panics on inverted bounds
    if let (Bound::Included(l) | Bound::Excluded(l), Bound::Included(h) | Bound::Excluded(h)) =
        (lo, hi)
    {
        let both_excluded = matches!((lo, hi), (Bound::Excluded(_), Bound::Excluded(_)));
        if l > h || (l == h && both_excluded) {
            return None;
        }
    }
    Some(family.range::<[u8], _>((lo, hi)))
}

/// Cursor over one column family
///
/// Every positioning call is a bounded `BTreeMap` range lookup under a short
/// read lock; only the current entry is held between calls, so the iterator
/// sees writes made after it was created.
struct MemoryIterator<'s> {
    data: &'s RwLock<HashMap<u32, ColumnFamilyData>>,
    cf_id: u32,
    /// Inclusive
    lower: Option<Bytes>,
    /// Exclusive
    upper: Option<Bytes>,
    current: Option<(Bytes, Bytes)>,
}

impl MemoryIterator<'_> {
    fn lower_bound(&self) -> Bound<&[u8]> {
        self.lower.as_deref().map_or(Bound::Unbounded, Bound::Included)
    }

    fn upper_bound(&self) -> Bound<&[u8]> {
        self.upper.as_deref().map_or(Bound::Unbounded, Bound::Excluded)
    }

    fn find(&self, lo: Bound<&[u8]>, hi: Bound<&[u8]>, from_back: bool) -> Option<(Bytes, Bytes)> {
        let data = self.data.read();
        let mut range = bounded_range(data.get(&self.cf_id)?, lo, hi)?;
        let (key, value) = if from_back {
            range.next_back()?
        } else {
            range.next()?
        };
        Some((key.clone(), value.clone()))
    }
}

impl StoreIterator for MemoryIterator<'_> {
    fn seek(&mut self, target: &[u8]) {
        let lo = match self.lower.as_deref() {
            Some(lower) if lower > target => Bound::Included(lower),
            _ => Bound::Included(target),
        };
        self.current = self.find(lo, self.upper_bound(), false);
    }

    fn seek_for_prev(&mut self, target: &[u8]) {
        let hi = match self.upper.as_deref() {
            Some(upper) if upper <= target => Bound::Excluded(upper),
            _ => Bound::Included(target),
        };
        self.current = self.find(self.lower_bound(), hi, true);
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_ref())
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_ref())
    }

    fn next(&mut self) {
        let next = match &self.current {
            Some((key, _)) => self.find(Bound::Excluded(key.as_ref()), self.upper_bound(), false),
            None => None,
        };
        self.current = next;
    }

    fn prev(&mut self) {
        let prev = match &self.current {
            Some((key, _)) => self.find(self.lower_bound(), Bound::Excluded(key.as_ref()), true),
            None => None,
        };
        self.current = prev;
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}
